use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tessera_core::{DlpLevel, UserContext};

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    users: Vec<UserEntry>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    api_key: String,
    user_id: String,
    #[serde(default)]
    allowed_subjects: Vec<String>,
    #[serde(default)]
    dlp_level: DlpLevel,
}

/// API key to caller identity. Stands in for an identity provider; the
/// pipeline only ever sees the resolved [`UserContext`].
#[derive(Debug, Default)]
pub struct UserDirectory {
    by_key: HashMap<String, UserContext>,
}

impl UserDirectory {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read user directory {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid user directory {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: DirectoryFile = toml::from_str(raw)?;
        let by_key = file
            .users
            .into_iter()
            .map(|entry| {
                (
                    entry.api_key,
                    UserContext {
                        user_id: entry.user_id,
                        allowed_subjects: entry.allowed_subjects,
                        dlp_level: entry.dlp_level,
                    },
                )
            })
            .collect();
        Ok(Self { by_key })
    }

    pub fn resolve(&self, api_key: &str) -> Option<&UserContext> {
        self.by_key.get(api_key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
