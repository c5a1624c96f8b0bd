use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tessera_core::{TokenizerKind, DEFAULT_PROMPT_BUDGET_CHARS};
use tessera_llm::LlmProvider;

use crate::error::{RagError, Result};
use crate::memory::{DEFAULT_IDLE_TTL, DEFAULT_MAX_SESSIONS, DEFAULT_MAX_TURNS};
use crate::orchestrator::{DEFAULT_RETRIEVAL_K, DEFAULT_TOKEN_BUDGET};

pub const DEFAULT_CONFIG_PATH: &str = "tessera.toml";
pub const DEFAULT_RATE_LIMIT_QPM: u32 = 60;
pub const DEFAULT_MAX_QUERY_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieverKind {
    Stub,
    Memory,
}

impl RetrieverKind {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "stub" => Some(RetrieverKind::Stub),
            "memory" | "index" => Some(RetrieverKind::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub rate_limit_qpm: u32,
    pub max_turns: usize,
    pub session_idle_secs: u64,
    pub max_sessions: usize,
    pub token_budget: usize,
    pub prompt_budget_chars: usize,
    pub retrieval_k: usize,
    pub max_query_chars: usize,
    pub tokenizer: String,
    pub cache_ttl_secs: Option<u64>,
    /// Forbids the fake generator.
    pub confidential_retrieval_only: bool,
    /// Default for requests that do not say.
    pub regulatory_strict: bool,
    pub llm_provider: String,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub retriever: String,
    pub corpus_path: Option<PathBuf>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            rate_limit_qpm: DEFAULT_RATE_LIMIT_QPM,
            max_turns: DEFAULT_MAX_TURNS,
            session_idle_secs: DEFAULT_IDLE_TTL.as_secs(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            token_budget: DEFAULT_TOKEN_BUDGET,
            prompt_budget_chars: DEFAULT_PROMPT_BUDGET_CHARS,
            retrieval_k: DEFAULT_RETRIEVAL_K,
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
            tokenizer: "cl100k".to_string(),
            cache_ttl_secs: None,
            confidential_retrieval_only: false,
            regulatory_strict: false,
            llm_provider: "fake".to_string(),
            llm_model: None,
            llm_base_url: None,
            retriever: "stub".to_string(),
            corpus_path: None,
        }
    }
}

impl RagConfig {
    /// `TESSERA_CONFIG` (or `tessera.toml`) if present, then the environment.
    pub fn load() -> Result<Self> {
        let path = env::var("TESSERA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = Path::new(&path);
        let config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        Ok(config.apply_env())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| env::var(key).ok())
    }

    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| lookup(key).map(|v| v.trim().to_string());
        override_parsed(&mut self.rate_limit_qpm, parse("TESSERA_RATE_LIMIT_QPM"));
        override_parsed(&mut self.max_turns, parse("TESSERA_MAX_TURNS"));
        override_parsed(&mut self.session_idle_secs, parse("TESSERA_SESSION_IDLE_SECS"));
        override_parsed(&mut self.max_sessions, parse("TESSERA_MAX_SESSIONS"));
        override_parsed(&mut self.token_budget, parse("TESSERA_TOKEN_BUDGET"));
        override_parsed(&mut self.prompt_budget_chars, parse("TESSERA_PROMPT_BUDGET_CHARS"));
        override_parsed(&mut self.retrieval_k, parse("TESSERA_RETRIEVAL_K"));
        override_parsed(&mut self.max_query_chars, parse("TESSERA_MAX_QUERY_CHARS"));
        if let Some(secs) = parse("TESSERA_CACHE_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.cache_ttl_secs = Some(secs);
        }
        if let Some(flag) = parse("TESSERA_CONFIDENTIAL_ONLY") {
            self.confidential_retrieval_only = is_truthy(&flag);
        }
        if let Some(flag) = parse("TESSERA_STRICT_MODE") {
            self.regulatory_strict = is_truthy(&flag);
        }
        if let Some(value) = parse("TESSERA_TOKENIZER") {
            self.tokenizer = value;
        }
        if let Some(value) = parse("TESSERA_LLM_PROVIDER") {
            self.llm_provider = value;
        }
        if let Some(value) = parse("TESSERA_LLM_MODEL") {
            self.llm_model = Some(value);
        }
        if let Some(value) = parse("TESSERA_LLM_BASE_URL") {
            self.llm_base_url = Some(value);
        }
        if let Some(value) = parse("TESSERA_RETRIEVER") {
            self.retriever = value;
        }
        if let Some(value) = parse("TESSERA_CORPUS") {
            self.corpus_path = Some(PathBuf::from(value));
        }
        self
    }

    pub fn provider(&self) -> Result<LlmProvider> {
        LlmProvider::from_str(&self.llm_provider).ok_or_else(|| {
            RagError::Configuration(format!("unknown llm provider {}", self.llm_provider))
        })
    }

    pub fn model(&self) -> Result<String> {
        let provider = self.provider()?;
        Ok(self
            .llm_model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string()))
    }

    pub fn retriever_kind(&self) -> Result<RetrieverKind> {
        RetrieverKind::from_str(&self.retriever)
            .ok_or_else(|| RagError::Configuration(format!("unknown retriever {}", self.retriever)))
    }

    pub fn tokenizer_kind(&self) -> Result<TokenizerKind> {
        Ok(TokenizerKind::from_str(&self.tokenizer)?)
    }

    pub fn validate(&self) -> Result<()> {
        let provider = self.provider()?;
        if self.confidential_retrieval_only && !provider.is_real() {
            return Err(RagError::Configuration(
                "confidential_retrieval_only requires a real llm provider, not fake".to_string(),
            ));
        }
        for (name, value) in [
            ("rate_limit_qpm", self.rate_limit_qpm as usize),
            ("max_turns", self.max_turns),
            ("session_idle_secs", self.session_idle_secs as usize),
            ("max_sessions", self.max_sessions),
            ("token_budget", self.token_budget),
            ("prompt_budget_chars", self.prompt_budget_chars),
            ("retrieval_k", self.retrieval_k),
            ("max_query_chars", self.max_query_chars),
        ] {
            if value == 0 {
                return Err(RagError::Configuration(format!("{name} must be positive")));
            }
        }
        if self.retriever_kind()? == RetrieverKind::Memory && self.corpus_path.is_none() {
            return Err(RagError::Configuration(
                "the memory retriever needs corpus_path (TESSERA_CORPUS)".to_string(),
            ));
        }
        self.tokenizer_kind()?;
        Ok(())
    }
}

fn override_parsed<T: FromStr>(slot: &mut T, value: Option<String>) {
    if let Some(parsed) = value.and_then(|v| v.parse().ok()) {
        *slot = parsed;
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
