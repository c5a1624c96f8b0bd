//! Offline leakage check for the redactor over a labelled corpus.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::pii::{redact, PiiType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiSample {
    pub doc_id: String,
    pub text: String,
    /// Literal values per type, keyed by type name.
    #[serde(default)]
    pub pii_ground_truth: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeakStats {
    pub total: usize,
    pub leaked: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PiiEvaluation {
    pub total_samples: usize,
    pub total_pii_items: usize,
    pub by_type: BTreeMap<String, LeakStats>,
    /// `(doc_id, type, literal)` for every leaked value.
    pub leaks: Vec<(String, String, String)>,
}

impl PiiEvaluation {
    pub fn leaked(&self, kind: PiiType) -> usize {
        self.by_type
            .get(kind.as_str())
            .map(|stats| stats.leaked)
            .unwrap_or(0)
    }
}

pub fn load_pii_corpus(path: &Path) -> Result<Vec<PiiSample>> {
    let contents = fs::read_to_string(path)?;
    let mut samples = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sample: PiiSample =
            serde_json::from_str(line).map_err(|e| CoreError::InvalidCorpus {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: e.to_string(),
            })?;
        samples.push(sample);
    }
    Ok(samples)
}

pub fn evaluate_redaction(samples: &[PiiSample]) -> PiiEvaluation {
    let mut eval = PiiEvaluation {
        total_samples: samples.len(),
        ..Default::default()
    };
    for sample in samples {
        let redacted = redact(&sample.text);
        for (raw_type, literals) in &sample.pii_ground_truth {
            let key = PiiType::from_str(raw_type)
                .map(|kind| kind.as_str().to_string())
                .unwrap_or_else(|| raw_type.clone());
            let stats = eval.by_type.entry(key.clone()).or_default();
            for literal in literals {
                stats.total += 1;
                eval.total_pii_items += 1;
                if redacted.contains(literal.as_str()) {
                    stats.leaked += 1;
                    eval.leaks
                        .push((sample.doc_id.clone(), key.clone(), literal.clone()));
                }
            }
        }
    }
    eval
}
