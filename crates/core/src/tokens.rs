use std::sync::Arc;

use tracing::warn;

use crate::error::{CoreError, Result};

/// Approximate prompt cost in tokens.
///
/// Estimators are not interchangeable: the heuristic over- and under-counts
/// depending on language, the BPE variants match one model family.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;

    fn name(&self) -> &str;
}

/// `characters / 4`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharHeuristic;

pub const CHARS_PER_TOKEN: usize = 4;

impl TokenEstimator for CharHeuristic {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count() / CHARS_PER_TOKEN
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

pub struct BpeEstimator {
    name: &'static str,
    bpe: tiktoken_rs::CoreBPE,
}

impl TokenEstimator for BpeEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    Cl100k,
    O200k,
    Gpt2,
    Heuristic,
}

impl TokenizerKind {
    pub fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "cl100k" | "cl100k_base" => Ok(TokenizerKind::Cl100k),
            "o200k" | "o200k_base" => Ok(TokenizerKind::O200k),
            "gpt2" | "p50k" | "p50k_base" => Ok(TokenizerKind::Gpt2),
            "heuristic" | "chars" => Ok(TokenizerKind::Heuristic),
            other => Err(CoreError::UnknownTokenizer(other.to_string())),
        }
    }

    pub fn build(&self) -> Result<Arc<dyn TokenEstimator>> {
        let (name, bpe) = match self {
            TokenizerKind::Heuristic => return Ok(Arc::new(CharHeuristic)),
            TokenizerKind::Cl100k => ("cl100k_base", tiktoken_rs::cl100k_base()),
            TokenizerKind::O200k => ("o200k_base", tiktoken_rs::o200k_base()),
            TokenizerKind::Gpt2 => ("p50k_base", tiktoken_rs::p50k_base()),
        };
        let bpe = bpe.map_err(|e| CoreError::Tokenizer(e.to_string()))?;
        Ok(Arc::new(BpeEstimator { name, bpe }))
    }

    /// Like [`build`](Self::build) but degrades to the heuristic.
    pub fn build_or_heuristic(&self) -> Arc<dyn TokenEstimator> {
        match self.build() {
            Ok(estimator) => estimator,
            Err(err) => {
                warn!(tokenizer = ?self, error = %err, "tokenizer_unavailable");
                Arc::new(CharHeuristic)
            }
        }
    }
}
