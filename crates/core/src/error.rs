use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("unknown tokenizer: {0}")]
    UnknownTokenizer(String),
    #[error("invalid corpus line {line} in {path:?}: {reason}")]
    InvalidCorpus {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<anyhow::Error> for CoreError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
