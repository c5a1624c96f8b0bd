use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    AdmissionDenied { retry_after_secs: u64 },
    #[error("user has no allowed subjects")]
    NoTenantScope,
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("query has {len} characters, maximum is {max}")]
    QueryTooLong { len: usize, max: usize },
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Core(#[from] tessera_core::CoreError),
}

pub type Result<T> = std::result::Result<T, RagError>;
