//! Collaborators the orchestrator depends on.
//!
//! Implementations are picked once at startup and shared behind `Arc<dyn _>`.
//! Every method is a suspension point; none of them may hold shared state
//! of the pipeline across an await.

use anyhow::Result;
use async_trait::async_trait;
use tessera_core::RetrievalResult;

use crate::cache::CacheKey;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Results must already be scoped to `subject`; labels are trusted.
    async fn retrieve(&self, query: &str, k: usize, subject: &str) -> Result<RetrievalResult>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// One attempt, no retry.
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;

    /// False for deterministic doubles that produce canned text.
    fn is_real(&self) -> bool {
        true
    }

    async fn health(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait AnswerCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>>;

    async fn set(&self, key: &CacheKey, text: &str) -> Result<()>;
}
