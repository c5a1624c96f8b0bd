pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod memory;
pub mod orchestrator;
pub mod pipeline;
pub mod ports;
pub mod ratelimit;
pub mod retriever;
pub mod sensitivity;

pub use cache::{CacheKey, MemoryCache};
pub use config::{RagConfig, RetrieverKind};
pub use error::{RagError, Result};
pub use generator::LlmGenerator;
pub use memory::{session_key, ConversationMemory};
pub use orchestrator::{AnswerOrchestrator, STRICT_FALLBACK_ANSWER};
pub use pipeline::{Pipeline, QueryRequest, ServedAnswer};
pub use ports::{AnswerCache, Generator, Retriever};
pub use ratelimit::{AdmissionKey, RateLimiter};
pub use retriever::{MemoryIndexRetriever, StubRetriever};
pub use sensitivity::{max_sensitivity, sensitivity_rank};
pub use tessera_llm::{LlmClient, LlmProvider};
