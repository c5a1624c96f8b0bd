use std::sync::Arc;
use std::time::Duration;

use tessera_core::{enforce_dlp, merge_history, Answer, PromptBuilder, UserContext};
use tessera_llm::LlmClient;
use tracing::{debug, info, warn};

use crate::cache::MemoryCache;
use crate::config::{RagConfig, RetrieverKind, DEFAULT_MAX_QUERY_CHARS};
use crate::error::{RagError, Result};
use crate::generator::LlmGenerator;
use crate::memory::{session_key, ConversationMemory};
use crate::orchestrator::AnswerOrchestrator;
use crate::ports::{AnswerCache, Generator, Retriever};
use crate::ratelimit::{AdmissionKey, RateLimiter};
use crate::retriever::{MemoryIndexRetriever, StubRetriever};

pub const DEFAULT_SESSION_ID: &str = "default";

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query: String,
    pub session_id: Option<String>,
    /// Caller credential, used only to pick the rate-limit bucket.
    pub api_key: Option<String>,
    /// Falls back to the configured default when absent.
    pub regulatory_strict: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ServedAnswer {
    pub answer: Answer,
    pub session_id: String,
}

/// Holder for everything a request touches, built once at startup.
pub struct Pipeline {
    orchestrator: AnswerOrchestrator,
    limiter: RateLimiter,
    memory: ConversationMemory,
    max_query_chars: usize,
    regulatory_strict: bool,
}

impl Pipeline {
    pub fn new(
        orchestrator: AnswerOrchestrator,
        limiter: RateLimiter,
        memory: ConversationMemory,
    ) -> Self {
        Self {
            orchestrator,
            limiter,
            memory,
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
            regulatory_strict: false,
        }
    }

    pub fn with_max_query_chars(mut self, max: usize) -> Self {
        self.max_query_chars = max;
        self
    }

    pub fn with_regulatory_strict(mut self, strict: bool) -> Self {
        self.regulatory_strict = strict;
        self
    }

    /// Validates the configuration and wires the selected collaborators.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        config.validate()?;
        let provider = config.provider()?;
        let mut client = LlmClient::new(provider, config.model()?)
            .map_err(|e| RagError::Configuration(format!("{e:#}")))?;
        if let Some(url) = &config.llm_base_url {
            client = client.with_base_url(url.clone());
        }
        let generator: Arc<dyn Generator> = Arc::new(LlmGenerator::new(client));

        let retriever: Arc<dyn Retriever> = match config.retriever_kind()? {
            RetrieverKind::Stub => Arc::new(StubRetriever),
            RetrieverKind::Memory => {
                let path = config.corpus_path.as_deref().ok_or_else(|| {
                    RagError::Configuration("corpus_path is not set".to_string())
                })?;
                let index = MemoryIndexRetriever::from_jsonl(path)
                    .map_err(|e| RagError::Configuration(format!("{e:#}")))?;
                Arc::new(index)
            }
        };

        let cache: Arc<dyn AnswerCache> = match config.cache_ttl_secs {
            Some(secs) => Arc::new(MemoryCache::with_ttl(Duration::from_secs(secs))),
            None => Arc::new(MemoryCache::new()),
        };

        let estimator = config.tokenizer_kind()?.build_or_heuristic();
        let orchestrator = AnswerOrchestrator::new(retriever, generator, cache)
            .with_estimator(estimator)
            .with_prompt_builder(PromptBuilder::new(config.prompt_budget_chars))
            .with_retrieval_k(config.retrieval_k)
            .with_token_budget(config.token_budget);

        info!(
            provider = provider.as_str(),
            retriever = %config.retriever,
            qpm = config.rate_limit_qpm,
            strict = config.regulatory_strict,
            "pipeline_ready"
        );
        Ok(Self::new(
            orchestrator,
            RateLimiter::new(config.rate_limit_qpm),
            ConversationMemory::new(config.max_turns)
                .with_idle_ttl(Duration::from_secs(config.session_idle_secs))
                .with_max_sessions(config.max_sessions),
        )
        .with_max_query_chars(config.max_query_chars)
        .with_regulatory_strict(config.regulatory_strict))
    }

    pub fn orchestrator(&self) -> &AnswerOrchestrator {
        &self.orchestrator
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// One request end to end. The returned text has been through the DLP
    /// gate for `user`.
    ///
    /// History is looked up under the caller's subject and user id as well as
    /// the session id, so two callers naming the same session never share
    /// turns.
    pub async fn serve(&self, user: &UserContext, request: &QueryRequest) -> Result<ServedAnswer> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(RagError::EmptyQuery);
        }
        let len = query.chars().count();
        if len > self.max_query_chars {
            return Err(RagError::QueryTooLong {
                len,
                max: self.max_query_chars,
            });
        }

        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SESSION_ID)
            .to_string();
        let subject = user.subject();
        let scoped_session = session_key(subject.unwrap_or(""), &user.user_id, &session_id);
        let admission =
            AdmissionKey::select(request.api_key.as_deref(), Some(scoped_session.as_str()));
        let bucket = admission.bucket_key();
        if !self.limiter.allow(&bucket) {
            let retry_after_secs = self.limiter.retry_after(&bucket);
            warn!(user_id = %user.user_id, retry_after_secs, "admission_denied");
            return Err(RagError::AdmissionDenied { retry_after_secs });
        }

        let subject = subject.ok_or(RagError::NoTenantScope)?;
        let strict = request.regulatory_strict.unwrap_or(self.regulatory_strict);

        let history = self.memory.history(&scoped_session);
        let effective_query = merge_history(query, &history);
        debug!(
            session_id = %session_id,
            turns = history.len(),
            query = %effective_query,
            "query_received"
        );

        let mut answer = self.orchestrator.answer(&effective_query, subject, strict).await?;
        answer.answer_text = enforce_dlp(&answer.answer_text, user);
        self.memory.add_turn(&scoped_session, query, &answer.answer_text);
        info!(
            user_id = %user.user_id,
            subject = %subject,
            dlp_level = user.dlp_level.as_str(),
            chunks = answer.used_chunk_ids.len(),
            "request_served"
        );
        Ok(ServedAnswer { answer, session_id })
    }
}
