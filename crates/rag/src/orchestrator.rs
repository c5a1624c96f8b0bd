use std::sync::Arc;

use tessera_core::{
    truncate_chars, Answer, CharHeuristic, Citation, PromptBuilder, RetrievalResult,
    TokenEstimator, CHARS_PER_TOKEN,
};
use tracing::{debug, error, info, warn};

use crate::cache::CacheKey;
use crate::error::{RagError, Result};
use crate::ports::{AnswerCache, Generator, Retriever};
use crate::sensitivity::max_sensitivity;

pub const DEFAULT_RETRIEVAL_K: usize = 5;
pub const DEFAULT_TOKEN_BUDGET: usize = 2048;

/// Returned, never generated, when strict mode finds no evidence.
pub const STRICT_FALLBACK_ANSWER: &str = "No supporting documents were found for this question. \
Please refer to the official policy channels or contact the compliance team.";

/// Cache, retrieval, prompt and generation for one tenant-scoped query.
///
/// Text leaving [`answer`](Self::answer) is raw. The DLP gate runs on it at
/// the response boundary, whether it came from the cache or the generator.
pub struct AnswerOrchestrator {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    cache: Arc<dyn AnswerCache>,
    prompt: PromptBuilder,
    estimator: Arc<dyn TokenEstimator>,
    retrieval_k: usize,
    token_budget: usize,
}

impl AnswerOrchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        cache: Arc<dyn AnswerCache>,
    ) -> Self {
        Self {
            retriever,
            generator,
            cache,
            prompt: PromptBuilder::default(),
            estimator: Arc::new(CharHeuristic),
            retrieval_k: DEFAULT_RETRIEVAL_K,
            token_budget: DEFAULT_TOKEN_BUDGET,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_prompt_builder(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_retrieval_k(mut self, k: usize) -> Self {
        self.retrieval_k = k;
        self
    }

    pub fn with_token_budget(mut self, tokens: usize) -> Self {
        self.token_budget = tokens;
        self
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    pub async fn answer(&self, query: &str, subject: &str, strict: bool) -> Result<Answer> {
        let key = CacheKey::derive(subject, query, strict);
        match self.cache.get(&key).await {
            Ok(Some(text)) => {
                debug!(subject = %subject, strict, "cache_hit");
                return Ok(Answer::bare(text));
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "cache_unavailable"),
        }

        let retrieval = match self.retriever.retrieve(query, self.retrieval_k, subject).await {
            Ok(result) => result,
            Err(err) => {
                warn!(subject = %subject, error = %err, "retrieval_degraded");
                RetrievalResult::empty(query)
            }
        };

        if strict && retrieval.is_empty() {
            info!(subject = %subject, "regulatory_strict_no_context");
            self.store(&key, STRICT_FALLBACK_ANSWER).await;
            return Ok(Answer::bare(STRICT_FALLBACK_ANSWER));
        }

        let max_pii_sensitivity = max_sensitivity(&retrieval.chunks);
        let texts: Vec<&str> = retrieval.chunks.iter().map(|c| c.text.as_str()).collect();
        let prompt = self.prompt.build(query, &texts, &[]);
        let prompt = self.fit_budget(&prompt);

        let text = self.generator.generate(prompt).await.map_err(|err| {
            error!(
                subject = %subject,
                generator = self.generator.name(),
                error = %err,
                "generation_failed"
            );
            RagError::Generation(err)
        })?;
        self.store(&key, &text).await;

        info!(
            subject = %subject,
            chunks = retrieval.chunks.len(),
            sensitivity = max_pii_sensitivity.as_ref().map(|l| l.as_str()).unwrap_or("none"),
            "query_answered"
        );
        Ok(Answer {
            answer_text: text,
            used_chunk_ids: retrieval.chunks.iter().map(|c| c.id.clone()).collect(),
            citations: retrieval
                .chunks
                .iter()
                .map(|c| Citation {
                    id: c.id.clone(),
                    source: c.source.clone(),
                })
                .collect(),
            max_pii_sensitivity,
        })
    }

    /// Keeps the first `budget * 4` characters when the estimate is over.
    pub fn fit_budget<'a>(&self, prompt: &'a str) -> &'a str {
        let estimate = self.estimator.estimate(prompt);
        if estimate <= self.token_budget {
            return prompt;
        }
        debug!(
            estimate,
            budget = self.token_budget,
            estimator = self.estimator.name(),
            "prompt_truncated"
        );
        truncate_chars(prompt, self.token_budget.saturating_mul(CHARS_PER_TOKEN))
    }

    async fn store(&self, key: &CacheKey, text: &str) {
        if let Err(err) = self.cache.set(key, text).await {
            warn!(error = %err, "cache_unavailable");
        }
    }
}
