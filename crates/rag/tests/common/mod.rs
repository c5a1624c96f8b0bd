#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tessera_core::{DlpLevel, DocumentChunk, RetrievalResult, UserContext};
use tessera_rag::{AnswerCache, CacheKey, Generator, Retriever};

/// Serves fixed chunks per subject and counts calls.
#[derive(Default)]
pub struct FixedRetriever {
    by_subject: HashMap<String, Vec<DocumentChunk>>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FixedRetriever {
    pub fn with(mut self, subject: &str, chunks: Vec<DocumentChunk>) -> Self {
        self.by_subject.insert(subject.to_string(), chunks);
        self
    }

    pub fn failing() -> Self {
        let retriever = Self::default();
        retriever.fail.store(true, Ordering::SeqCst);
        retriever
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(&self, query: &str, k: usize, subject: &str) -> Result<RetrievalResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("index unreachable"));
        }
        let chunks = self
            .by_subject
            .get(subject)
            .map(|chunks| chunks.iter().take(k).cloned().collect())
            .unwrap_or_default();
        Ok(RetrievalResult {
            query: query.to_string(),
            chunks,
        })
    }
}

/// Records every prompt. Replies with a fixed text, or echoes the prompt
/// when no reply is set.
#[derive(Default)]
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
    reply: Option<String>,
    pub fail: AtomicBool,
}

impl RecordingGenerator {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("backend timed out"));
        }
        Ok(self.reply.clone().unwrap_or_else(|| prompt.to_string()))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Cache whose backend is always down.
pub struct BrokenCache;

#[async_trait]
impl AnswerCache for BrokenCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<String>> {
        Err(anyhow!("connection refused"))
    }

    async fn set(&self, _key: &CacheKey, _text: &str) -> Result<()> {
        Err(anyhow!("connection refused"))
    }
}

pub fn user(id: &str, subjects: &[&str], dlp_level: DlpLevel) -> UserContext {
    UserContext {
        user_id: id.to_string(),
        allowed_subjects: subjects.iter().map(|s| s.to_string()).collect(),
        dlp_level,
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
