use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use tessera_core::{
    cosine_similarity, DocumentChunk, HashEmbedder, PiiLevel, RetrievalResult, SensitivityLabel,
};
use tracing::info;

use crate::ports::Retriever;

/// Two fixed synthetic chunks, for development without an index.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubRetriever;

#[async_trait]
impl Retriever for StubRetriever {
    async fn retrieve(&self, query: &str, k: usize, _subject: &str) -> Result<RetrievalResult> {
        let chunks = [
            DocumentChunk::new(
                "demo-1",
                "Corporate policies define procedures for internal compliance.",
                "synthetic",
            ),
            DocumentChunk::new(
                "demo-2",
                "Procedures outline step-by-step operational guidelines.",
                "synthetic",
            ),
        ];
        Ok(RetrievalResult {
            query: query.to_string(),
            chunks: chunks.into_iter().take(k).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CorpusRecord {
    id: String,
    subject: String,
    text: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    pii_sensitivity: Option<SensitivityLabel>,
}

struct IndexedChunk {
    subject: String,
    chunk: DocumentChunk,
    vector: Vec<f32>,
}

/// Subject-partitioned vector index held in memory.
///
/// Chunks labelled `high` are indexed but never returned, and only chunks
/// with some lexical overlap (positive cosine) are candidates.
#[derive(Default)]
pub struct MemoryIndexRetriever {
    embedder: HashEmbedder,
    entries: RwLock<Vec<IndexedChunk>>,
}

impl MemoryIndexRetriever {
    pub fn new(embedder: HashEmbedder) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// One JSON object per line: `id`, `subject`, `text`, optional `source`
    /// and `pii_sensitivity`.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read corpus {}", path.display()))?;
        let index = Self::default();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: CorpusRecord = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid corpus record", path.display(), idx + 1))?;
            let source = record.source.unwrap_or_else(|| path.display().to_string());
            let mut chunk = DocumentChunk::new(record.id, record.text, source);
            chunk.pii_sensitivity = record.pii_sensitivity;
            index.insert(&record.subject, chunk);
        }
        info!(path = %path.display(), chunks = index.len(), "corpus_loaded");
        Ok(index)
    }

    pub fn insert(&self, subject: &str, chunk: DocumentChunk) {
        let vector = self.embedder.embed_text(&chunk.text);
        self.entries.write().push(IndexedChunk {
            subject: subject.to_string(),
            chunk,
            vector,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn search(&self, query: &str, k: usize, subject: &str) -> Vec<DocumentChunk> {
        let needle = self.embedder.embed_text(query);
        let entries = self.entries.read();
        let mut scored: Vec<(f32, &DocumentChunk)> = entries
            .iter()
            .filter(|entry| entry.subject == subject && !is_high(&entry.chunk))
            .map(|entry| (cosine_similarity(&needle, &entry.vector), &entry.chunk))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(_, chunk)| chunk.clone())
            .collect()
    }
}

fn is_high(chunk: &DocumentChunk) -> bool {
    matches!(
        chunk.pii_sensitivity,
        Some(SensitivityLabel::Known(PiiLevel::High))
    )
}

#[async_trait]
impl Retriever for MemoryIndexRetriever {
    async fn retrieve(&self, query: &str, k: usize, subject: &str) -> Result<RetrievalResult> {
        let chunks = self.search(query, k, subject);
        Ok(RetrievalResult {
            query: query.to_string(),
            chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tessera_core::HashEmbedderConfig;

    fn index() -> MemoryIndexRetriever {
        let index = MemoryIndexRetriever::new(HashEmbedder::new(HashEmbedderConfig {
            dimensions: 4096,
            seed: 7,
        }));
        index.insert(
            "CLI-1",
            DocumentChunk::new("a1", "Vacation policy allows twenty days", "hr.md")
                .with_sensitivity(PiiLevel::None),
        );
        index.insert(
            "CLI-1",
            DocumentChunk::new("a2", "Vacation requests need manager approval", "hr.md")
                .with_sensitivity(PiiLevel::Medium),
        );
        index.insert(
            "CLI-1",
            DocumentChunk::new("a3", "Vacation payroll card numbers", "payroll.md")
                .with_sensitivity(PiiLevel::High),
        );
        index.insert(
            "CLI-2",
            DocumentChunk::new("b1", "Vacation policy of another tenant", "other.md"),
        );
        index
    }

    #[tokio::test]
    async fn stub_respects_k() {
        let result = StubRetriever.retrieve("q", 1, "any").await.unwrap();
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].id, "demo-1");
    }

    #[tokio::test]
    async fn scopes_by_subject_and_skips_high() {
        let index = index();
        let result = index.retrieve("vacation policy", 5, "CLI-1").await.unwrap();
        let ids: Vec<_> = result.chunks.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&"a1"));
        assert!(!ids.contains(&"a3"));
        assert!(!ids.contains(&"b1"));
        assert_eq!(ids[0], "a1");
    }

    #[tokio::test]
    async fn unrelated_query_and_unknown_subject_are_empty() {
        let index = index();
        assert!(index.retrieve("?!", 5, "CLI-1").await.unwrap().is_empty());
        assert!(index.retrieve("vacation", 5, "CLI-9").await.unwrap().is_empty());
    }

    #[test]
    fn loads_jsonl_corpus() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"id":"c1","subject":"CLI-1","text":"Expense reports","pii_sensitivity":"medium"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"id":"c2","subject":"CLI-2","text":"Travel","source":"travel.md"}}"#
        )
        .unwrap();
        let index = MemoryIndexRetriever::from_jsonl(file.path()).unwrap();
        assert_eq!(index.len(), 2);

        writeln!(file, "{{broken").unwrap();
        let err = MemoryIndexRetriever::from_jsonl(file.path()).err().unwrap();
        assert!(format!("{err:#}").contains(":4:"));
    }
}
