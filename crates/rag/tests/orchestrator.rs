mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{shared, BrokenCache, FixedRetriever, RecordingGenerator};
use tessera_core::{DocumentChunk, PiiLevel, SensitivityLabel, PROMPT_HEADER};
use tessera_rag::{AnswerOrchestrator, MemoryCache, RagError, STRICT_FALLBACK_ANSWER};

fn tenant_chunks() -> FixedRetriever {
    FixedRetriever::default()
        .with(
            "CLI-A",
            vec![
                DocumentChunk::new("a-1", "Tenant A vacation policy", "a/hr.md")
                    .with_sensitivity(PiiLevel::None),
                DocumentChunk::new("a-2", "Tenant A payroll contacts", "a/payroll.md")
                    .with_sensitivity(PiiLevel::High),
            ],
        )
        .with(
            "CLI-B",
            vec![DocumentChunk::new("b-1", "Tenant B vacation policy", "b/hr.md")],
        )
}

#[tokio::test]
async fn cache_hit_returns_raw_text_without_provenance() {
    let retriever = shared(tenant_chunks());
    let generator = shared(RecordingGenerator::replying("twenty days"));
    let orchestrator =
        AnswerOrchestrator::new(retriever.clone(), generator.clone(), shared(MemoryCache::new()));

    let first = orchestrator.answer("vacation?", "CLI-A", false).await.unwrap();
    assert_eq!(first.used_chunk_ids, vec!["a-1", "a-2"]);
    assert_eq!(first.citations[1].source, "a/payroll.md");
    assert_eq!(
        first.max_pii_sensitivity,
        Some(SensitivityLabel::Known(PiiLevel::High))
    );

    let second = orchestrator.answer("vacation?", "CLI-A", false).await.unwrap();
    assert_eq!(second.answer_text, "twenty days");
    assert!(second.used_chunk_ids.is_empty());
    assert!(second.citations.is_empty());
    assert_eq!(second.max_pii_sensitivity, None);
    assert_eq!(generator.calls(), 1);
    assert_eq!(retriever.calls(), 1);
}

#[tokio::test]
async fn tenants_never_share_cache_entries() {
    let generator = shared(RecordingGenerator::echo());
    let orchestrator = AnswerOrchestrator::new(
        shared(tenant_chunks()),
        generator.clone(),
        shared(MemoryCache::new()),
    );

    let a = orchestrator.answer("vacation?", "CLI-A", false).await.unwrap();
    let b = orchestrator.answer("vacation?", "CLI-B", false).await.unwrap();
    assert_eq!(generator.calls(), 2);
    assert!(a.answer_text.contains("Tenant A vacation policy"));
    assert!(b.answer_text.contains("Tenant B vacation policy"));
    assert!(!b.answer_text.contains("Tenant A"));
    assert_eq!(b.used_chunk_ids, vec!["b-1"]);
}

#[tokio::test]
async fn strict_mode_without_evidence_never_generates() {
    let generator = shared(RecordingGenerator::echo());
    let orchestrator = AnswerOrchestrator::new(
        shared(FixedRetriever::default()),
        generator.clone(),
        shared(MemoryCache::new()),
    );

    for _ in 0..2 {
        let answer = orchestrator.answer("bonus policy?", "CLI-A", true).await.unwrap();
        assert_eq!(answer.answer_text, STRICT_FALLBACK_ANSWER);
        assert!(answer.used_chunk_ids.is_empty());
    }
    assert_eq!(generator.calls(), 0);

    let relaxed = orchestrator.answer("bonus policy?", "CLI-A", false).await.unwrap();
    assert_ne!(relaxed.answer_text, STRICT_FALLBACK_ANSWER);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn retrieval_failure_counts_as_no_evidence() {
    let generator = shared(RecordingGenerator::echo());
    let orchestrator = AnswerOrchestrator::new(
        shared(FixedRetriever::failing()),
        generator.clone(),
        shared(MemoryCache::new()),
    );

    let strict = orchestrator.answer("q", "CLI-A", true).await.unwrap();
    assert_eq!(strict.answer_text, STRICT_FALLBACK_ANSWER);
    assert_eq!(generator.calls(), 0);

    let open = orchestrator.answer("q", "CLI-A", false).await.unwrap();
    assert!(open.used_chunk_ids.is_empty());
    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.starts_with(PROMPT_HEADER));
    assert!(!prompt.contains("\n- "));
}

#[tokio::test]
async fn generation_failure_is_fatal_and_not_cached() {
    let generator = shared(RecordingGenerator::replying("ok"));
    generator.fail.store(true, Ordering::SeqCst);
    let cache = shared(MemoryCache::new());
    let orchestrator =
        AnswerOrchestrator::new(shared(tenant_chunks()), generator.clone(), cache.clone());

    let err = orchestrator.answer("q", "CLI-A", false).await.unwrap_err();
    assert!(matches!(err, RagError::Generation(_)));
    assert!(cache.is_empty());

    generator.fail.store(false, Ordering::SeqCst);
    let answer = orchestrator.answer("q", "CLI-A", false).await.unwrap();
    assert_eq!(answer.answer_text, "ok");
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn unavailable_cache_degrades_to_miss() {
    let generator = shared(RecordingGenerator::replying("fresh"));
    let orchestrator =
        AnswerOrchestrator::new(shared(tenant_chunks()), generator.clone(), Arc::new(BrokenCache));

    for _ in 0..2 {
        let answer = orchestrator.answer("q", "CLI-A", false).await.unwrap();
        assert_eq!(answer.answer_text, "fresh");
    }
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn oversized_prompt_is_cut_from_the_end() {
    let generator = shared(RecordingGenerator::echo());
    let orchestrator = AnswerOrchestrator::new(
        shared(tenant_chunks()),
        generator.clone(),
        shared(MemoryCache::new()),
    )
    .with_token_budget(10);

    orchestrator.answer("q", "CLI-A", false).await.unwrap();
    let prompt = generator.last_prompt().unwrap();
    assert_eq!(prompt.chars().count(), 40);
    assert!(PROMPT_HEADER.starts_with(&prompt));
}

#[tokio::test]
async fn retrieval_k_is_forwarded() {
    let retriever = shared(tenant_chunks());
    let orchestrator = AnswerOrchestrator::new(
        retriever.clone(),
        shared(RecordingGenerator::echo()),
        shared(MemoryCache::new()),
    )
    .with_retrieval_k(1);

    let answer = orchestrator.answer("q", "CLI-A", false).await.unwrap();
    assert_eq!(answer.used_chunk_ids, vec!["a-1"]);
    assert_eq!(
        answer.max_pii_sensitivity,
        Some(SensitivityLabel::Known(PiiLevel::None))
    );
}
