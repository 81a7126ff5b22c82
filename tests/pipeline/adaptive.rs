//! The adaptive loop through the facade

use crate::common::*;
use async_trait::async_trait;
use ragline::{EnrichedResult, GenerateError, Generation, Generator, OperationKind, Termination};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Generator that records the context size it was given
struct RecordingGenerator {
    calls: AtomicUsize,
    context_len: AtomicUsize,
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(
        &self,
        query: &str,
        context: &[EnrichedResult],
    ) -> Result<Generation, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.context_len.store(context.len(), Ordering::SeqCst);
        Ok(Generation {
            answer: format!("answer to: {}", query),
            tokens_consumed: 100,
        })
    }
}

#[tokio::test]
async fn test_ask_runs_bounded_loop() {
    let rag = indexed().await;
    let outcome = rag.ask("What happened to operating margin?").await.unwrap();

    let cfg = &rag.config().adaptive;
    assert!(outcome.iterations >= 1 && outcome.iterations <= cfg.max_iterations);
    assert!(outcome.final_k <= cfg.max_k);
    assert_eq!(outcome.trace.len(), outcome.iterations);
    assert_eq!(outcome.trace.last().unwrap().action, outcome.final_action());
    assert!(outcome.trace.iter().all(|t| t.k <= cfg.max_k));
    assert!(!outcome.answer.is_empty());
}

#[tokio::test]
async fn test_ask_records_cost_in_shared_ledger() {
    let rag = indexed().await;
    let first = rag.ask("revenue growth").await.unwrap();
    assert_eq!(rag.ledger().total_tokens(), first.cost.total_tokens);

    let second = rag.ask("headcount").await.unwrap();
    assert_eq!(
        rag.ledger().total_tokens(),
        first.cost.total_tokens + second.cost.total_tokens
    );
    rag.ledger().reset();
    assert_eq!(rag.ledger().total_tokens(), 0);
}

#[tokio::test]
async fn test_custom_generator_receives_final_context() {
    init_tracing();
    let generator = Arc::new(RecordingGenerator {
        calls: AtomicUsize::new(0),
        context_len: AtomicUsize::new(0),
    });
    let rag = Ragline::with_generator(RaglineConfig::default(), generator.clone()).unwrap();
    rag.index(&annual_report()).await.unwrap();

    let outcome = rag.ask("operating margin").await.unwrap();
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(generator.context_len.load(Ordering::SeqCst), outcome.context.len());
    assert_eq!(outcome.answer, "answer to: operating margin");
    assert_eq!(
        outcome.cost.tokens(OperationKind::Generation),
        100
    );
}

#[tokio::test]
async fn test_unanswerable_question_exhausts() {
    let rag = indexed().await;
    let outcome = rag.ask("zeppelin maintenance schedule").await.unwrap();
    assert_ne!(outcome.termination, Termination::Generate);
    assert!(!outcome.confidence.is_sufficient);
}
