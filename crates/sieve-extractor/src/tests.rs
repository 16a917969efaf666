//! Integration tests for the Extractor

#[cfg(test)]
mod tests {
    use crate::{Extractor, ExtractorConfig, ExtractorError, Plan, RateLimitTracker, RunContext};
    use sieve_domain::{ChunkStatus, DegradedReason, ExtractionMethod, ExtractionRequest};
    use sieve_llm::{CompletionError, MockProvider};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    const CONVERSATION: &str = "Customer: Hi, I can't log in to my account since this morning.\n\n\
        Agent: Please reset your password from the sign-in page and try again.\n\n\
        Customer: How do I export my invoices as PDF?\n\n\
        Agent: Go to Billing > History and click Download PDF next to each invoice.";

    const ONE_PAIR: &str = r#"[{
        "question": "How do I export my invoices as PDF?",
        "answer": "Go to Billing > History and click Download PDF.",
        "confidence": 0.9,
        "issue_type": "how_to"
    }]"#;

    fn pair_json(question: &str, confidence: f64) -> String {
        format!(
            r#"[{{"question": "{}", "answer": "Follow the steps in the help center article.", "confidence": {}}}]"#,
            question, confidence
        )
    }

    /// Config that splits `segmented` text into one chunk per segment
    fn chunked_config() -> ExtractorConfig {
        ExtractorConfig {
            max_chunk_chars: 2_000,
            min_chunk_chars: 200,
            chunk_overlap_tokens: 50,
            ..ExtractorConfig::default()
        }
    }

    /// Segments of ~1500 bytes joined by a turn separator, each tagged with its key
    fn segmented(keys: &[&str]) -> String {
        keys.iter()
            .map(|key| format!("{} {}", key, "customer asked about the thing and agent replied. ".repeat(30)))
            .collect::<Vec<_>>()
            .join("\n---\n")
    }

    #[tokio::test]
    async fn test_full_extraction_flow() {
        let provider = MockProvider::new(ONE_PAIR);
        let extractor = Extractor::new(provider.clone(), ExtractorConfig::default()).unwrap();

        let request = ExtractionRequest::new(CONVERSATION).with_metadata("platform", "zendesk");
        let result = tokio_test::assert_ok!(extractor.extract(&request).await);

        assert!(!result.degraded);
        assert_eq!(result.degraded_reason, None);
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].extraction_method, ExtractionMethod::Ai);
        assert_eq!(result.chunk_count, 1);
        assert_eq!(result.chunk_reports.len(), 1);
        assert_eq!(result.chunk_reports[0].status, ChunkStatus::Extracted { pairs: 1 });
        assert!(result.total_estimated_tokens > 0);
        assert_eq!(extractor.tracker().current_usage(), result.total_estimated_tokens);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_short_circuits() {
        let provider = MockProvider::new(ONE_PAIR);
        let extractor = Extractor::new(provider.clone(), ExtractorConfig::default()).unwrap();

        let result = extractor.extract(&ExtractionRequest::new("  \n\t ")).await.unwrap();

        assert!(result.pairs.is_empty());
        assert!(!result.degraded);
        assert_eq!(result.chunk_count, 0);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = ExtractorConfig {
            chunk_concurrency: 0,
            ..ExtractorConfig::default()
        };
        let result = Extractor::new(MockProvider::default(), config);
        assert!(matches!(result, Err(ExtractorError::Config(_))));
    }

    #[tokio::test]
    async fn test_ai_disabled_uses_patterns() {
        let provider = MockProvider::new(ONE_PAIR);
        let config = ExtractorConfig {
            ai_enabled: false,
            ..ExtractorConfig::default()
        };
        let extractor = Extractor::new(provider.clone(), config).unwrap();

        let result = extractor.extract(&ExtractionRequest::new(CONVERSATION)).await.unwrap();

        assert!(result.degraded);
        assert_eq!(result.degraded_reason, Some(DegradedReason::AiDisabled));
        assert_eq!(result.pairs.len(), 2);
        assert!(result.pairs.iter().all(|p| p.extraction_method == ExtractionMethod::Pattern));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_chunk_does_not_sink_the_run() {
        let provider = MockProvider::default();
        provider.add_response("SEGMENT-A", pair_json("Why does the export stop at 80 percent?", 0.9));
        provider.add_response("SEGMENT-B", "I'm sorry, I cannot produce JSON today.");
        provider.add_response("SEGMENT-C", pair_json("Can I schedule reports for Mondays only?", 0.9));
        let extractor = Extractor::new(provider.clone(), chunked_config()).unwrap();

        let request = ExtractionRequest::new(segmented(&["SEGMENT-A", "SEGMENT-B", "SEGMENT-C"]));
        let result = extractor.extract(&request).await.unwrap();

        assert!(!result.degraded);
        assert_eq!(result.chunk_count, 3);
        assert_eq!(result.successful_chunks(), 2);
        assert_eq!(result.pairs.len(), 2);
        assert_eq!(result.pairs[0].question, "Why does the export stop at 80 percent?");
        assert_eq!(result.pairs[1].question, "Can I schedule reports for Mondays only?");

        let statuses: Vec<_> = result.chunk_reports.iter().map(|r| r.status.clone()).collect();
        assert_eq!(
            statuses,
            vec![
                ChunkStatus::Extracted { pairs: 1 },
                ChunkStatus::Malformed,
                ChunkStatus::Extracted { pairs: 1 },
            ]
        );
        // A malformed response still consumed its tokens
        assert!(result.chunk_reports[1].estimated_tokens > 0);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_similar_questions_across_turn_chunks_deduplicate() {
        let provider = MockProvider::default();
        provider.add_response("SEGMENT-A", pair_json("How do I reset my password?", 0.8));
        provider.add_response("SEGMENT-B", pair_json("How can I reset my password?", 0.82));
        let extractor = Extractor::new(provider, chunked_config()).unwrap();

        let request = ExtractionRequest::new(segmented(&["SEGMENT-A", "SEGMENT-B"]));
        let result = extractor.extract(&request).await.unwrap();

        assert_eq!(result.chunk_count, 2);
        assert_eq!(result.pairs.len(), 1);
        // First chunk wins regardless of completion order
        assert_eq!(result.pairs[0].question, "How do I reset my password?");
        assert_eq!(result.pairs[0].confidence, 0.8);
    }

    #[tokio::test]
    async fn test_overlapping_fixed_windows_deduplicate() {
        let provider = MockProvider::default();
        provider.add_response("ALPHA-MARK", pair_json("How do I reset my password?", 0.8));
        provider.add_response("OMEGA-MARK", pair_json("How do I reset my password?", 0.82));
        let config = ExtractorConfig {
            chunk_separators: Vec::new(),
            ..chunked_config()
        };
        let extractor = Extractor::new(provider.clone(), config).unwrap();

        let text = format!("ALPHA-MARK {} OMEGA-MARK", "please check the router settings ".repeat(90));
        let Plan::Chunked(chunks) = extractor.plan(&text) else {
            panic!("expected a chunked plan");
        };
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].overlap > 0);
        assert!(!chunks[1].text.contains("ALPHA-MARK"));

        let result = extractor.extract(&ExtractionRequest::new(text)).await.unwrap();

        assert_eq!(result.chunk_count, 2);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].question, "How do I reset my password?");
        assert_eq!(result.pairs[0].confidence, 0.8);
    }

    #[tokio::test]
    async fn test_partial_failure_is_not_degraded() {
        let provider = MockProvider::default();
        provider.add_response("SEGMENT-A", pair_json("Where do I find the audit log?", 0.9));
        provider.add_error("SEGMENT-B", CompletionError::NonRetryable("context too long".into()));
        let extractor = Extractor::new(provider.clone(), chunked_config()).unwrap();

        let request = ExtractionRequest::new(segmented(&["SEGMENT-A", "SEGMENT-B"]));
        let result = extractor.extract(&request).await.unwrap();

        assert!(!result.degraded);
        assert_eq!(result.pairs.len(), 1);
        assert!(matches!(result.chunk_reports[1].status, ChunkStatus::Failed { .. }));
        assert_eq!(result.chunk_reports[1].estimated_tokens, 0);
        assert_eq!(result.total_estimated_tokens, result.chunk_reports[0].estimated_tokens);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_confidence_filter() {
        let response = r#"[
            {"question": "Is there an offline mode?", "answer": "Not yet, it is on the roadmap.", "confidence": 0.5},
            {"question": "Does the mobile app support SSO?", "answer": "Yes, SAML and OIDC are supported.", "confidence": 0.9}
        ]"#;
        let extractor = Extractor::new(MockProvider::new(response), ExtractorConfig::default()).unwrap();

        let result = extractor.extract(&ExtractionRequest::new(CONVERSATION)).await.unwrap();

        assert_eq!(result.pairs.len(), 1);
        assert!(result.pairs.iter().all(|p| p.confidence >= 0.7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_guarantee_under_permanent_quota() {
        let provider = MockProvider::failing(CompletionError::QuotaExceeded("429 Too Many Requests".into()));
        let extractor = Extractor::new(provider.clone(), ExtractorConfig::default()).unwrap();

        let started = Instant::now();
        let result = extractor.extract(&ExtractionRequest::new(CONVERSATION)).await.unwrap();

        assert!(result.degraded);
        assert_eq!(result.degraded_reason, Some(DegradedReason::AllChunksFailed));
        assert!(!result.pairs.is_empty());
        assert!(result.pairs.iter().all(|p| p.extraction_method == ExtractionMethod::Pattern));
        assert!(matches!(result.chunk_reports[0].status, ChunkStatus::Failed { .. }));
        assert_eq!(result.total_estimated_tokens, 0);
        assert_eq!(provider.call_count(), 4);
        // 30s + 45s + 67.5s of quota backoff
        assert!(started.elapsed() >= Duration::from_millis(142_500));
        assert!(started.elapsed() < Duration::from_secs(143));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_disabled_returns_empty_degraded_result() {
        let provider = MockProvider::failing(CompletionError::NonRetryable("model not found".into()));
        let config = ExtractorConfig {
            fallback_enabled: false,
            ..ExtractorConfig::default()
        };
        let extractor = Extractor::new(provider, config).unwrap();

        let result = extractor.extract(&ExtractionRequest::new(CONVERSATION)).await.unwrap();

        assert!(result.degraded);
        assert_eq!(result.degraded_reason, Some(DegradedReason::AllChunksFailed));
        assert!(result.pairs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_error() {
        let provider = MockProvider::new(ONE_PAIR).with_latency(Duration::from_secs(60));
        let extractor = Extractor::new(provider, ExtractorConfig::default()).unwrap();
        let request = ExtractionRequest::new(CONVERSATION);

        let (ctx, handle) = RunContext::cancellable();
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(extractor.extract_with(&request, ctx), cancel);

        assert_eq!(result, Err(ExtractorError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_chunked_run() {
        let provider = MockProvider::new(ONE_PAIR).with_latency(Duration::from_secs(60));
        let extractor = Extractor::new(provider.clone(), chunked_config()).unwrap();
        let request = ExtractionRequest::new(segmented(&["SEGMENT-A", "SEGMENT-B", "SEGMENT-C", "SEGMENT-D"]));

        let (ctx, handle) = RunContext::cancellable();
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(extractor.extract_with(&request, ctx), cancel);

        assert_eq!(result, Err(ExtractorError::Cancelled));
        // The fourth chunk never got a permit
        assert_eq!(provider.call_count(), 3);
        assert_eq!(extractor.tracker().current_usage(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_degrades_to_patterns() {
        let provider = MockProvider::new(ONE_PAIR).with_latency(Duration::from_secs(600));
        let extractor = Extractor::new(provider, ExtractorConfig::default()).unwrap();

        let ctx = RunContext::background().with_timeout(Duration::from_secs(10));
        let result = extractor
            .extract_with(&ExtractionRequest::new(CONVERSATION), ctx)
            .await
            .unwrap();

        assert!(result.degraded);
        assert_eq!(result.degraded_reason, Some(DegradedReason::DeadlineExceeded));
        assert_eq!(result.pairs.len(), 2);
        assert!(result.pairs.iter().all(|p| p.extraction_method == ExtractionMethod::Pattern));
        assert_eq!(result.chunk_count, 1);
        assert_eq!(result.chunk_reports.len(), 1);
        assert!(matches!(result.chunk_reports[0].status, ChunkStatus::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_chunk_accounting() {
        let provider = MockProvider::new(ONE_PAIR).with_latency(Duration::from_secs(600));
        let extractor = Extractor::new(provider, chunked_config()).unwrap();

        let text = format!("{}\n---\n{}", segmented(&["SEGMENT-A", "SEGMENT-B"]), CONVERSATION);
        assert_eq!(extractor.plan(&text).chunk_count(), 2);

        let ctx = RunContext::background().with_timeout(Duration::from_secs(10));
        let result = extractor
            .extract_with(&ExtractionRequest::new(text), ctx)
            .await
            .unwrap();

        assert_eq!(result.degraded_reason, Some(DegradedReason::DeadlineExceeded));
        assert_eq!(result.chunk_count, 2);
        assert_eq!(result.chunk_reports.len(), 2);
        assert_eq!(result.chunk_reports[0].index, 0);
        assert_eq!(result.chunk_reports[1].index, 1);
        assert!(result
            .chunk_reports
            .iter()
            .all(|r| matches!(r.status, ChunkStatus::Failed { .. })));
        assert!(!result.pairs.is_empty());
        assert!(result.pairs.iter().all(|p| p.extraction_method == ExtractionMethod::Pattern));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_without_any_output_is_an_error() {
        let provider = MockProvider::new(ONE_PAIR).with_latency(Duration::from_secs(600));
        let config = ExtractorConfig {
            run_timeout_secs: 5,
            ..ExtractorConfig::default()
        };
        let extractor = Extractor::new(provider, config).unwrap();

        let request = ExtractionRequest::new("lorem ipsum dolor sit amet, consectetur adipiscing elit");
        let result = extractor.extract(&request).await;

        tokio_test::assert_err!(&result);
        assert_eq!(result, Err(ExtractorError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_window_throttles_second_run() {
        let tracker = Arc::new(RateLimitTracker::new(1_000, Duration::from_secs(60)));
        let config = ExtractorConfig {
            max_tokens_per_window: 1_000,
            ..ExtractorConfig::default()
        };
        let provider = Arc::new(MockProvider::new(ONE_PAIR));
        let first = Extractor::with_tracker(Arc::clone(&provider), Arc::clone(&tracker), config.clone()).unwrap();
        let second = Extractor::with_tracker(Arc::clone(&provider), Arc::clone(&tracker), config).unwrap();

        let text = "the customer describes a long problem with the sync settings and the agent explains. ".repeat(28);
        let request = ExtractionRequest::new(text);

        let result = first.extract(&request).await.unwrap();
        assert!(result.total_estimated_tokens > 500);

        let started = Instant::now();
        let result = second.extract(&request).await.unwrap();
        assert!(!result.degraded);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(provider.call_count(), 2);
    }
}
