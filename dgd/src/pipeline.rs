//! Diagram generation pipeline
//!
//! Drives one session from pending to a terminal state: compose the
//! prompt, call the generation service through the retry executor,
//! validate the extracted diagram, and record the outcome. Every stage
//! boundary re-reads the session so cancelled or timed-out work is
//! discarded instead of applied. Nothing in here returns an error to
//! the submitter; failures land on the session.

use std::sync::Arc;

use tracing::{debug, info, warn};

use diagramscript::{Validator, extract_diagram_source};

use crate::classify::ErrorKind;
use crate::llm::{CallOptions, GenerationClient, GenerationRequest};
use crate::prompts;
use crate::retry::{RetryExecutor, fallback_payload};
use crate::session::{
    Clock, Progress, Session, SessionFailure, SessionOutcome, SessionPatch, SessionStatus, SessionStore, SystemClock,
};

/// Orchestrates the generation stages for accepted sessions
pub struct Pipeline {
    store: Arc<SessionStore>,
    client: Arc<dyn GenerationClient>,
    executor: Arc<RetryExecutor>,
    validator: Validator,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(store: Arc<SessionStore>, client: Arc<dyn GenerationClient>, executor: Arc<RetryExecutor>) -> Self {
        Self::with_clock(store, client, executor, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<SessionStore>,
        client: Arc<dyn GenerationClient>,
        executor: Arc<RetryExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            client,
            executor,
            validator: Validator::default(),
            clock,
        }
    }

    /// Run a session to a terminal state
    ///
    /// Safe to call on a session that was already cancelled or swept;
    /// the first boundary check discards the work.
    pub async fn run(&self, session_id: &str) {
        debug!(session_id, "Pipeline::run: called");

        // processing: compose the prompt
        let patch = SessionPatch::new()
            .with_status(SessionStatus::Processing)
            .with_progress(Progress::at("processing", 10, "Analyzing requirement"));
        let Some(session) = self.advance(session_id, patch, SessionStatus::Processing).await else {
            return;
        };

        let stage_start = self.clock.now_ms();
        let (system, user) = match prompts::compose(&session.request) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(session_id, error = %e, "Pipeline::run: prompt composition failed");
                let failure =
                    SessionFailure::new(ErrorKind::System, ErrorKind::System.user_message()).with_detail(e.to_string());
                self.fail(session_id, failure, None).await;
                return;
            }
        };
        let processing_ms = (self.clock.now_ms() - stage_start).max(0) as u64;

        // generating: call the generation service
        let patch = SessionPatch::new()
            .with_status(SessionStatus::Generating)
            .with_progress(
                Progress::at("generating", 40, "Calling the generation service")
                    .with_completed(vec!["processing".to_string()]),
            )
            .with_stage_timing("processing", processing_ms);
        if self.advance(session_id, patch, SessionStatus::Generating).await.is_none() {
            return;
        }

        let stage_start = self.clock.now_ms();
        let options = CallOptions {
            model: session.request.options.model.clone(),
            ..CallOptions::default()
        };
        let gen_request = GenerationRequest::new(system, user).with_options(options);

        let client = Arc::clone(&self.client);
        let generated = self
            .executor
            .execute("generate_diagram", || {
                let client = Arc::clone(&client);
                let request = gen_request.clone();
                async move { client.complete(request).await }
            })
            .await;
        let generating_ms = (self.clock.now_ms() - stage_start).max(0) as u64;

        // Retries beyond the first attempt, stamped onto the session at
        // whatever terminal state it reaches.
        let (raw_text, degraded, retry_count) = match generated {
            Ok(success) => (success.value.content, false, Some(success.attempts.saturating_sub(1))),
            Err(retry_error) => {
                let retries = retry_error.attempts.saturating_sub(1);
                // Only auth and rate-limit failures earn the canned payload;
                // everything else fails the session.
                let payload = if matches!(retry_error.kind, ErrorKind::Auth | ErrorKind::RateLimit) {
                    fallback_payload("generate_diagram", &session.request.requirement)
                } else {
                    None
                };
                match payload {
                    Some(source) => {
                        info!(
                            session_id,
                            kind = %retry_error.kind,
                            attempts = retry_error.attempts,
                            "Pipeline::run: generation degraded to fallback diagram"
                        );
                        (source, true, Some(retries))
                    }
                    None => {
                        let failure = SessionFailure::new(retry_error.kind, retry_error.message.clone())
                            .with_detail(retry_error.source.to_string());
                        self.fail(session_id, failure, Some(retries)).await;
                        return;
                    }
                }
            }
        };

        // validating: extract and check the diagram source
        let patch = SessionPatch::new()
            .with_status(SessionStatus::Validating)
            .with_progress(
                Progress::at("validating", 75, "Validating diagram").with_completed(vec![
                    "processing".to_string(),
                    "generating".to_string(),
                ]),
            )
            .with_stage_timing("generating", generating_ms);
        if self.advance(session_id, patch, SessionStatus::Validating).await.is_none() {
            return;
        }

        let stage_start = self.clock.now_ms();
        let source = extract_diagram_source(&raw_text);
        // A fallback payload is ours, not the model's; never hold it to
        // the caller's requested type.
        let expected = if degraded { None } else { session.request.options.diagram_type };
        let validation = self.validator.validate(&source, expected);
        let validating_ms = (self.clock.now_ms() - stage_start).max(0) as u64;

        if !validation.is_valid {
            let detail = validation
                .issues
                .iter()
                .map(|issue| issue.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            let failure =
                SessionFailure::new(ErrorKind::Validation, ErrorKind::Validation.user_message()).with_detail(detail);
            self.fail(session_id, failure, retry_count).await;
            return;
        }

        let (Some(diagram_source), Some(diagram_type), Some(stats)) =
            (validation.normalized, validation.detected_type, validation.stats)
        else {
            let failure = SessionFailure::new(ErrorKind::System, ErrorKind::System.user_message())
                .with_detail("validation reported success without a normalized diagram".to_string());
            self.fail(session_id, failure, retry_count).await;
            return;
        };

        let outcome = SessionOutcome {
            diagram_source,
            diagram_type,
            stats,
            degraded,
        };

        let message = if degraded {
            "Diagram ready (fallback, generation unavailable)"
        } else {
            "Diagram ready"
        };
        let mut patch = SessionPatch::new()
            .with_status(SessionStatus::Completed)
            .with_progress(Progress::at("completed", 100, message).with_completed(vec![
                "processing".to_string(),
                "generating".to_string(),
                "validating".to_string(),
            ]))
            .with_result(outcome)
            .with_stage_timing("validating", validating_ms);
        if let Some(retries) = retry_count {
            patch = patch.with_retry_count(retries);
        }

        if self.advance(session_id, patch, SessionStatus::Completed).await.is_some() {
            info!(session_id, degraded, "Session completed");
        }
    }

    /// Apply a stage patch; `None` means the work must be discarded
    async fn advance(&self, session_id: &str, patch: SessionPatch, target: SessionStatus) -> Option<Session> {
        match self.store.update(session_id, patch).await {
            Ok(session) if session.status == target => Some(session),
            Ok(session) => {
                debug!(
                    session_id,
                    status = %session.status,
                    "Pipeline::advance: session already terminal, discarding work"
                );
                None
            }
            Err(e) => {
                warn!(session_id, error = %e, "Pipeline::advance: update rejected");
                None
            }
        }
    }

    /// Record a terminal failure on the session
    async fn fail(&self, session_id: &str, failure: SessionFailure, retry_count: Option<u32>) {
        warn!(
            session_id,
            kind = %failure.kind,
            detail = failure.detail.as_deref().unwrap_or(""),
            "Session failed"
        );

        let mut patch = SessionPatch::new()
            .with_status(SessionStatus::Failed)
            .with_error(failure);
        if let Some(retries) = retry_count {
            patch = patch.with_retry_count(retries);
        }

        if let Err(e) = self.store.update(session_id, patch).await {
            warn!(session_id, error = %e, "Pipeline::fail: could not record failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use diagramscript::types::DiagramType;

    use crate::config::{RetryConfig, SessionConfig};
    use crate::llm::GenerationError;
    use crate::llm::client::mock::MockGenerationClient;
    use crate::session::SessionRequest;

    const FLOWCHART_REPLY: &str = "Here is your diagram:\n```mermaid\nflowchart TD\n  A[Login] --> B[Orders]\n  B --> C[Detail]\n```\nLet me know if you need changes.";

    fn fast_retries() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            jitter_range: 0.0,
        }
    }

    fn harness(outcomes: Vec<Result<crate::llm::GenerationResponse, GenerationError>>) -> (Arc<SessionStore>, Pipeline) {
        let store = Arc::new(SessionStore::new(SessionConfig::default()));
        let client = Arc::new(MockGenerationClient::new(outcomes));
        let executor = Arc::new(RetryExecutor::new(fast_retries()));
        let pipeline = Pipeline::new(store.clone(), client, executor);
        (store, pipeline)
    }

    fn text_harness(texts: Vec<&str>) -> (Arc<SessionStore>, Pipeline) {
        let store = Arc::new(SessionStore::new(SessionConfig::default()));
        let client = Arc::new(MockGenerationClient::with_texts(texts));
        let executor = Arc::new(RetryExecutor::new(fast_retries()));
        let pipeline = Pipeline::new(store.clone(), client, executor);
        (store, pipeline)
    }

    #[tokio::test]
    async fn test_happy_path_completes_with_outcome() {
        let (store, pipeline) = text_harness(vec![FLOWCHART_REPLY]);
        let session = store.create(SessionRequest::new("User order browsing")).await.unwrap();

        pipeline.run(&session.id).await;

        let done = store.get(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);

        let outcome = done.result.unwrap();
        assert!(outcome.diagram_source.starts_with("flowchart TD"));
        assert_eq!(outcome.diagram_type, DiagramType::Flowchart);
        assert!(!outcome.degraded);
        assert_eq!(outcome.stats.node_count, 3);

        assert_eq!(done.progress.percent, 100);
        assert_eq!(done.progress.completed_steps.len(), 3);
        assert!(done.stage_timings.contains_key("processing"));
        assert!(done.stage_timings.contains_key("generating"));
        assert!(done.stage_timings.contains_key("validating"));
        assert!(done.processing_ms.is_some());

        assert_eq!(store.stats().await.completed, 1);
    }

    #[tokio::test]
    async fn test_unrecognized_output_fails_validation() {
        let (store, pipeline) = text_harness(vec!["I could not produce a diagram, sorry."]);
        let session = store.create(SessionRequest::new("User order browsing")).await.unwrap();

        pipeline.run(&session.id).await;

        let done = store.get(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Failed);
        assert!(done.result.is_none());

        let error = done.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert!(error.detail.unwrap().contains("unknown_diagram_type"));
    }

    #[tokio::test]
    async fn test_type_mismatch_fails_validation() {
        let (store, pipeline) = text_harness(vec![FLOWCHART_REPLY]);

        let mut request = SessionRequest::new("User order browsing");
        request.options.diagram_type = Some(DiagramType::Sequence);
        let session = store.create(request).await.unwrap();

        pipeline.run(&session.id).await;

        let done = store.get(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Failed);
        assert_eq!(done.error.unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_transient_failure_then_success_records_retries() {
        let (store, pipeline) = harness(vec![
            Err(GenerationError::Timeout(Duration::from_secs(1))),
            Ok(crate::llm::GenerationResponse::text(FLOWCHART_REPLY)),
        ]);
        let session = store.create(SessionRequest::new("User order browsing")).await.unwrap();

        pipeline.run(&session.id).await;

        let done = store.get(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.retry_count, 1);
        assert!(!done.result.unwrap().degraded);
    }

    #[tokio::test]
    async fn test_auth_failure_degrades_to_fallback() {
        let (store, pipeline) = harness(vec![Err(GenerationError::Api {
            status: 401,
            message: "invalid key".to_string(),
        })]);
        let session = store.create(SessionRequest::new("User order browsing")).await.unwrap();

        pipeline.run(&session.id).await;

        let done = store.get(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        // auth is not retryable, so the only attempt was the first
        assert_eq!(done.retry_count, 0);

        let outcome = done.result.unwrap();
        assert!(outcome.degraded);
        assert!(outcome.diagram_source.starts_with("flowchart TD"));
        assert!(done.error.is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_degrades_to_fallback() {
        let rate_limited = || {
            Err(GenerationError::RateLimited {
                retry_after: Duration::from_millis(1),
            })
        };
        // max_retries 2 allows 3 attempts, all rate limited
        let (store, pipeline) = harness(vec![rate_limited(), rate_limited(), rate_limited()]);
        let session = store.create(SessionRequest::new("User order browsing")).await.unwrap();

        pipeline.run(&session.id).await;

        let done = store.get(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert!(done.result.unwrap().degraded);
        assert_eq!(done.retry_count, 2);
    }

    #[tokio::test]
    async fn test_fallback_ignores_requested_type() {
        let mut request = SessionRequest::new("User order browsing");
        request.options.diagram_type = Some(DiagramType::Sequence);

        let (store, pipeline) = harness(vec![Err(GenerationError::Api {
            status: 401,
            message: "invalid key".to_string(),
        })]);
        let session = store.create(request).await.unwrap();

        pipeline.run(&session.id).await;

        // The canned flowchart completes even though a sequence diagram
        // was requested.
        let done = store.get(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.result.unwrap().diagram_type, DiagramType::Flowchart);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_fails_with_kind() {
        let timeout = || Err(GenerationError::Timeout(Duration::from_secs(1)));
        let (store, pipeline) = harness(vec![timeout(), timeout(), timeout()]);
        let session = store.create(SessionRequest::new("User order browsing")).await.unwrap();

        pipeline.run(&session.id).await;

        let done = store.get(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Failed);
        assert_eq!(done.retry_count, 2);

        let error = done.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.message, ErrorKind::Timeout.user_message());
    }

    #[tokio::test]
    async fn test_cancelled_session_discards_work() {
        let (store, pipeline) = text_harness(vec![FLOWCHART_REPLY]);
        let session = store.create(SessionRequest::new("User order browsing")).await.unwrap();
        store.cancel(&session.id).await.unwrap();

        pipeline.run(&session.id).await;

        let done = store.get(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Failed);
        assert!(done.result.is_none());
        // the cancellation failure is untouched
        assert_eq!(done.error.unwrap().kind, ErrorKind::System);
    }

    #[tokio::test]
    async fn test_missing_session_is_harmless() {
        let (_, pipeline) = text_harness(vec![FLOWCHART_REPLY]);
        pipeline.run("no-such-session").await;
    }
}
