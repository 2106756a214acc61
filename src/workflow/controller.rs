use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;

use crate::chat::client::{AnalysisClient, HttpTransport, Transport};
use crate::chat::prompt::PromptBuilder;
use crate::errors::{AnalysisError, DraftField};
use crate::models::analysis::AnalysisResult;
use crate::models::draft::SubmissionDraft;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Input,
    Target,
    Result,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Input => write!(f, "resume"),
            WorkflowState::Target => write!(f, "job description"),
            WorkflowState::Result => write!(f, "results"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    pub min_resume_chars: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            min_resume_chars: 50,
        }
    }
}

type Outcome = Result<AnalysisResult, AnalysisError>;

struct PendingAnalysis {
    generation: u64,
    receiver: oneshot::Receiver<Outcome>,
    task: JoinHandle<()>,
}

/// Three-step session: resume (Input), job description (Target), analysis (Result).
///
/// The analysis itself runs on a spawned Tokio task. Leaving the Target step
/// aborts it, and every completion is tagged with the generation it was
/// started under so a late outcome can never land on a newer session.
pub struct WorkflowController<T = HttpTransport> {
    client: Arc<AnalysisClient<T>>,
    prompts: PromptBuilder,
    settings: WorkflowSettings,
    state: WorkflowState,
    draft: SubmissionDraft,
    result: Option<AnalysisResult>,
    error: Option<AnalysisError>,
    pending: Option<PendingAnalysis>,
    generation: u64,
}

impl<T: Transport + 'static> WorkflowController<T> {
    pub fn new(
        client: Arc<AnalysisClient<T>>,
        prompts: PromptBuilder,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            client,
            prompts,
            settings,
            state: WorkflowState::Input,
            draft: SubmissionDraft::default(),
            result: None,
            error: None,
            pending: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn draft(&self) -> &SubmissionDraft {
        &self.draft
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        self.error.as_ref()
    }

    pub fn is_analyzing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn settings(&self) -> WorkflowSettings {
        self.settings
    }

    /// Stores the resume and advances to the job description step if it is long enough.
    pub fn submit_resume(&mut self, text: impl Into<String>) -> Result<(), AnalysisError> {
        self.expect_state(WorkflowState::Input, "submit a resume")?;

        self.draft.resume_text = text.into();
        let min = self.settings.min_resume_chars.max(1);
        let actual = self.draft.resume_chars();
        if actual < min {
            return self.fail(AnalysisError::ValidationInputTooShort {
                field: DraftField::Resume,
                min,
                actual,
            });
        }

        info!("resume accepted ({} characters)", actual);
        self.error = None;
        self.state = WorkflowState::Target;
        Ok(())
    }

    pub fn submit_job_description(&mut self, text: impl Into<String>) -> Result<(), AnalysisError> {
        self.expect_state(WorkflowState::Target, "edit the job description")?;
        if self.is_analyzing() {
            return Err(AnalysisError::InvalidTransition {
                action: "edit the job description while an analysis is running",
                state: self.state,
            });
        }

        self.draft.job_description_text = text.into();
        debug!(
            "job description updated ({} characters)",
            self.draft.job_description_chars()
        );
        self.error = None;
        Ok(())
    }

    /// Starts an analysis of the current draft and returns without waiting for it.
    ///
    /// Triggering again while one is pending does nothing. Completion is
    /// observed through [`poll_analysis`](Self::poll_analysis) or
    /// [`wait_for_analysis`](Self::wait_for_analysis).
    pub fn run_analysis(&mut self) -> Result<(), AnalysisError> {
        self.expect_state(WorkflowState::Target, "run an analysis")?;
        if self.is_analyzing() {
            debug!("analysis already in flight, ignoring trigger");
            return Ok(());
        }

        for (field, actual) in [
            (DraftField::Resume, self.draft.resume_chars()),
            (DraftField::JobDescription, self.draft.job_description_chars()),
        ] {
            if actual == 0 {
                return self.fail(AnalysisError::ValidationInputTooShort {
                    field,
                    min: 1,
                    actual,
                });
            }
        }

        let request = self.prompts.build(&self.draft);
        self.generation += 1;
        let generation = self.generation;
        let client = Arc::clone(&self.client);
        let (sender, receiver) = oneshot::channel();

        let task = tokio::spawn(async move {
            let outcome = client.submit(&request).await;
            // receiver is gone when the session moved on
            let _ = sender.send(outcome);
        });

        info!("analysis started (generation {})", generation);
        self.error = None;
        self.pending = Some(PendingAnalysis {
            generation,
            receiver,
            task,
        });
        Ok(())
    }

    /// Applies the pending outcome if it has arrived. Returns whether an analysis is still running.
    pub fn poll_analysis(&mut self) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return false;
        };

        let outcome = match pending.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Closed) => Err(task_lost()),
        };
        let generation = pending.generation;
        self.pending = None;
        self.settle(generation, outcome);
        false
    }

    /// Waits for the pending analysis, if any, and applies its outcome.
    pub async fn wait_for_analysis(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        let outcome = (&mut pending.receiver)
            .await
            .unwrap_or_else(|_| Err(task_lost()));
        let generation = pending.generation;
        self.pending = None;
        self.settle(generation, outcome);
    }

    /// Returns from the job description step to the resume step, keeping the draft.
    pub fn go_back(&mut self) -> Result<(), AnalysisError> {
        match self.state {
            WorkflowState::Input => Ok(()),
            WorkflowState::Target => {
                self.cancel_pending();
                self.error = None;
                self.state = WorkflowState::Input;
                debug!("back to the resume step");
                Ok(())
            }
            WorkflowState::Result => Err(AnalysisError::InvalidTransition {
                action: "go back",
                state: self.state,
            }),
        }
    }

    /// Drops everything and starts a fresh session.
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.draft.clear();
        self.result = None;
        self.error = None;
        self.state = WorkflowState::Input;
        info!("workflow reset");
    }

    fn settle(&mut self, generation: u64, outcome: Outcome) {
        if generation != self.generation || self.state != WorkflowState::Target {
            debug!("discarding outcome of stale analysis (generation {})", generation);
            return;
        }

        match outcome {
            Ok(result) => {
                info!("analysis complete, match score {}", result.match_score());
                self.result = Some(result);
                self.error = None;
                self.state = WorkflowState::Result;
            }
            Err(e) => {
                warn!("analysis failed: {}", e);
                self.error = Some(e);
            }
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!("aborting analysis (generation {})", pending.generation);
            pending.task.abort();
        }
        self.generation += 1;
    }

    fn expect_state(
        &self,
        expected: WorkflowState,
        action: &'static str,
    ) -> Result<(), AnalysisError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AnalysisError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }

    fn fail(&mut self, err: AnalysisError) -> Result<(), AnalysisError> {
        warn!("{}", err);
        self.error = Some(err.clone());
        Err(err)
    }
}

impl<T> Drop for WorkflowController<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!("controller dropped, aborting analysis (generation {})", pending.generation);
            pending.task.abort();
        }
    }
}

fn task_lost() -> AnalysisError {
    AnalysisError::Transport("the analysis task stopped before reporting a result".to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::chat::client::testing::*;
    use crate::errors::ErrorKind;

    const RESUME: &str = "Jane Doe. Backend engineer with seven years of Rust, Go and PostgreSQL \
        experience building payment systems.";
    const JOB: &str = "Senior Rust engineer for a payments platform.";

    fn controller(
        transport: Arc<ScriptedTransport>,
        api_key: Option<&str>,
    ) -> WorkflowController<Arc<ScriptedTransport>> {
        WorkflowController::new(
            Arc::new(scripted_client(transport, api_key, 3)),
            PromptBuilder::new(0.2),
            WorkflowSettings::default(),
        )
    }

    fn at_target(transport: Arc<ScriptedTransport>) -> WorkflowController<Arc<ScriptedTransport>> {
        let mut wf = controller(transport, Some("key"));
        wf.submit_resume(RESUME).unwrap();
        wf.submit_job_description(JOB).unwrap();
        wf
    }

    #[tokio::test]
    async fn short_resumes_stay_on_input() {
        let mut wf = controller(Arc::new(ScriptedTransport::new(vec![])), Some("key"));
        for text in ["", "   ", "too short", "x".repeat(49).as_str()] {
            let err = wf.submit_resume(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationInputTooShort);
            assert_eq!(wf.state(), WorkflowState::Input);
            assert_eq!(
                wf.error().map(AnalysisError::kind),
                Some(ErrorKind::ValidationInputTooShort)
            );
        }

        wf.submit_resume("x".repeat(50)).unwrap();
        assert_eq!(wf.state(), WorkflowState::Target);
        assert!(wf.error().is_none());
    }

    #[tokio::test]
    async fn empty_job_description_blocks_analysis() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let mut wf = controller(Arc::clone(&transport), Some("key"));
        wf.submit_resume(RESUME).unwrap();

        let err = wf.run_analysis().unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ValidationInputTooShort {
                field: DraftField::JobDescription,
                ..
            }
        ));
        assert_eq!(wf.state(), WorkflowState::Target);
        assert!(!wf.is_analyzing());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn successful_analysis_reaches_result() {
        let transport = Arc::new(ScriptedTransport::new(vec![envelope(&good_payload())]));
        let mut wf = at_target(Arc::clone(&transport));

        wf.run_analysis().unwrap();
        assert!(wf.is_analyzing());
        assert_eq!(wf.state(), WorkflowState::Target);

        wf.wait_for_analysis().await;
        assert!(!wf.is_analyzing());
        assert_eq!(wf.state(), WorkflowState::Result);
        assert_eq!(wf.result().unwrap().match_score(), 76);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_reports_progress_until_done() {
        let transport = Arc::new(
            ScriptedTransport::new(vec![envelope(&good_payload())])
                .with_latency(Duration::from_millis(500)),
        );
        let mut wf = at_target(transport);

        wf.run_analysis().unwrap();
        assert!(wf.poll_analysis());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!wf.poll_analysis());
        assert_eq!(wf.state(), WorkflowState::Result);
    }

    #[tokio::test(start_paused = true)]
    async fn second_trigger_while_pending_is_ignored() {
        let transport = Arc::new(
            ScriptedTransport::new(vec![envelope(&good_payload())])
                .with_latency(Duration::from_millis(500)),
        );
        let mut wf = at_target(Arc::clone(&transport));

        wf.run_analysis().unwrap();
        wf.run_analysis().unwrap();
        let err = wf.submit_job_description("changed").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(wf.draft().job_description_text, JOB);

        wf.wait_for_analysis().await;
        assert_eq!(wf.state(), WorkflowState::Result);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn failure_keeps_target_and_draft_then_retry_succeeds() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            envelope("not json at all"),
            envelope(&good_payload()),
        ]));
        let mut wf = at_target(Arc::clone(&transport));

        wf.run_analysis().unwrap();
        wf.wait_for_analysis().await;
        assert_eq!(wf.state(), WorkflowState::Target);
        assert!(!wf.is_analyzing());
        assert_eq!(wf.error().map(AnalysisError::kind), Some(ErrorKind::MalformedResponse));
        assert!(wf.result().is_none());
        assert_eq!(wf.draft().resume_text, RESUME);
        assert_eq!(wf.draft().job_description_text, JOB);

        wf.run_analysis().unwrap();
        assert!(wf.error().is_none());
        wf.wait_for_analysis().await;
        assert_eq!(wf.state(), WorkflowState::Result);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn missing_key_is_reported_on_target() {
        let transport = Arc::new(ScriptedTransport::new(vec![envelope(&good_payload())]));
        let mut wf = controller(Arc::clone(&transport), None);
        wf.submit_resume(RESUME).unwrap();
        wf.submit_job_description(JOB).unwrap();

        wf.run_analysis().unwrap();
        wf.wait_for_analysis().await;
        assert_eq!(wf.state(), WorkflowState::Target);
        assert_eq!(wf.error().map(AnalysisError::kind), Some(ErrorKind::ConfigurationError));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn going_back_discards_the_pending_attempt() {
        let transport = Arc::new(
            ScriptedTransport::new(vec![envelope(&good_payload())])
                .with_latency(Duration::from_millis(500)),
        );
        let mut wf = at_target(transport);

        wf.run_analysis().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        wf.go_back().unwrap();
        assert_eq!(wf.state(), WorkflowState::Input);
        assert!(!wf.is_analyzing());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!wf.poll_analysis());
        assert_eq!(wf.state(), WorkflowState::Input);
        assert!(wf.result().is_none());
        assert_eq!(wf.draft().job_description_text, JOB);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_the_pending_attempt() {
        let transport = Arc::new(
            ScriptedTransport::new(vec![envelope(&good_payload())])
                .with_latency(Duration::from_millis(500)),
        );
        let mut wf = at_target(transport.clone());

        wf.run_analysis().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        wf.reset();
        assert!(!wf.is_analyzing());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!wf.poll_analysis());
        assert_eq!(wf.state(), WorkflowState::Input);
        assert!(wf.result().is_none());
        assert!(wf.error().is_none());
        assert_eq!(wf.draft(), &SubmissionDraft::default());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_controller_stops_retries() {
        // every call fails, so a live task would keep retrying
        let transport =
            Arc::new(ScriptedTransport::new(vec![]).with_latency(Duration::from_millis(500)));
        let mut wf = at_target(transport.clone());

        wf.run_analysis().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.call_count(), 1);
        drop(wf);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn stale_outcomes_are_ignored() {
        let mut wf = at_target(Arc::new(ScriptedTransport::new(vec![])));
        let stale_generation = wf.generation;
        wf.go_back().unwrap();
        wf.submit_resume(RESUME).unwrap();

        let result = crate::models::analysis::validate(&good_payload()).unwrap();
        wf.settle(stale_generation, Ok(result));
        assert_eq!(wf.state(), WorkflowState::Target);
        assert!(wf.result().is_none());
    }

    #[tokio::test]
    async fn reset_from_result_starts_a_fresh_session() {
        let transport = Arc::new(ScriptedTransport::new(vec![envelope(&good_payload())]));
        let mut wf = at_target(transport);
        wf.run_analysis().unwrap();
        wf.wait_for_analysis().await;
        assert_eq!(wf.state(), WorkflowState::Result);

        wf.reset();
        assert_eq!(wf.state(), WorkflowState::Input);
        assert!(wf.result().is_none());
        assert!(wf.error().is_none());
        assert_eq!(wf.draft(), &SubmissionDraft::default());

        wf.submit_resume(RESUME).unwrap();
        assert_eq!(wf.state(), WorkflowState::Target);
        assert_eq!(wf.draft().job_description_text, "");
    }

    #[tokio::test]
    async fn out_of_order_calls_are_rejected() {
        let transport = Arc::new(ScriptedTransport::new(vec![envelope(&good_payload())]));
        let mut wf = controller(transport, Some("key"));

        assert_eq!(
            wf.submit_job_description(JOB).unwrap_err().kind(),
            ErrorKind::InvalidTransition
        );
        assert_eq!(wf.run_analysis().unwrap_err().kind(), ErrorKind::InvalidTransition);
        assert!(wf.go_back().is_ok());
        assert_eq!(wf.state(), WorkflowState::Input);

        wf.submit_resume(RESUME).unwrap();
        assert_eq!(wf.submit_resume(RESUME).unwrap_err().kind(), ErrorKind::InvalidTransition);
        wf.submit_job_description(JOB).unwrap();
        wf.run_analysis().unwrap();
        wf.wait_for_analysis().await;

        assert_eq!(wf.go_back().unwrap_err().kind(), ErrorKind::InvalidTransition);
        assert_eq!(wf.state(), WorkflowState::Result);
    }
}
