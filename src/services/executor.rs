//! Single-run executor capability.
//!
//! The queue and the batch orchestrator only depend on [`TestSetExecutor`];
//! the production implementation is the HTTP runner client, tests inject a
//! scripted double. [`ExecutionContext::run_to_completion`] is the one path
//! both schedulers use to drive a run to a persisted terminal state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::db::DbPool;
use crate::models::{
    BatchItem, ProgressUpdate, QueueItem, RunCompletion, RunOutcome, RunStatus, WsEvent,
};

use super::concurrency::ExecutionGate;
use super::event_broadcaster::EventBroadcaster;

/// What the executor needs to run one test set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub test_run_id: i32,
    pub test_set_id: i32,
    pub release_id: i32,
    pub base_url: String,
}

impl From<&QueueItem> for ExecutionRequest {
    fn from(item: &QueueItem) -> Self {
        Self {
            test_run_id: item.test_run_id,
            test_set_id: item.test_set_id,
            release_id: item.release_id,
            base_url: item.base_url.clone(),
        }
    }
}

impl From<&BatchItem> for ExecutionRequest {
    fn from(item: &BatchItem) -> Self {
        Self {
            test_run_id: item.test_run_id,
            test_set_id: item.test_set_id,
            release_id: item.release_id,
            base_url: item.base_url.clone(),
        }
    }
}

/// Executor failures. These never reach HTTP callers; they end up in the
/// run's failure details.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Runner request failed: {0}")]
    Transport(String),

    #[error("Runner rejected run with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("{reason}")]
    Aborted {
        reason: String,
        partial: Option<RunOutcome>,
    },

    #[error("Executor panicked: {0}")]
    Panicked(String),
}

impl ExecutorError {
    /// Aggregates the executor managed to collect before failing.
    pub fn partial(&self) -> Option<&RunOutcome> {
        match self {
            Self::Aborted { partial, .. } => partial.as_ref(),
            _ => None,
        }
    }
}

/// Latest progress update per in-flight run.
#[derive(Clone, Default)]
pub struct ProgressStore {
    entries: Arc<Mutex<HashMap<i32, ProgressUpdate>>>,
}

impl ProgressStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<i32, ProgressUpdate>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an update, replacing the previous one for that run.
    pub fn record(&self, test_run_id: i32, mut update: ProgressUpdate) {
        update.updated_at = Some(Utc::now());
        self.lock().insert(test_run_id, update);
    }

    pub fn get(&self, test_run_id: i32) -> Option<ProgressUpdate> {
        self.lock().get(&test_run_id).cloned()
    }

    pub fn clear(&self, test_run_id: i32) {
        self.lock().remove(&test_run_id);
    }

    pub fn reporter(&self, test_run_id: i32) -> ProgressReporter {
        ProgressReporter {
            test_run_id,
            store: self.clone(),
        }
    }
}

/// Handle given to an executor to publish progress for its run.
#[derive(Clone)]
pub struct ProgressReporter {
    test_run_id: i32,
    store: ProgressStore,
}

impl ProgressReporter {
    pub fn test_run_id(&self) -> i32 {
        self.test_run_id
    }

    pub fn report(&self, update: ProgressUpdate) {
        self.store.record(self.test_run_id, update);
    }
}

/// Executes one test set against a base URL.
#[async_trait]
pub trait TestSetExecutor: Send + Sync + 'static {
    async fn execute(
        &self,
        request: ExecutionRequest,
        progress: ProgressReporter,
    ) -> Result<RunOutcome, ExecutorError>;
}

/// Everything needed to run a test set and record its result.
#[derive(Clone)]
pub struct ExecutionContext {
    pub pool: DbPool,
    pub executor: Arc<dyn TestSetExecutor>,
    pub progress: ProgressStore,
    pub gate: ExecutionGate,
    pub events: EventBroadcaster,
}

impl ExecutionContext {
    pub fn new(
        pool: DbPool,
        executor: Arc<dyn TestSetExecutor>,
        gate: ExecutionGate,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            pool,
            executor,
            progress: ProgressStore::default(),
            gate,
            events,
        }
    }

    /// Execute a run and persist its terminal state.
    ///
    /// Executor errors and panics are caught and recorded as a `failed` run
    /// with whatever aggregates were reported; the caller always gets a
    /// terminal status back. Execution and recording run in one spawned task
    /// so a panic in either still leaves the row terminal.
    pub async fn run_to_completion(
        &self,
        request: ExecutionRequest,
        batch_id: Option<&str>,
    ) -> RunStatus {
        let _permit = self.gate.acquire().await;
        let test_run_id = request.test_run_id;

        info!(test_run_id, batch_id, test_set_id = request.test_set_id, "Run started");
        self.events
            .publish(WsEvent::run_started(test_run_id, batch_id.map(str::to_string)));

        let started = Instant::now();
        let context = self.clone();
        let owned_batch_id = batch_id.map(str::to_string);
        let status = match tokio::spawn(async move {
            context
                .execute_and_record(request, owned_batch_id.as_deref(), started)
                .await
        })
        .await
        {
            Ok(status) => status,
            Err(join_error) => {
                let e = ExecutorError::Panicked(panic_message(join_error));
                error!(test_run_id, batch_id, error = %e, "Run task panicked");
                let partial = self.partial_from_progress(test_run_id, started);
                self.record(test_run_id, RunCompletion::crashed(partial, &e.to_string()))
                    .await
            }
        };
        self.progress.clear(test_run_id);

        let elapsed_ms = elapsed_ms(started);
        info!(test_run_id, batch_id, status = %status, elapsed_ms, "Run finished");
        self.events.publish(WsEvent::run_completed(
            test_run_id,
            batch_id.map(str::to_string),
            status,
        ));

        status
    }

    async fn execute_and_record(
        &self,
        request: ExecutionRequest,
        batch_id: Option<&str>,
        started: Instant,
    ) -> RunStatus {
        let test_run_id = request.test_run_id;
        let reporter = self.progress.reporter(test_run_id);

        let completion = match self.executor.execute(request, reporter).await {
            Ok(outcome) => RunCompletion::finished(outcome),
            Err(e) => {
                warn!(test_run_id, batch_id, error = %e, "Run aborted");
                let partial = e
                    .partial()
                    .cloned()
                    .or_else(|| self.partial_from_progress(test_run_id, started));
                RunCompletion::crashed(partial, &e.to_string())
            }
        };
        self.record(test_run_id, completion).await
    }

    fn partial_from_progress(&self, test_run_id: i32, started: Instant) -> Option<RunOutcome> {
        self.progress
            .get(test_run_id)
            .map(|progress| RunOutcome::from_progress(&progress, elapsed_ms(started)))
    }

    async fn record(&self, test_run_id: i32, completion: RunCompletion) -> RunStatus {
        let status = completion.status;
        match self.pool.complete_test_run(test_run_id, completion).await {
            Ok(true) => {}
            Ok(false) => warn!(test_run_id, "Run was already terminal, result discarded"),
            Err(e) => error!(
                test_run_id,
                error = %e,
                "Failed to persist run result, row left running"
            ),
        }
        status
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn panic_message(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return "executor task was cancelled".to_string();
    }
    let payload = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;
    use crate::models::TestRunResponse;
    use crate::services::test_support::{Script, ScriptedExecutor, overflowing_outcome};

    async fn context_with(executor: ScriptedExecutor) -> (ExecutionContext, i32) {
        let pool = test_support::memory_pool().await;
        let release = test_support::seed_release(&pool, "3.0").await;
        let context = ExecutionContext::new(
            pool,
            Arc::new(executor),
            ExecutionGate::unbounded(),
            EventBroadcaster::new(),
        );
        (context, release)
    }

    async fn request_for(context: &ExecutionContext, release: i32, test_set_id: i32) -> ExecutionRequest {
        let run = context
            .pool
            .insert_test_run(test_support::new_run(release, test_set_id, "Checkout"))
            .await
            .unwrap();
        ExecutionRequest {
            test_run_id: run.id,
            test_set_id,
            release_id: release,
            base_url: run.base_url,
        }
    }

    #[test]
    fn test_progress_store_keeps_latest_update() {
        let store = ProgressStore::default();
        let reporter = store.reporter(5);

        reporter.report(ProgressUpdate {
            completed_steps: 1,
            total_steps: 4,
            ..Default::default()
        });
        reporter.report(ProgressUpdate {
            completed_steps: 3,
            total_steps: 4,
            ..Default::default()
        });

        let latest = store.get(5).unwrap();
        assert_eq!(latest.completed_steps, 3);
        assert!(latest.updated_at.is_some());

        store.clear(5);
        assert!(store.get(5).is_none());
    }

    #[tokio::test]
    async fn test_successful_run_is_persisted() {
        let (context, release) = context_with(ScriptedExecutor::new()).await;
        let request = request_for(&context, release, 1).await;
        let id = request.test_run_id;

        let status = context.run_to_completion(request, None).await;
        assert_eq!(status, RunStatus::Passed);

        let stored: TestRunResponse = context.pool.get_test_run(id).await.unwrap().unwrap().into();
        assert_eq!(stored.status, RunStatus::Passed);
        assert_eq!(stored.total_steps, 4);
        assert!(context.progress.get(id).is_none());
    }

    #[tokio::test]
    async fn test_failure_records_partial_progress() {
        let executor = ScriptedExecutor::new().script(2, Script::Fail("browser crashed"));
        let (context, release) = context_with(executor).await;
        let request = request_for(&context, release, 2).await;
        let id = request.test_run_id;

        let status = context.run_to_completion(request, None).await;
        assert_eq!(status, RunStatus::Failed);

        let stored: TestRunResponse = context.pool.get_test_run(id).await.unwrap().unwrap().into();
        assert_eq!(stored.status, RunStatus::Failed);
        // Aggregates from the last progress update survive the crash
        assert_eq!(stored.total_steps, 4);
        assert_eq!(stored.passed_steps, 1);
        let last = stored.failed_details.last().unwrap();
        assert!(last.error_message.contains("browser crashed"));
    }

    #[tokio::test]
    async fn test_panicking_executor_marks_run_failed() {
        let executor = ScriptedExecutor::new().script(3, Script::Panic);
        let (context, release) = context_with(executor).await;
        let request = request_for(&context, release, 3).await;
        let id = request.test_run_id;

        let status = context.run_to_completion(request, Some("batch-1-ff")).await;
        assert_eq!(status, RunStatus::Failed);

        let stored: TestRunResponse = context.pool.get_test_run(id).await.unwrap().unwrap().into();
        assert_eq!(stored.status, RunStatus::Failed);
        assert!(
            stored
                .failed_details
                .iter()
                .any(|d| d.error_message.contains("scripted panic"))
        );
    }

    #[tokio::test]
    async fn test_overflowing_outcome_is_recorded_terminal() {
        let executor = ScriptedExecutor::new().script(4, Script::Report(overflowing_outcome()));
        let (context, release) = context_with(executor).await;
        let request = request_for(&context, release, 4).await;
        let id = request.test_run_id;

        let status = context.run_to_completion(request, None).await;
        assert_eq!(status, RunStatus::Failed);

        let stored: TestRunResponse = context.pool.get_test_run(id).await.unwrap().unwrap().into();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.total_steps, i32::MAX);
        assert!(context.progress.get(id).is_none());
    }
}
