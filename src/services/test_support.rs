//! Scripted executor double and polling helpers for scheduler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::models::{ProgressUpdate, RunOutcome, StepResult, StepStatus};

use super::executor::{ExecutionRequest, ExecutorError, ProgressReporter, TestSetExecutor};

/// Behaviour of the double for one test set.
#[derive(Debug, Clone)]
pub enum Script {
    Pass,
    /// Report one failed step and finish normally.
    FailStep,
    /// Return an executor error.
    Fail(&'static str),
    /// Finish normally with exactly this outcome.
    Report(RunOutcome),
    Panic,
}

/// Executor double keyed by test set id. Unscripted sets pass.
pub struct ScriptedExecutor {
    scripts: HashMap<i32, Script>,
    hold: Option<Arc<Semaphore>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<i32>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            hold: None,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Every execution blocks until a permit is added to the returned semaphore.
    pub fn held() -> (Self, Arc<Semaphore>) {
        let hold = Arc::new(Semaphore::new(0));
        let executor = Self {
            hold: Some(Arc::clone(&hold)),
            ..Self::new()
        };
        (executor, hold)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn script(mut self, test_set_id: i32, script: Script) -> Self {
        self.scripts.insert(test_set_id, script);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Run ids in the order their execution started.
    pub fn started(&self) -> Vec<i32> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestSetExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        request: ExecutionRequest,
        progress: ProgressReporter,
    ) -> Result<RunOutcome, ExecutorError> {
        self.started.lock().unwrap().push(request.test_run_id);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        progress.report(ProgressUpdate {
            current_scenario: Some("Scenario A".to_string()),
            completed_steps: 1,
            total_steps: 4,
            total_scenarios: 1,
            passed_steps: 1,
            ..Default::default()
        });

        if let Some(hold) = &self.hold {
            if let Ok(permit) = hold.acquire().await {
                permit.forget();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = self
            .scripts
            .get(&request.test_set_id)
            .cloned()
            .unwrap_or(Script::Pass);
        match script {
            Script::Pass => Ok(outcome(request.test_set_id, 0)),
            Script::FailStep => Ok(outcome(request.test_set_id, 1)),
            Script::Fail(message) => Err(ExecutorError::Transport(message.to_string())),
            Script::Report(outcome) => Ok(outcome),
            Script::Panic => panic!("scripted panic"),
        }
    }
}

fn outcome(test_set_id: i32, failed: i32) -> RunOutcome {
    let steps = (0..4)
        .map(|i| StepResult {
            step_id: test_set_id * 10 + i,
            scenario_name: "Scenario A".to_string(),
            case_name: "Case 1".to_string(),
            description: format!("Step {}", i + 1),
            status: if i < 4 - failed {
                StepStatus::Passed
            } else {
                StepStatus::Failed
            },
            duration_ms: 5,
            error_message: (i >= 4 - failed).then(|| "assertion failed".to_string()),
        })
        .collect();

    RunOutcome {
        duration_ms: 20,
        total_scenarios: 1,
        total_steps: 4,
        passed_steps: 4 - failed,
        failed_steps: failed,
        steps,
        ..Default::default()
    }
}

/// Outcome whose step counters sum past `i32::MAX`.
pub fn overflowing_outcome() -> RunOutcome {
    RunOutcome {
        duration_ms: 20,
        total_scenarios: 1,
        total_steps: 5,
        passed_steps: i32::MAX,
        failed_steps: 1,
        ..Default::default()
    }
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
