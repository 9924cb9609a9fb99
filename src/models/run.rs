//! Test run domain models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use crate::entity::{test_run, test_run_step};

use super::ProgressUpdate;

/// Test run status.
///
/// A run stays `Running` until the executor reports completion; afterwards the
/// row is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Passed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Combine member statuses with precedence `running > failed > passed`.
    ///
    /// The result does not depend on iteration order. An empty set is `Passed`.
    pub fn precedence<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = RunStatus>,
    {
        let mut combined = Self::Passed;
        for status in statuses {
            match status {
                Self::Running => return Self::Running,
                Self::Failed => combined = Self::Failed,
                Self::Passed => {}
            }
        }
        combined
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Step result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Unknown values are treated as failed.
    pub fn parse(s: &str) -> Self {
        match s {
            "passed" => Self::Passed,
            "skipped" => Self::Skipped,
            _ => Self::Failed,
        }
    }
}

/// Structured failure record stored in `test_runs.failed_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailedDetail {
    pub scenario_name: String,
    pub case_name: String,
    pub step_description: String,
    pub error_message: String,
    /// Screenshot file name under the run's screenshot directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl FailedDetail {
    /// Serialize an ordered list for the JSONB column. Empty lists are stored as NULL.
    pub fn list_to_json(details: &[FailedDetail]) -> Option<JsonValue> {
        if details.is_empty() {
            None
        } else {
            serde_json::to_value(details).ok()
        }
    }

    /// Deserialize the JSONB column; malformed values read as an empty list.
    pub fn list_from_json(value: Option<&JsonValue>) -> Vec<FailedDetail> {
        value
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// One step result reported by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: i32,
    pub scenario_name: String,
    pub case_name: String,
    #[serde(default)]
    pub description: String,
    pub status: StepStatus,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Result of executing one test set, as reported by the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub total_scenarios: i32,
    #[serde(default)]
    pub total_steps: i32,
    #[serde(default)]
    pub passed_steps: i32,
    #[serde(default)]
    pub failed_steps: i32,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub failed_details: Vec<FailedDetail>,
    #[serde(default)]
    pub video_path: Option<String>,
}

impl RunOutcome {
    /// Terminal status implied by the counters.
    pub fn status(&self) -> RunStatus {
        if self.failed_steps > 0 || !self.failed_details.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        }
    }

    /// Clamp counters so `passed_steps + failed_steps <= total_steps` holds.
    /// A step sum past `i32::MAX` is cut back on the passed side.
    pub fn normalized(mut self) -> Self {
        self.passed_steps = self.passed_steps.max(0);
        self.failed_steps = self.failed_steps.max(0);
        if self.passed_steps.checked_add(self.failed_steps).is_none() {
            self.passed_steps = i32::MAX - self.failed_steps;
        }
        self.total_steps = self
            .total_steps
            .max(self.passed_steps + self.failed_steps);
        self.total_scenarios = self.total_scenarios.max(0);
        self.duration_ms = self.duration_ms.max(0);
        self
    }

    /// Partial aggregates recovered from the last progress update of a run
    /// that did not finish.
    pub fn from_progress(progress: &ProgressUpdate, duration_ms: i64) -> Self {
        RunOutcome {
            duration_ms,
            total_scenarios: progress.total_scenarios,
            total_steps: progress.total_steps,
            passed_steps: progress.passed_steps,
            failed_steps: progress.failed_steps,
            ..Default::default()
        }
        .normalized()
    }
}

/// Terminal write applied to a run row.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub outcome: RunOutcome,
}

impl RunCompletion {
    /// Completion from a run the executor finished.
    pub fn finished(outcome: RunOutcome) -> Self {
        let outcome = outcome.normalized();
        Self {
            status: outcome.status(),
            outcome,
        }
    }

    /// Completion from an executor failure. The run is always `failed` and the
    /// error is appended to the failure details.
    pub fn crashed(partial: Option<RunOutcome>, error: &str) -> Self {
        let mut outcome = partial.unwrap_or_default().normalized();
        outcome.failed_details.push(FailedDetail {
            scenario_name: String::new(),
            case_name: String::new(),
            step_description: "Execution aborted".to_string(),
            error_message: error.to_string(),
            screenshot: None,
        });
        Self {
            status: RunStatus::Failed,
            outcome,
        }
    }
}

/// Request body for executing a single test set.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub release_id: Option<i32>,
    pub environment: Option<String>,
    /// Recorded as `executed_by`; defaults to "system".
    #[serde(default)]
    pub executed_by: Option<String>,
}

/// Queue state of a freshly requested run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Queued,
    Running,
}

/// Response after requesting a single test-set execution.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub test_run_id: i32,
    pub status: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

/// Persisted run record.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestRunResponse {
    pub id: i32,
    pub batch_id: Option<String>,
    pub release_id: i32,
    pub test_set_id: i32,
    pub test_set_name: String,
    pub status: RunStatus,
    pub environment: String,
    pub base_url: String,
    pub executed_by: String,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub total_scenarios: i32,
    pub total_steps: i32,
    pub passed_steps: i32,
    pub failed_steps: i32,
    pub failed_details: Vec<FailedDetail>,
    pub video_path: Option<String>,
}

impl From<test_run::Model> for TestRunResponse {
    fn from(run: test_run::Model) -> Self {
        let failed_details = FailedDetail::list_from_json(run.failed_details.as_ref());
        Self {
            id: run.id,
            batch_id: run.batch_id,
            release_id: run.release_id,
            test_set_id: run.test_set_id,
            test_set_name: run.test_set_name,
            status: RunStatus::parse(&run.status).unwrap_or(RunStatus::Failed),
            environment: run.environment,
            base_url: run.base_url,
            executed_by: run.executed_by,
            executed_at: run.executed_at,
            duration_ms: run.duration_ms,
            total_scenarios: run.total_scenarios,
            total_steps: run.total_steps,
            passed_steps: run.passed_steps,
            failed_steps: run.failed_steps,
            failed_details,
            video_path: run.video_path,
        }
    }
}

/// Persisted step result.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestRunStepResponse {
    pub id: i32,
    pub step_id: i32,
    pub scenario_name: String,
    pub case_name: String,
    pub description: String,
    pub status: StepStatus,
    pub duration_ms: i64,
    pub error_message: Option<String>,
}

impl From<test_run_step::Model> for TestRunStepResponse {
    fn from(step: test_run_step::Model) -> Self {
        Self {
            id: step.id,
            step_id: step.step_id,
            scenario_name: step.scenario_name,
            case_name: step.case_name,
            description: step.description,
            status: StepStatus::parse(&step.status),
            duration_ms: step.duration_ms,
            error_message: step.error_message,
        }
    }
}

/// Queue view of a run inside the status response.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusInfo {
    pub is_running: bool,
    /// 1-based position among pending runs, if pending.
    pub queue_position: Option<usize>,
}

/// Response for `GET /test-runs/{id}/status`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusResponse {
    #[serde(flatten)]
    pub run: TestRunResponse,
    pub steps: Vec<TestRunStepResponse>,
    pub queue_status: QueueStatusInfo,
    pub progress: Option<ProgressUpdate>,
}
