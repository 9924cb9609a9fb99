//! Batch ("run all test sets") models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ProgressUpdate, RunStatus, TestRunResponse, batch_display_name};

/// Request body for running every test set of a release.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteAllRequest {
    pub release_id: Option<i32>,
    pub environment: Option<String>,
    #[serde(default)]
    pub executed_by: Option<String>,
}

/// Response after starting a batch.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteAllResponse {
    pub batch_id: String,
    pub test_run_ids: Vec<i32>,
    pub total_sets: usize,
}

/// A batch member handed to the orchestrator. The run row already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub test_run_id: i32,
    pub test_set_id: i32,
    pub test_set_name: String,
    pub release_id: i32,
    pub base_url: String,
}

/// In-memory lifecycle of one batch member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemberPhase {
    /// Waiting for a worker slot.
    Waiting,
    Running,
    Passed,
    Failed,
}

impl MemberPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    /// Store-level status of the member. Waiting members are `running` in the store.
    pub fn run_status(&self) -> RunStatus {
        match self {
            Self::Waiting | Self::Running => RunStatus::Running,
            Self::Passed => RunStatus::Passed,
            Self::Failed => RunStatus::Failed,
        }
    }
}

/// Live state of one batch member.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchMemberSnapshot {
    pub test_run_id: i32,
    pub test_set_id: i32,
    pub test_set_name: String,
    pub phase: MemberPhase,
    pub progress: Option<ProgressUpdate>,
}

/// In-memory progress snapshot of a tracked batch.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchSnapshot {
    pub batch_id: String,
    pub release_id: i32,
    pub executed_by: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub total: usize,
    pub waiting: usize,
    pub running: usize,
    pub passed: usize,
    pub failed: usize,
    pub members: Vec<BatchMemberSnapshot>,
}

impl BatchSnapshot {
    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Running
    }
}

/// Result of an in-memory batch lookup.
///
/// In-memory state is a cache: `FallbackToStore` tells the caller to use the
/// persisted aggregate instead (e.g. after a restart).
#[derive(Debug, Clone)]
pub enum BatchLookup {
    Found(BatchSnapshot),
    FallbackToStore,
}

impl BatchLookup {
    pub fn into_option(self) -> Option<BatchSnapshot> {
        match self {
            Self::Found(snapshot) => Some(snapshot),
            Self::FallbackToStore => None,
        }
    }
}

/// Persisted aggregate of all runs sharing one batch id.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchDetailsResponse {
    pub batch_id: String,
    pub name: String,
    pub release_id: i32,
    pub status: RunStatus,
    /// Earliest member's execution time.
    pub executed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub total_scenarios: i64,
    pub total_steps: i64,
    pub passed_steps: i64,
    pub failed_steps: i64,
    pub run_count: usize,
    pub runs: Vec<TestRunResponse>,
}

impl BatchDetailsResponse {
    /// Aggregate member rows: precedence for status, earliest timestamp, sums
    /// for counters. Independent of member order. Returns None for no members.
    pub fn from_runs(
        batch_id: String,
        release_number: &str,
        mut runs: Vec<TestRunResponse>,
    ) -> Option<Self> {
        let executed_at = runs.iter().map(|r| r.executed_at).min()?;
        let release_id = runs.first()?.release_id;
        let status = RunStatus::precedence(runs.iter().map(|r| r.status));

        let duration_ms = runs.iter().map(|r| r.duration_ms).sum();
        let total_scenarios = runs.iter().map(|r| r.total_scenarios as i64).sum();
        let total_steps = runs.iter().map(|r| r.total_steps as i64).sum();
        let passed_steps = runs.iter().map(|r| r.passed_steps as i64).sum();
        let failed_steps = runs.iter().map(|r| r.failed_steps as i64).sum();

        runs.sort_by_key(|r| r.id);

        Some(Self {
            name: batch_display_name(release_number, executed_at),
            batch_id,
            release_id,
            status,
            executed_at,
            duration_ms,
            total_scenarios,
            total_steps,
            passed_steps,
            failed_steps,
            run_count: runs.len(),
            runs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run(id: i32, status: RunStatus, minute: u32, passed: i32, failed: i32) -> TestRunResponse {
        TestRunResponse {
            id,
            batch_id: Some("batch-1".to_string()),
            release_id: 3,
            test_set_id: id * 100,
            test_set_name: format!("Set {}", id),
            status,
            environment: "staging".to_string(),
            base_url: "https://staging.example.com".to_string(),
            executed_by: "qa".to_string(),
            executed_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, minute, 0).unwrap(),
            duration_ms: 1000 * id as i64,
            total_scenarios: 2,
            total_steps: passed + failed,
            passed_steps: passed,
            failed_steps: failed,
            failed_details: Vec::new(),
            video_path: None,
        }
    }

    #[test]
    fn test_aggregate_independent_of_order() {
        let members = vec![
            run(1, RunStatus::Passed, 5, 4, 0),
            run(2, RunStatus::Failed, 2, 3, 2),
            run(3, RunStatus::Passed, 7, 6, 0),
        ];
        let mut reversed = members.clone();
        reversed.reverse();

        let a = BatchDetailsResponse::from_runs("batch-1".into(), "2.4", members).unwrap();
        let b = BatchDetailsResponse::from_runs("batch-1".into(), "2.4", reversed).unwrap();

        assert_eq!(a.status, RunStatus::Failed);
        assert_eq!(a.total_steps, 15);
        assert_eq!(a.passed_steps, 13);
        assert_eq!(a.failed_steps, 2);
        assert_eq!(a.duration_ms, 6000);
        assert_eq!(a.total_scenarios, 6);
        assert_eq!(a.executed_at, Utc.with_ymd_and_hms(2026, 3, 14, 9, 2, 0).unwrap());
        assert_eq!(a.name, "Release 2.4 - 2026-03-14 09:02");

        assert_eq!(a.status, b.status);
        assert_eq!(a.total_steps, b.total_steps);
        assert_eq!(a.executed_at, b.executed_at);
        assert_eq!(
            a.runs.iter().map(|r| r.id).collect::<Vec<_>>(),
            b.runs.iter().map(|r| r.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_running_member_dominates() {
        let members = vec![
            run(1, RunStatus::Failed, 1, 0, 1),
            run(2, RunStatus::Running, 1, 0, 0),
        ];
        let aggregate = BatchDetailsResponse::from_runs("b".into(), "1.0", members).unwrap();
        assert_eq!(aggregate.status, RunStatus::Running);
    }

    #[test]
    fn test_empty_batch_has_no_aggregate() {
        assert!(BatchDetailsResponse::from_runs("b".into(), "1.0", Vec::new()).is_none());
    }

    #[test]
    fn test_waiting_members_count_as_running() {
        assert_eq!(MemberPhase::Waiting.run_status(), RunStatus::Running);
        assert!(!MemberPhase::Waiting.is_terminal());
        assert!(MemberPhase::Failed.is_terminal());
    }
}
