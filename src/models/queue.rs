//! Execution queue models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single-run execution request waiting in (or promoted from) the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub test_run_id: i32,
    pub test_set_id: i32,
    pub release_id: i32,
    pub base_url: String,
}

/// Point-in-time view of the execution queue.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Pending items in FIFO order.
    pub pending: Vec<QueueItem>,
    pub running_item: Option<QueueItem>,
}

impl QueueSnapshot {
    /// 1-based position of a pending run, or None if it is not pending.
    pub fn position_of(&self, test_run_id: i32) -> Option<usize> {
        self.pending
            .iter()
            .position(|item| item.test_run_id == test_run_id)
            .map(|index| index + 1)
    }

    pub fn is_running(&self, test_run_id: i32) -> bool {
        self.running_item
            .as_ref()
            .is_some_and(|item| item.test_run_id == test_run_id)
    }
}

/// Latest partial status reported by an in-flight executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    #[serde(default)]
    pub current_scenario: Option<String>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub completed_steps: i32,
    #[serde(default)]
    pub total_steps: i32,
    #[serde(default)]
    pub total_scenarios: i32,
    #[serde(default)]
    pub passed_steps: i32,
    #[serde(default)]
    pub failed_steps: i32,
    #[serde(default)]
    pub message: Option<String>,
    /// Set when the update is recorded.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressUpdate {
    /// Completion percentage, 0 when the total is unknown.
    pub fn percent(&self) -> u8 {
        if self.total_steps <= 0 {
            return 0;
        }
        let ratio = self.completed_steps.clamp(0, self.total_steps) as f64 / self.total_steps as f64;
        (ratio * 100.0).round() as u8
    }
}
