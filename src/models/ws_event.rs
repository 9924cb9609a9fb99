//! WebSocket event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RunStatus;

/// WebSocket event sent to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum WsEvent {
    /// A single run was added to the execution queue.
    RunQueued(RunQueuedPayload),
    /// A run started executing (queue promotion or batch worker slot).
    RunStarted(RunPayload),
    /// A run reached a terminal status.
    RunCompleted(RunCompletedPayload),
    /// A batch was dispatched.
    BatchStarted(BatchStartedPayload),
    /// Every member of a batch reached a terminal status.
    BatchCompleted(BatchCompletedPayload),
}

/// Payload for run_queued event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunQueuedPayload {
    pub test_run_id: i32,
    /// 1-based queue position; None when promoted immediately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

/// Payload for run_started event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPayload {
    pub test_run_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

/// Payload for run_completed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCompletedPayload {
    pub test_run_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub status: RunStatus,
}

/// Payload for batch_started event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStartedPayload {
    pub batch_id: String,
    pub total: usize,
}

/// Payload for batch_completed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCompletedPayload {
    pub batch_id: String,
    pub status: RunStatus,
}

/// Wrapper that includes timestamp with every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEventMessage {
    #[serde(flatten)]
    pub event: WsEvent,
    pub timestamp: DateTime<Utc>,
}

impl WsEventMessage {
    /// Create a new event message with the current timestamp.
    pub fn new(event: WsEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}

impl WsEvent {
    pub fn run_queued(test_run_id: i32, position: Option<usize>) -> Self {
        WsEvent::RunQueued(RunQueuedPayload {
            test_run_id,
            position,
        })
    }

    pub fn run_started(test_run_id: i32, batch_id: Option<String>) -> Self {
        WsEvent::RunStarted(RunPayload {
            test_run_id,
            batch_id,
        })
    }

    pub fn run_completed(test_run_id: i32, batch_id: Option<String>, status: RunStatus) -> Self {
        WsEvent::RunCompleted(RunCompletedPayload {
            test_run_id,
            batch_id,
            status,
        })
    }

    pub fn batch_started(batch_id: String, total: usize) -> Self {
        WsEvent::BatchStarted(BatchStartedPayload { batch_id, total })
    }

    pub fn batch_completed(batch_id: String, status: RunStatus) -> Self {
        WsEvent::BatchCompleted(BatchCompletedPayload { batch_id, status })
    }
}
