//! Domain models for the test orchestrator.

use serde::Serialize;
use utoipa::ToSchema;

pub mod artifacts;
pub mod batch;
pub mod listing;
pub mod queue;
pub mod run;
pub mod ws_event;

// Re-export commonly used types
pub use artifacts::{MediaResponse, PdfState, PdfStatusResponse};
pub use batch::{
    BatchDetailsResponse, BatchItem, BatchLookup, BatchMemberSnapshot, BatchSnapshot,
    ExecuteAllRequest, ExecuteAllResponse, MemberPhase,
};
pub use listing::{
    RunListItem, RunListKind, RunListQuery, RunListResponse, batch_display_name,
};
pub use queue::{ProgressUpdate, QueueItem, QueueSnapshot};
pub use run::{
    ExecuteRequest, ExecuteResponse, ExecutionState, FailedDetail, QueueStatusInfo,
    RunCompletion, RunOutcome, RunStatus, RunStatusResponse, StepResult, StepStatus,
    TestRunResponse, TestRunStepResponse,
};
pub use ws_event::{WsEvent, WsEventMessage};

/// Success envelope: `{"success": true, "data": ...}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Name recorded as `executed_by` when the caller does not supply one.
pub const DEFAULT_EXECUTED_BY: &str = "system";
