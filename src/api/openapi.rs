//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Test Plan Orchestrator",
        version = "0.1.0",
        description = "Queues and runs release test sets against configured environments, \
                       tracks batches and serves run artifacts"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Test run endpoints
        api::test_runs::execute_test_set,
        api::test_runs::get_queue_status,
        api::test_runs::get_run_status,
        api::test_runs::list_test_runs,
        // Batch endpoints
        api::batches::execute_all,
        api::batches::get_batch_status,
        api::batches::get_active_batches,
        api::batches::get_batch_details,
        // Artifact endpoints
        api::artifacts::get_media,
        api::artifacts::get_screenshot,
        api::artifacts::get_video,
        api::artifacts::trigger_pdf,
        api::artifacts::get_pdf,
        api::artifacts::get_pdf_status,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Runs
            models::RunStatus,
            models::StepStatus,
            models::FailedDetail,
            models::StepResult,
            models::RunOutcome,
            models::ExecuteRequest,
            models::ExecutionState,
            models::ExecuteResponse,
            models::TestRunResponse,
            models::TestRunStepResponse,
            models::QueueStatusInfo,
            models::RunStatusResponse,
            // Queue
            models::QueueItem,
            models::QueueSnapshot,
            models::ProgressUpdate,
            // Listing
            models::RunListKind,
            models::RunListItem,
            models::RunListResponse,
            // Batches
            models::ExecuteAllRequest,
            models::ExecuteAllResponse,
            models::MemberPhase,
            models::BatchMemberSnapshot,
            models::BatchSnapshot,
            models::BatchDetailsResponse,
            // Artifacts
            models::MediaResponse,
            models::PdfState,
            models::PdfStatusResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Test Runs", description = "Single-run execution, queue and listing"),
        (name = "Batches", description = "Run every test set of a release in parallel"),
        (name = "Artifacts", description = "Screenshots, video and PDF reports")
    )
)]
pub struct ApiDoc;
