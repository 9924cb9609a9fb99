//! Single-run execution, run status, queue status and the combined listing.

use actix_web::{HttpResponse, get, post, web};
use tracing::info;

use crate::db::DbPool;
use crate::db::test_runs::NewTestRun;
use crate::error::{AppError, AppResult, ErrorResponse};
use crate::models::{
    ApiResponse, DEFAULT_EXECUTED_BY, ExecuteRequest, ExecuteResponse, ExecutionState, QueueItem,
    QueueSnapshot, QueueStatusInfo, RunListQuery, RunListResponse, RunStatusResponse,
    TestRunStepResponse,
};
use crate::services::{Enqueued, ExecutionQueue};

/// Release, environment name and resolved base URL of an execution request.
pub(crate) struct ExecutionTarget {
    pub release_id: i32,
    pub release_number: String,
    pub environment: String,
    pub base_url: String,
}

/// Validate the shared `{releaseId, environment}` fields and resolve the
/// environment's base URL for the release.
pub(crate) async fn resolve_target(
    pool: &DbPool,
    release_id: Option<i32>,
    environment: Option<&str>,
) -> AppResult<ExecutionTarget> {
    let release_id =
        release_id.ok_or_else(|| AppError::InvalidInput("releaseId is required".to_string()))?;
    let environment = environment
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::InvalidInput("environment is required".to_string()))?;

    let release = pool
        .get_release(release_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Release {}", release_id)))?;

    let base_url = pool
        .resolve_environment_url(release_id, environment)
        .await?
        .ok_or_else(|| {
            AppError::Configuration(format!(
                "No base URL configured for environment '{}' (release {}). \
                 Set it in the environment settings before running tests.",
                environment, release.release_number
            ))
        })?;

    Ok(ExecutionTarget {
        release_id,
        release_number: release.release_number,
        environment: environment.to_string(),
        base_url,
    })
}

pub(crate) fn executed_by(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_EXECUTED_BY)
        .to_string()
}

/// Queue one test set for execution.
#[utoipa::path(
    post,
    path = "/api/v1/test-runs/execute/{test_set_id}",
    tag = "Test Runs",
    params(("test_set_id" = i32, Path, description = "Test set to execute")),
    request_body = ExecuteRequest,
    responses(
        (status = 200, description = "Run created and queued", body = ExecuteResponse),
        (status = 400, description = "Missing fields or environment not configured", body = ErrorResponse),
        (status = 404, description = "Release or test set not found", body = ErrorResponse)
    )
)]
#[post("/test-runs/execute/{test_set_id}")]
pub async fn execute_test_set(
    pool: web::Data<DbPool>,
    queue: web::Data<ExecutionQueue>,
    path: web::Path<i32>,
    body: web::Json<ExecuteRequest>,
) -> AppResult<HttpResponse> {
    let test_set_id = path.into_inner();
    let request = body.into_inner();

    let target = resolve_target(&pool, request.release_id, request.environment.as_deref()).await?;
    let test_set = pool
        .get_test_set_for_release(target.release_id, test_set_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Test set {} in release {}",
                test_set_id, target.release_number
            ))
        })?;

    let run = pool
        .insert_test_run(NewTestRun {
            release_id: target.release_id,
            test_set_id,
            test_set_name: test_set.name,
            environment: target.environment,
            base_url: target.base_url.clone(),
            executed_by: executed_by(request.executed_by.as_deref()),
        })
        .await?;

    info!(test_run_id = run.id, test_set_id, "Test run created");

    let enqueued = queue.enqueue(QueueItem {
        test_run_id: run.id,
        test_set_id,
        release_id: target.release_id,
        base_url: target.base_url,
    });

    let response = match enqueued {
        Enqueued::Running => ExecuteResponse {
            test_run_id: run.id,
            status: ExecutionState::Running,
            queue_position: None,
        },
        Enqueued::Pending(position) => ExecuteResponse {
            test_run_id: run.id,
            status: ExecutionState::Queued,
            queue_position: Some(position),
        },
    };

    Ok(HttpResponse::Ok().json(ApiResponse::ok(response)))
}

/// Current execution queue.
#[utoipa::path(
    get,
    path = "/api/v1/test-runs/queue/status",
    tag = "Test Runs",
    responses(
        (status = 200, description = "Pending items in FIFO order and the running item", body = QueueSnapshot)
    )
)]
#[get("/test-runs/queue/status")]
pub async fn get_queue_status(queue: web::Data<ExecutionQueue>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(queue.get_status()))
}

/// Run record with steps, queue state and live progress.
#[utoipa::path(
    get,
    path = "/api/v1/test-runs/{id}/status",
    tag = "Test Runs",
    params(("id" = i32, Path, description = "Test run ID")),
    responses(
        (status = 200, description = "Run status", body = RunStatusResponse),
        (status = 404, description = "Test run not found", body = ErrorResponse)
    )
)]
#[get("/test-runs/{id}/status")]
pub async fn get_run_status(
    pool: web::Data<DbPool>,
    queue: web::Data<ExecutionQueue>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    let run = pool
        .get_test_run(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Test run {}", id)))?;
    let steps = pool
        .get_test_run_steps(id)
        .await?
        .into_iter()
        .map(TestRunStepResponse::from)
        .collect();

    let response = RunStatusResponse {
        run: run.into(),
        steps,
        queue_status: QueueStatusInfo {
            is_running: queue.is_running(id),
            queue_position: queue.position_of(id),
        },
        progress: queue.get_progress(id),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::ok(response)))
}

/// Standalone runs and batches in one paginated listing, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/test-runs",
    tag = "Test Runs",
    params(
        ("status" = Option<String>, Query, description = "running, passed or failed"),
        ("releaseId" = Option<i32>, Query, description = "Filter by release"),
        ("fromDate" = Option<String>, Query, description = "Executed at or after (ISO 8601)"),
        ("toDate" = Option<String>, Query, description = "Executed at or before (ISO 8601)"),
        ("search" = Option<String>, Query, description = "Match on test-set name or release number"),
        ("limit" = Option<u64>, Query, description = "Results per page (default 20, max 100)"),
        ("offset" = Option<u64>, Query, description = "Pagination offset")
    ),
    responses(
        (status = 200, description = "Page of runs and batches", body = RunListResponse)
    )
)]
#[get("/test-runs")]
pub async fn list_test_runs(
    pool: web::Data<DbPool>,
    query: web::Query<RunListQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    let (items, total) = pool.list_runs(&query).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(RunListResponse {
        items,
        total,
        limit: query.clamped_limit(),
        offset: query.offset,
    })))
}

/// Configure test run routes. The queue route is registered before
/// `/{id}/status` so "queue" is never parsed as a run id.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_queue_status)
        .service(execute_test_set)
        .service(get_run_status)
        .service(list_test_runs);
}
