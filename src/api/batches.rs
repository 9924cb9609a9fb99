//! Batch ("run all test sets") endpoints.

use actix_web::{HttpResponse, get, post, web};
use tracing::info;

use crate::db::DbPool;
use crate::db::test_runs::NewTestRun;
use crate::error::{AppError, AppResult, ErrorResponse};
use crate::models::{
    ApiResponse, BatchDetailsResponse, BatchItem, BatchSnapshot, ExecuteAllRequest,
    ExecuteAllResponse, TestRunResponse,
};
use crate::services::{BatchOrchestrator, generate_batch_id};

use super::test_runs::{executed_by, resolve_target};

/// Run every test set of a release as one batch.
#[utoipa::path(
    post,
    path = "/api/v1/test-runs/execute-all",
    tag = "Batches",
    request_body = ExecuteAllRequest,
    responses(
        (status = 200, description = "Batch created and dispatched", body = ExecuteAllResponse),
        (status = 400, description = "Missing fields, no test sets, or environment not configured", body = ErrorResponse),
        (status = 404, description = "Release not found", body = ErrorResponse)
    )
)]
#[post("/test-runs/execute-all")]
pub async fn execute_all(
    pool: web::Data<DbPool>,
    orchestrator: web::Data<BatchOrchestrator>,
    body: web::Json<ExecuteAllRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let target = resolve_target(&pool, request.release_id, request.environment.as_deref()).await?;

    let test_sets = pool.list_test_sets(target.release_id).await?;
    if test_sets.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "Release {} has no test sets to run",
            target.release_number
        )));
    }

    let executed_by = executed_by(request.executed_by.as_deref());
    let batch_id = generate_batch_id();
    let new_runs = test_sets
        .into_iter()
        .map(|set| NewTestRun {
            release_id: target.release_id,
            test_set_id: set.id,
            test_set_name: set.name,
            environment: target.environment.clone(),
            base_url: target.base_url.clone(),
            executed_by: executed_by.clone(),
        })
        .collect();

    let runs = pool.insert_batch_runs(&batch_id, new_runs).await?;
    let items: Vec<BatchItem> = runs
        .into_iter()
        .map(|run| BatchItem {
            test_run_id: run.id,
            test_set_id: run.test_set_id,
            test_set_name: run.test_set_name,
            release_id: run.release_id,
            base_url: run.base_url,
        })
        .collect();
    let total_sets = items.len();

    info!(batch_id = %batch_id, total_sets, "Batch runs created");
    let test_run_ids = orchestrator.start_batch(&batch_id, items, &executed_by);

    Ok(HttpResponse::Ok().json(ApiResponse::ok(ExecuteAllResponse {
        batch_id,
        test_run_ids,
        total_sets,
    })))
}

/// Live in-memory snapshot of a batch; `data` is null when the batch is not
/// tracked (finished long ago or the process restarted).
#[utoipa::path(
    get,
    path = "/api/v1/test-runs/batch/{batch_id}/status",
    tag = "Batches",
    params(("batch_id" = String, Path, description = "Batch identifier")),
    responses(
        (status = 200, description = "Batch snapshot; data is null when untracked", body = BatchSnapshot)
    )
)]
#[get("/test-runs/batch/{batch_id}/status")]
pub async fn get_batch_status(
    orchestrator: web::Data<BatchOrchestrator>,
    path: web::Path<String>,
) -> HttpResponse {
    let snapshot = orchestrator.get_batch_status(&path.into_inner()).into_option();
    HttpResponse::Ok().json(ApiResponse::ok(snapshot))
}

/// Batches with members still running.
#[utoipa::path(
    get,
    path = "/api/v1/test-runs/batches/active",
    tag = "Batches",
    responses(
        (status = 200, description = "In-flight batches", body = Vec<BatchSnapshot>)
    )
)]
#[get("/test-runs/batches/active")]
pub async fn get_active_batches(orchestrator: web::Data<BatchOrchestrator>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(orchestrator.get_active_batches()))
}

/// Persisted aggregate of a batch, available after restarts.
#[utoipa::path(
    get,
    path = "/api/v1/test-runs/batch/{batch_id}/details",
    tag = "Batches",
    params(("batch_id" = String, Path, description = "Batch identifier")),
    responses(
        (status = 200, description = "Batch aggregate with member runs", body = BatchDetailsResponse),
        (status = 404, description = "Batch not found", body = ErrorResponse)
    )
)]
#[get("/test-runs/batch/{batch_id}/details")]
pub async fn get_batch_details(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let batch_id = path.into_inner();

    let runs = pool.get_batch_runs(&batch_id).await?;
    let Some(first) = runs.first() else {
        return Err(AppError::NotFound(format!("Batch {}", batch_id)));
    };
    let release_number = pool
        .get_release(first.release_id)
        .await?
        .map(|release| release.release_number)
        .unwrap_or_default();

    let runs = runs.into_iter().map(TestRunResponse::from).collect();
    let details = BatchDetailsResponse::from_runs(batch_id.clone(), &release_number, runs)
        .ok_or_else(|| AppError::NotFound(format!("Batch {}", batch_id)))?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(details)))
}

/// Configure batch routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(execute_all)
        .service(get_active_batches)
        .service(get_batch_status)
        .service(get_batch_details);
}
