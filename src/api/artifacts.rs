//! Report artifact endpoints: media listing, screenshots, video and PDF.

use actix_files::NamedFile;
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use tracing::info;

use crate::db::DbPool;
use crate::error::{AppError, AppResult, ErrorResponse};
use crate::models::{ApiResponse, MediaResponse, PdfStatusResponse, RunStatus};
use crate::services::PdfService;

async fn require_run_status(pool: &DbPool, id: i32) -> AppResult<RunStatus> {
    let run = pool
        .get_test_run(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Test run {}", id)))?;
    Ok(RunStatus::parse(&run.status).unwrap_or(RunStatus::Failed))
}

/// Screenshots and video available for a run.
#[utoipa::path(
    get,
    path = "/api/v1/test-runs/{id}/media",
    tag = "Artifacts",
    params(("id" = i32, Path, description = "Test run ID")),
    responses(
        (status = 200, description = "Media listing", body = MediaResponse),
        (status = 404, description = "Test run not found", body = ErrorResponse)
    )
)]
#[get("/test-runs/{id}/media")]
pub async fn get_media(
    pool: web::Data<DbPool>,
    pdf: web::Data<PdfService>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    require_run_status(&pool, id).await?;

    let media = pdf.store().media(id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(media)))
}

/// One screenshot image.
#[utoipa::path(
    get,
    path = "/api/v1/test-runs/{id}/screenshot/{filename}",
    tag = "Artifacts",
    params(
        ("id" = i32, Path, description = "Test run ID"),
        ("filename" = String, Path, description = "Screenshot file name")
    ),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 400, description = "Invalid file name", body = ErrorResponse),
        (status = 404, description = "Screenshot not found", body = ErrorResponse)
    )
)]
#[get("/test-runs/{id}/screenshot/{filename}")]
pub async fn get_screenshot(
    req: HttpRequest,
    pdf: web::Data<PdfService>,
    path: web::Path<(i32, String)>,
) -> AppResult<HttpResponse> {
    let (id, filename) = path.into_inner();

    let file_path = pdf.store().screenshot_path(id, &filename)?;
    if !file_path.is_file() {
        return Err(AppError::NotFound(format!("Screenshot {}", filename)));
    }

    let file = NamedFile::open_async(&file_path).await?;
    Ok(file.into_response(&req))
}

/// Run video. Range requests are honoured so players can seek.
#[utoipa::path(
    get,
    path = "/api/v1/test-runs/{id}/video",
    tag = "Artifacts",
    params(("id" = i32, Path, description = "Test run ID")),
    responses(
        (status = 200, description = "Video bytes"),
        (status = 206, description = "Partial content"),
        (status = 404, description = "No video for this run", body = ErrorResponse)
    )
)]
#[get("/test-runs/{id}/video")]
pub async fn get_video(
    req: HttpRequest,
    pdf: web::Data<PdfService>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    let video = pdf
        .store()
        .video_path(id)
        .ok_or_else(|| AppError::NotFound(format!("Video for test run {}", id)))?;

    let file = NamedFile::open_async(&video).await?;
    Ok(file.into_response(&req))
}

/// Trigger PDF generation. Idempotent while generating or once ready.
#[utoipa::path(
    post,
    path = "/api/v1/test-runs/{id}/pdf",
    tag = "Artifacts",
    params(("id" = i32, Path, description = "Test run ID")),
    responses(
        (status = 202, description = "Generation state", body = PdfStatusResponse),
        (status = 400, description = "Run has not finished", body = ErrorResponse),
        (status = 404, description = "Test run not found", body = ErrorResponse)
    )
)]
#[post("/test-runs/{id}/pdf")]
pub async fn trigger_pdf(
    pool: web::Data<DbPool>,
    pdf: web::Data<PdfService>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    let status = require_run_status(&pool, id).await?;
    if !status.is_terminal() {
        return Err(AppError::InvalidInput(format!(
            "Test run {} is still running",
            id
        )));
    }

    info!(test_run_id = id, "PDF requested");
    Ok(HttpResponse::Accepted().json(ApiResponse::ok(pdf.trigger(id))))
}

/// Download the generated PDF.
#[utoipa::path(
    get,
    path = "/api/v1/test-runs/{id}/pdf",
    tag = "Artifacts",
    params(("id" = i32, Path, description = "Test run ID")),
    responses(
        (status = 200, description = "PDF bytes", content_type = "application/pdf"),
        (status = 404, description = "PDF not generated", body = ErrorResponse)
    )
)]
#[get("/test-runs/{id}/pdf")]
pub async fn get_pdf(
    req: HttpRequest,
    pdf: web::Data<PdfService>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    let pdf_path = pdf.store().pdf_path(id);
    if !pdf_path.is_file() {
        return Err(AppError::NotFound(format!("PDF for test run {}", id)));
    }

    let file = NamedFile::open_async(&pdf_path).await?;
    Ok(file.into_response(&req))
}

/// PDF generation state.
#[utoipa::path(
    get,
    path = "/api/v1/test-runs/{id}/pdf/status",
    tag = "Artifacts",
    params(("id" = i32, Path, description = "Test run ID")),
    responses(
        (status = 200, description = "Generation state", body = PdfStatusResponse)
    )
)]
#[get("/test-runs/{id}/pdf/status")]
pub async fn get_pdf_status(pdf: web::Data<PdfService>, path: web::Path<i32>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(pdf.status(path.into_inner())))
}

/// Configure artifact routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_media)
        .service(get_screenshot)
        .service(get_video)
        .service(trigger_pdf)
        .service(get_pdf_status)
        .service(get_pdf);
}
