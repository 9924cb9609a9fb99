//! Report artifact models (media listing, PDF generation).

use serde::Serialize;
use utoipa::ToSchema;

/// Media available for a run.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaResponse {
    pub test_run_id: i32,
    /// Screenshot file names, sorted.
    pub screenshots: Vec<String>,
    pub has_video: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// PDF generation state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PdfState {
    None,
    Generating,
    Ready,
    Failed,
}

/// Response for PDF trigger and status endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PdfStatusResponse {
    pub test_run_id: i32,
    pub status: PdfState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
