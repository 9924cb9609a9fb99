//! Per-run report artifacts on disk and on-demand PDF generation.
//!
//! Layout under the artifacts root:
//! `runs/<id>/screenshots/*.png|jpg`, `runs/<id>/video.webm|mp4`,
//! `runs/<id>/report.pdf`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{MediaResponse, PdfState, PdfStatusResponse};

use super::executor::ExecutorError;

const SCREENSHOT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
const VIDEO_FILES: &[&str] = &["video.webm", "video.mp4"];
const PDF_FILE: &str = "report.pdf";

/// Reject anything that could escape the screenshot directory.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
}

/// Public URL of a run artifact.
pub fn artifact_url(test_run_id: i32, artifact: &str) -> String {
    format!("/api/v1/test-runs/{}/{}", test_run_id, artifact)
}

/// Read-only view of the artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn run_dir(&self, test_run_id: i32) -> PathBuf {
        self.root.join("runs").join(test_run_id.to_string())
    }

    pub fn pdf_path(&self, test_run_id: i32) -> PathBuf {
        self.run_dir(test_run_id).join(PDF_FILE)
    }

    /// Existing video file for a run, webm preferred.
    pub fn video_path(&self, test_run_id: i32) -> Option<PathBuf> {
        let dir = self.run_dir(test_run_id);
        VIDEO_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Path of a screenshot, validated against traversal.
    pub fn screenshot_path(&self, test_run_id: i32, file_name: &str) -> AppResult<PathBuf> {
        if !is_safe_file_name(file_name) {
            return Err(AppError::InvalidInput(format!(
                "Invalid screenshot name: {}",
                file_name
            )));
        }
        Ok(self.run_dir(test_run_id).join("screenshots").join(file_name))
    }

    /// Screenshot file names of a run, sorted. Missing directory means none.
    pub async fn list_screenshots(&self, test_run_id: i32) -> AppResult<Vec<String>> {
        let dir = self.run_dir(test_run_id).join("screenshots");
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "Failed to read {}: {}",
                    dir.display(),
                    e
                )));
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| SCREENSHOT_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
            if is_image && let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn media(&self, test_run_id: i32) -> AppResult<MediaResponse> {
        let screenshots = self.list_screenshots(test_run_id).await?;
        let has_video = self.video_path(test_run_id).is_some();

        Ok(MediaResponse {
            test_run_id,
            screenshots,
            has_video,
            video_url: has_video.then(|| artifact_url(test_run_id, "video")),
        })
    }

    /// Write the PDF atomically (temp file then rename).
    pub async fn write_pdf(&self, test_run_id: i32, bytes: &[u8]) -> AppResult<PathBuf> {
        let dir = self.run_dir(test_run_id);
        tokio::fs::create_dir_all(&dir).await?;

        let target = dir.join(PDF_FILE);
        let temp = dir.join(format!("{}.partial", PDF_FILE));
        tokio::fs::write(&temp, bytes).await?;
        tokio::fs::rename(&temp, &target).await?;
        Ok(target)
    }
}

/// Renders the report PDF of a finished run.
#[async_trait]
pub trait PdfRenderer: Send + Sync + 'static {
    async fn render_pdf(&self, test_run_id: i32) -> Result<Vec<u8>, ExecutorError>;
}

enum PdfJob {
    Generating,
    Failed(String),
}

/// Triggers PDF generation at most once per run and reports its state.
#[derive(Clone)]
pub struct PdfService {
    store: ArtifactStore,
    renderer: Arc<dyn PdfRenderer>,
    jobs: Arc<Mutex<HashMap<i32, PdfJob>>>,
}

impl PdfService {
    pub fn new(store: ArtifactStore, renderer: Arc<dyn PdfRenderer>) -> Self {
        Self {
            store,
            renderer,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i32, PdfJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn status(&self, test_run_id: i32) -> PdfStatusResponse {
        let (status, error) = if self.store.pdf_path(test_run_id).is_file() {
            (PdfState::Ready, None)
        } else {
            match self.lock().get(&test_run_id) {
                Some(PdfJob::Generating) => (PdfState::Generating, None),
                Some(PdfJob::Failed(error)) => (PdfState::Failed, Some(error.clone())),
                None => (PdfState::None, None),
            }
        };

        PdfStatusResponse {
            test_run_id,
            status,
            error,
            url: (status == PdfState::Ready).then(|| artifact_url(test_run_id, "pdf")),
        }
    }

    /// Start generation unless a PDF exists or is already being generated.
    /// A failed generation may be retried.
    pub fn trigger(&self, test_run_id: i32) -> PdfStatusResponse {
        if self.store.pdf_path(test_run_id).is_file() {
            return self.status(test_run_id);
        }

        {
            let mut jobs = self.lock();
            if matches!(jobs.get(&test_run_id), Some(PdfJob::Generating)) {
                drop(jobs);
                return self.status(test_run_id);
            }
            jobs.insert(test_run_id, PdfJob::Generating);
        }

        info!(test_run_id, "PDF generation started");
        let service = self.clone();
        tokio::spawn(async move { service.generate(test_run_id).await });

        self.status(test_run_id)
    }

    async fn generate(&self, test_run_id: i32) {
        let result = match self.renderer.render_pdf(test_run_id).await {
            Ok(bytes) => self
                .store
                .write_pdf(test_run_id, &bytes)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let mut jobs = self.lock();
        match result {
            Ok(path) => {
                info!(test_run_id, path = %path.display(), "PDF generated");
                jobs.remove(&test_run_id);
            }
            Err(error) => {
                warn!(test_run_id, %error, "PDF generation failed");
                jobs.insert(test_run_id, PdfJob::Failed(error));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::wait_until;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingRenderer {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PdfRenderer for CountingRenderer {
        async fn render_pdf(&self, _test_run_id: i32) -> Result<Vec<u8>, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.fail {
                Err(ExecutorError::Transport("renderer offline".into()))
            } else {
                Ok(b"%PDF-1.7".to_vec())
            }
        }
    }

    fn renderer(fail: bool) -> Arc<CountingRenderer> {
        Arc::new(CountingRenderer {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[test]
    fn test_safe_file_names() {
        assert!(is_safe_file_name("step-12.png"));
        assert!(!is_safe_file_name("../secrets.png"));
        assert!(!is_safe_file_name("a/b.png"));
        assert!(!is_safe_file_name("a\\b.png"));
        assert!(!is_safe_file_name(".hidden"));
        assert!(!is_safe_file_name(""));
    }

    #[tokio::test]
    async fn test_media_listing() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let shots = store.run_dir(9).join("screenshots");
        std::fs::create_dir_all(&shots).unwrap();
        std::fs::write(shots.join("b.png"), b"png").unwrap();
        std::fs::write(shots.join("a.JPG"), b"jpg").unwrap();
        std::fs::write(shots.join("notes.txt"), b"txt").unwrap();
        std::fs::write(store.run_dir(9).join("video.mp4"), b"mp4").unwrap();

        let media = store.media(9).await.unwrap();
        assert_eq!(media.screenshots, vec!["a.JPG", "b.png"]);
        assert!(media.has_video);
        assert_eq!(media.video_url.as_deref(), Some("/api/v1/test-runs/9/video"));

        let empty = store.media(10).await.unwrap();
        assert!(empty.screenshots.is_empty());
        assert!(!empty.has_video);
    }

    #[tokio::test]
    async fn test_pdf_triggered_once() {
        let dir = TempDir::new().unwrap();
        let counting = renderer(false);
        let service = PdfService::new(ArtifactStore::new(dir.path()), counting.clone());

        assert_eq!(service.status(4).status, PdfState::None);
        assert_eq!(service.trigger(4).status, PdfState::Generating);
        assert_eq!(service.trigger(4).status, PdfState::Generating);

        wait_until(|| service.status(4).status == PdfState::Ready).await;
        assert_eq!(service.trigger(4).status, PdfState::Ready);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read(service.store().pdf_path(4)).unwrap(),
            b"%PDF-1.7"
        );
    }

    #[tokio::test]
    async fn test_failed_pdf_can_be_retried() {
        let dir = TempDir::new().unwrap();
        let counting = renderer(true);
        let service = PdfService::new(ArtifactStore::new(dir.path()), counting.clone());

        service.trigger(5);
        wait_until(|| service.status(5).status == PdfState::Failed).await;
        assert!(service.status(5).error.unwrap().contains("renderer offline"));

        assert_eq!(service.trigger(5).status, PdfState::Generating);
        wait_until(|| counting.calls.load(Ordering::SeqCst) == 2).await;
    }
}
