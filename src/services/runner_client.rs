//! HTTP client for the browser-automation runner service.
//!
//! `POST {runner_url}/runs` starts a run and answers with an NDJSON stream:
//! `{"type":"progress",...}` lines carry live progress, one
//! `{"type":"result",...}` line carries the final outcome and
//! `{"type":"error","message":...}` reports an abort.
//! `POST {runner_url}/runs/{id}/pdf` renders the report PDF of a finished run.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::{ProgressUpdate, RunOutcome};

use super::artifacts::PdfRenderer;
use super::executor::{ExecutionRequest, ExecutorError, ProgressReporter, TestSetExecutor};

/// HTTP connect timeout for runner calls.
const RUNNER_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total timeout for PDF rendering.
const PDF_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Body of a run request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunnerRunRequest<'a> {
    test_run_id: i32,
    test_set_id: i32,
    release_id: i32,
    base_url: &'a str,
}

/// One line of the runner's NDJSON stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RunnerMessage {
    Progress(ProgressUpdate),
    Result(RunOutcome),
    Error {
        message: String,
        #[serde(default)]
        partial: Option<RunOutcome>,
    },
}

/// Splits a byte stream into complete lines.
#[derive(Default)]
struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Feed a chunk and return every line it completed.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }

    /// Trailing data without a final newline.
    fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Parse one stream line. Blank lines yield `None`.
fn parse_line(line: &str) -> Result<Option<RunnerMessage>, serde_json::Error> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Runner service client; implements both the executor and the PDF renderer.
#[derive(Clone)]
pub struct RunnerClient {
    http: reqwest::Client,
    base_url: String,
    run_timeout: Duration,
}

impl RunnerClient {
    pub fn new(base_url: &str, run_timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(RUNNER_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build runner client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            run_timeout,
        })
    }

    /// Apply one stream line. Returns the outcome once the result line arrives.
    fn handle_line(
        &self,
        line: &str,
        progress: &ProgressReporter,
    ) -> Result<Option<RunOutcome>, ExecutorError> {
        match parse_line(line) {
            Ok(Some(RunnerMessage::Progress(update))) => {
                progress.report(update);
                Ok(None)
            }
            Ok(Some(RunnerMessage::Result(outcome))) => Ok(Some(outcome)),
            Ok(Some(RunnerMessage::Error { message, partial })) => Err(ExecutorError::Aborted {
                reason: format!("Runner reported an error: {}", message),
                partial,
            }),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(
                    test_run_id = progress.test_run_id(),
                    error = %e,
                    "Skipping malformed runner line"
                );
                Ok(None)
            }
        }
    }

    async fn stream_run(
        &self,
        request: &ExecutionRequest,
        progress: &ProgressReporter,
    ) -> Result<RunOutcome, ExecutorError> {
        let url = format!("{}/runs", self.base_url);
        let body = RunnerRunRequest {
            test_run_id: request.test_run_id,
            test_set_id: request.test_set_id,
            release_id: request.release_id,
            base_url: &request.base_url,
        };

        let mut response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let mut decoder = LineDecoder::default();
        loop {
            let chunk = response.chunk().await.map_err(|e| ExecutorError::Aborted {
                reason: format!("Runner stream interrupted: {}", e),
                partial: None,
            })?;
            let Some(chunk) = chunk else {
                break;
            };
            for line in decoder.push(&chunk) {
                if let Some(outcome) = self.handle_line(&line, progress)? {
                    return Ok(outcome);
                }
            }
        }

        if let Some(line) = decoder.finish()
            && let Some(outcome) = self.handle_line(&line, progress)?
        {
            return Ok(outcome);
        }

        Err(ExecutorError::Aborted {
            reason: "Runner stream ended without a result".to_string(),
            partial: None,
        })
    }
}

#[async_trait]
impl TestSetExecutor for RunnerClient {
    async fn execute(
        &self,
        request: ExecutionRequest,
        progress: ProgressReporter,
    ) -> Result<RunOutcome, ExecutorError> {
        debug!(
            test_run_id = request.test_run_id,
            base_url = %request.base_url,
            "Dispatching run to runner"
        );

        match tokio::time::timeout(self.run_timeout, self.stream_run(&request, &progress)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Aborted {
                reason: format!("Run exceeded {}s timeout", self.run_timeout.as_secs()),
                partial: None,
            }),
        }
    }
}

#[async_trait]
impl PdfRenderer for RunnerClient {
    async fn render_pdf(&self, test_run_id: i32) -> Result<Vec<u8>, ExecutorError> {
        let url = format!("{}/runs/{}/pdf", self.base_url, test_run_id);

        let response = self
            .http
            .post(&url)
            .timeout(PDF_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::executor::ProgressStore;
    use actix_web::{App, HttpResponse, HttpServer, web};

    const RESULT_LINE: &str = r#"{"type":"result","durationMs":900,"totalScenarios":1,"totalSteps":2,"passedSteps":2,"failedSteps":0,"steps":[]}"#;

    /// Serve a canned NDJSON body on `/runs` and return the base URL.
    async fn runner_stub(body: &'static str) -> (String, actix_web::dev::ServerHandle) {
        let server = HttpServer::new(move || {
            App::new().route(
                "/runs",
                web::post().to(move || async move {
                    HttpResponse::Ok()
                        .content_type("application/x-ndjson")
                        .body(body)
                }),
            )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_rt::spawn(server);
        (format!("http://{}", addr), handle)
    }

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            test_run_id: 1,
            test_set_id: 2,
            release_id: 3,
            base_url: "https://staging.example.com".to_string(),
        }
    }

    #[test]
    fn test_decoder_joins_split_lines() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push(br#"{"type":"prog"#).is_empty());

        let lines = decoder.push(b"ress\"}\n\n{\"type\"");
        assert_eq!(lines, vec![r#"{"type":"progress"}"#.to_string(), String::new()]);

        assert_eq!(decoder.finish().as_deref(), Some(r#"{"type""#));
    }

    #[test]
    fn test_parse_messages() {
        let progress = parse_line(r#"{"type":"progress","completedSteps":3,"totalSteps":8}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(
            progress,
            RunnerMessage::Progress(ProgressUpdate { completed_steps: 3, total_steps: 8, .. })
        ));

        let result = parse_line(RESULT_LINE).unwrap().unwrap();
        assert!(matches!(result, RunnerMessage::Result(RunOutcome { total_steps: 2, .. })));

        let error = parse_line(r#"{"type":"error","message":"browser died"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(error, RunnerMessage::Error { partial: None, .. }));

        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("not json").is_err());
    }

    #[actix_rt::test]
    async fn test_execute_reads_progress_then_result() {
        let body = concat!(
            r#"{"type":"progress","completedSteps":1,"totalSteps":2,"passedSteps":1}"#,
            "\n",
            "garbage\n",
            r#"{"type":"result","durationMs":900,"totalScenarios":1,"totalSteps":2,"passedSteps":2,"failedSteps":0,"steps":[]}"#,
            "\n"
        );
        let (url, handle) = runner_stub(body).await;
        let client = RunnerClient::new(&url, Duration::from_secs(10)).unwrap();
        let store = ProgressStore::default();

        let outcome = client.execute(request(), store.reporter(1)).await.unwrap();
        assert_eq!(outcome.passed_steps, 2);
        assert_eq!(store.get(1).unwrap().completed_steps, 1);

        handle.stop(false).await;
    }

    #[actix_rt::test]
    async fn test_stream_without_result_is_aborted() {
        let body = concat!(
            r#"{"type":"progress","completedSteps":1,"totalSteps":5,"passedSteps":1}"#,
            "\n"
        );
        let (url, handle) = runner_stub(body).await;
        let client = RunnerClient::new(&format!("{}/", url), Duration::from_secs(10)).unwrap();
        let store = ProgressStore::default();

        let err = client.execute(request(), store.reporter(1)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Aborted { .. }));
        assert!(err.to_string().contains("without a result"));
        assert_eq!(store.get(1).unwrap().total_steps, 5);

        handle.stop(false).await;
    }

    #[actix_rt::test]
    async fn test_unreachable_runner_is_transport_error() {
        let client = RunnerClient::new("http://127.0.0.1:9", Duration::from_secs(5)).unwrap();
        let store = ProgressStore::default();

        let err = client.execute(request(), store.reporter(1)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Transport(_)));
    }
}
