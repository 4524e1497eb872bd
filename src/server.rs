//! Minimal HTTP trigger for ingestion runs

use crate::config::PipelineOptions;
use crate::db::report::run_age_report;
use crate::db::store::RecordStore;
use crate::ingestion::pipeline::ingest_file;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Everything a request handler needs. Built once at startup.
pub struct AppState {
    pub csv_path: PathBuf,
    pub options: PipelineOptions,
    pub store: Arc<dyn RecordStore>,
    // Two uploads never write at the same time
    run_lock: Mutex<()>,
}

impl AppState {
    pub fn new(csv_path: PathBuf, options: PipelineOptions, store: Arc<dyn RecordStore>) -> Self {
        Self {
            csv_path,
            options,
            store,
            run_lock: Mutex::new(()),
        }
    }
}

/// Work to do once the response bytes are on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterResponse {
    AgeReport,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub status_text: &'static str,
    pub body: String,
    pub after: Option<AfterResponse>,
}

impl Response {
    pub fn json(status: u16, status_text: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text,
            body: body.into(),
            after: None,
        }
    }

    pub fn to_http(&self) -> String {
        create_response(self.status, self.status_text, &self.body)
    }
}

/// Accept connections until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = accepted?;
                debug!("New connection from: {}", addr);
                tokio::spawn(handle_connection(stream, state.clone()));
            }
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    use tokio::time::{timeout, Duration};

    // Read request with timeout to prevent hanging
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    if request_complete(&buffer) {
                        break;
                    }
                    if buffer.len() > 1_000_000 {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read from stream: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    })
    .await;

    if !matches!(read_result, Ok(Ok(()))) {
        warn!("Request read failed or timed out");
        return;
    }
    if buffer.is_empty() {
        return;
    }

    let request = String::from_utf8_lossy(&buffer);
    let response = handle_request(&state, &request).await;
    if let Err(e) = stream.write_all(response.to_http().as_bytes()).await {
        error!("Failed to write response: {}", e);
        return;
    }
    let _ = stream.shutdown().await;

    if let Some(AfterResponse::AgeReport) = response.after {
        tokio::spawn(run_age_report(state.store.clone()));
    }
}

/// Headers are in and the body (if any) has fully arrived
fn request_complete(buffer: &[u8]) -> bool {
    let Ok(s) = std::str::from_utf8(buffer) else {
        return false;
    };
    let Some(headers_end) = s.find("\r\n\r\n").map(|i| i + 4) else {
        return false;
    };
    match extract_content_length(s) {
        Some(content_length) => buffer.len() >= headers_end + content_length,
        None => true,
    }
}

fn extract_content_length(request: &str) -> Option<usize> {
    for line in request.lines() {
        if line.to_lowercase().starts_with("content-length:") {
            if let Some(value) = line.split(':').nth(1) {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

pub async fn handle_request(state: &AppState, request: &str) -> Response {
    let Some(request_line) = request.lines().next() else {
        return Response::json(400, "Bad Request", "{}");
    };

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Response::json(400, "Bad Request", "{}");
    }

    let method = parts[0];
    let path_str = parts[1].split('?').next().unwrap_or("/");

    // Normalize path (remove trailing slash except for root)
    let mut path = path_str.trim_end_matches('/');
    if path.is_empty() {
        path = "/";
    }

    debug!("Request: {} {}", method, path);

    match (method, path) {
        ("OPTIONS", _) => Response::json(204, "No Content", ""),
        ("GET", "/api/health") => Response::json(200, "OK", r#"{"status":"ok","service":"csv-ingest"}"#),
        ("POST", "/api/upload") | ("GET", "/api/upload") => handle_upload(state).await,
        _ => Response::json(404, "Not Found", r#"{"error":"Not found"}"#),
    }
}

async fn handle_upload(state: &AppState) -> Response {
    let _guard = state.run_lock.lock().await;

    match ingest_file(&state.csv_path, state.store.clone(), state.options.clone()).await {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                records = report.records_produced,
                failed_batches = report.failed_batches.len(),
                "Upload run completed"
            );
            let body = serde_json::json!({
                "message": "CSV data uploaded successfully",
                "run_id": report.run_id,
            });
            Response {
                after: Some(AfterResponse::AgeReport),
                ..Response::json(200, "OK", body.to_string())
            }
        }
        Err(e) => {
            let body = serde_json::json!({ "error": e.to_string() });
            Response::json(500, "Internal Server Error", body.to_string())
        }
    }
}

pub fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}
