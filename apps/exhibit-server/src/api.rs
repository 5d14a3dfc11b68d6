//! API handlers for the exhibit server
//!
//! Provides:
//! - The upload form
//! - Batch processing of uploaded PDFs
//! - One-shot downloads of the stamped results

use std::path::Path;
use std::time::Duration;

use axum::{
    extract::{Multipart, Path as UrlPath, State},
    http::header,
    response::{Html, IntoResponse, Response},
    Json,
};
use exhibit_core::{default_order, discard, process_batch_in, OrderRow, ProcessMetrics, UploadedFile};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ServerError;
use crate::state::AppState;

const INDEX_HTML: &str = include_str!("index.html");

/// Handler: GET /
pub async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "exhibit-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Process response
#[derive(Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub downloads: Vec<DownloadInfo>,
    pub count: usize,
}

/// One stamped PDF ready to download
#[derive(Serialize)]
pub struct DownloadInfo {
    pub id: String,
    pub exhibit: u32,
    pub filename: String,
    pub source_name: String,
    pub url: String,
    pub metrics: ProcessMetrics,
}

/// Parsed multipart form
#[derive(Debug, Default)]
pub struct BatchForm {
    pub files: Vec<UploadedFile>,
    pub order: Vec<i64>,
    pub start: Option<u32>,
}

impl BatchForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut form = BatchForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ServerError::InvalidRequest(format!("Malformed upload: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let filename = field
                        .file_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("upload_{}.pdf", form.files.len() + 1));
                    let bytes = field.bytes().await.map_err(|e| {
                        ServerError::InvalidRequest(format!("Could not read {}: {}", filename, e))
                    })?;
                    form.files.push(UploadedFile::new(filename, bytes.to_vec()));
                }
                "order" => {
                    let text = field_text(field).await?;
                    let position = text.trim().parse().map_err(|_| {
                        ServerError::InvalidRequest(format!("Invalid order value '{}'", text))
                    })?;
                    form.order.push(position);
                }
                "start" => {
                    let text = field_text(field).await?;
                    let start = text.trim().parse().map_err(|_| {
                        ServerError::InvalidRequest(format!(
                            "Invalid starting exhibit number '{}'",
                            text
                        ))
                    })?;
                    form.start = Some(start);
                }
                other => debug!("Ignoring form field '{}'", other),
            }
        }

        Ok(form)
    }

    /// Order table rows; upload order when the form carried none
    pub fn rows(&self) -> Result<Vec<OrderRow>, ServerError> {
        if self.order.is_empty() {
            return Ok(default_order(&self.files));
        }
        if self.order.len() != self.files.len() {
            return Err(ServerError::InvalidRequest(format!(
                "Got {} order values for {} files",
                self.order.len(),
                self.files.len()
            )));
        }
        Ok(self
            .files
            .iter()
            .zip(&self.order)
            .map(|(file, position)| OrderRow {
                filename: file.filename.clone(),
                position: *position,
            })
            .collect())
    }
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ServerError> {
    field
        .text()
        .await
        .map_err(|e| ServerError::InvalidRequest(format!("Malformed form field: {}", e)))
}

/// Handler: POST /api/process
pub async fn handle_process(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, ServerError> {
    let form = BatchForm::from_multipart(multipart).await?;
    if form.files.is_empty() {
        return Err(ServerError::InvalidRequest("No PDF files uploaded".into()));
    }
    let start = form.start.unwrap_or(1);
    if start < 1 {
        return Err(ServerError::InvalidRequest(
            "Starting exhibit number must be at least 1".into(),
        ));
    }
    let rows = form.rows()?;

    info!(
        "Process request: {} files, starting exhibit {}",
        form.files.len(),
        start
    );

    let batch_id = Uuid::new_v4();
    let batch_dir = state.scratch_dir().join(batch_id.to_string());
    tokio::fs::create_dir_all(&batch_dir)
        .await
        .map_err(|e| ServerError::Internal(format!("Could not create scratch dir: {}", e)))?;

    let ctx = state.stamp.clone();
    let files = form.files;
    let dir = batch_dir.clone();
    let job = tokio::task::spawn_blocking(move || {
        process_batch_in(&files, &rows, start, ctx.in_dir(&dir))
    });

    let outcome = match tokio::time::timeout(Duration::from_millis(state.timeout_ms), job).await {
        Err(_) => Err(ServerError::Timeout(state.timeout_ms)),
        Ok(Err(join)) => Err(ServerError::Internal(format!("Batch task failed: {}", join))),
        Ok(Ok(result)) => result.map_err(ServerError::from),
    };

    let processed = match outcome {
        Ok(processed) => processed,
        Err(e) => {
            warn!("Batch {} failed: {}", batch_id, e);
            remove_batch_dir(&batch_dir).await;
            return Err(e);
        }
    };

    let mut downloads = Vec::with_capacity(processed.len());
    for done in &processed {
        let id = match state.downloads.register(done, &batch_dir) {
            Ok(id) => id,
            Err(e) => {
                discard(&processed);
                remove_batch_dir(&batch_dir).await;
                return Err(e);
            }
        };
        downloads.push(DownloadInfo {
            id: id.to_string(),
            exhibit: done.exhibit,
            filename: done.download_name.clone(),
            source_name: done.source_name.clone(),
            url: format!("/api/download/{}", id),
            metrics: done.metrics.clone(),
        });
    }

    let count = downloads.len();
    info!("Batch {} ready: {} downloads", batch_id, count);

    Ok(Json(ProcessResponse {
        success: true,
        downloads,
        count,
    }))
}

/// Handler: GET /api/download/:id
///
/// Serves the stamped PDF once and deletes it.
pub async fn handle_download(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Response, ServerError> {
    let key = Uuid::parse_str(&id).map_err(|_| ServerError::NotFound(id.clone()))?;
    let download = state
        .downloads
        .take(&key)?
        .ok_or_else(|| ServerError::NotFound(id.clone()))?;

    let read = tokio::fs::read(&download.path).await;
    if let Err(e) = tokio::fs::remove_file(&download.path).await {
        warn!("Could not remove {}: {}", download.path.display(), e);
    }
    // Sibling downloads may still be in flight; only an empty batch dir goes
    remove_drained_batch_dir(&download.batch_dir).await;

    let data = read.map_err(|e| {
        ServerError::Internal(format!("Could not read exhibit {}: {}", download.exhibit, e))
    })?;

    info!(
        "Served {} ({} bytes), {} downloads pending",
        download.filename,
        data.len(),
        state.downloads.len()?
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.filename),
            ),
        ],
        data,
    )
        .into_response())
}

async fn remove_batch_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed scratch dir {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove scratch dir {}: {}", dir.display(), e),
    }
}

async fn remove_drained_batch_dir(dir: &Path) {
    match tokio::fs::remove_dir(dir).await {
        Ok(()) => debug!("Removed scratch dir {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("Keeping scratch dir {}: {}", dir.display(), e),
    }
}
