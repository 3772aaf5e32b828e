use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::UploadConfig;
use crate::documents::{encode_data_uri, DocumentRef};

pub const PDF_MIME: &str = "application/pdf";
pub const GENERIC_UPLOAD_ERROR: &str = "Failed to upload document. Please try again.";
pub const UPLOAD_OK_MESSAGE: &str = "File uploaded successfully";

const CHUNK_SIZE: usize = 64 * 1024;

static PDF_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.pdf$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select a file")]
    Missing,
    #[error("Please upload a valid PDF file")]
    NotPdf,
    #[error("File size must be less than 10MB")]
    TooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Upload(String),
    #[error("Upload cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Validating,
    Uploading,
    Processing,
    Done,
    Error,
}

impl UploadStatus {
    pub fn label(self, percent: u8) -> String {
        match self {
            UploadStatus::Validating => "Validating file...".to_string(),
            UploadStatus::Uploading => format!("Uploading... {}%", percent),
            UploadStatus::Processing => "Processing upload...".to_string(),
            UploadStatus::Done => "File uploaded successfully!".to_string(),
            UploadStatus::Error => "Upload failed".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    Status(UploadStatus),
    Progress(u8),
    Finished(Result<DocumentRef, UploadError>),
}

#[derive(Debug, Clone)]
enum Content {
    Path(PathBuf),
    Memory(Arc<Vec<u8>>),
}

/// A file the user picked, described before its bytes are read.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub mime: Option<String>,
    pub size: u64,
    content: Content,
}

impl SelectedFile {
    /// Looks a file up on disk. A path that does not point at a readable
    /// regular file counts as no file at all.
    pub async fn inspect(path: &Path) -> Result<Self, ValidationError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| ValidationError::Missing)?;
        if !metadata.is_file() {
            return Err(ValidationError::Missing);
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or(ValidationError::Missing)?;
        let mime = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string());

        Ok(SelectedFile {
            name,
            mime,
            size: metadata.len(),
            content: Content::Path(path.to_path_buf()),
        })
    }

    pub fn from_bytes(name: impl Into<String>, mime: Option<&str>, bytes: Vec<u8>) -> Self {
        SelectedFile {
            name: name.into(),
            mime: mime.map(str::to_string),
            size: bytes.len() as u64,
            content: Content::Memory(Arc::new(bytes)),
        }
    }

    async fn read(&self) -> std::io::Result<Arc<Vec<u8>>> {
        match &self.content {
            Content::Path(path) => Ok(Arc::new(tokio::fs::read(path).await?)),
            Content::Memory(bytes) => Ok(bytes.clone()),
        }
    }
}

pub fn validate_file(file: Option<&SelectedFile>, max_size: u64) -> Result<(), ValidationError> {
    tracing::info!(
        target: "upload",
        file_name = file.map(|f| f.name.as_str()),
        file_size = file.map(|f| f.size),
        file_type = file.and_then(|f| f.mime.as_deref()),
        "validation"
    );

    let file = file.ok_or(ValidationError::Missing)?;
    match file.mime.as_deref() {
        Some(mime) if mime.contains(PDF_MIME) => {}
        _ => return Err(ValidationError::NotPdf),
    }
    if file.size > max_size {
        return Err(ValidationError::TooLarge);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadMetadata {
    pub twin_version_id: String,
    pub document_type: String,
}

impl UploadMetadata {
    pub fn generate(twin_version_id: &str) -> Self {
        let metadata = UploadMetadata {
            twin_version_id: twin_version_id.to_string(),
            document_type: "document".to_string(),
        };
        tracing::info!(target: "upload", metadata = ?metadata, "metadata generation");
        metadata
    }
}

/// `report.PDF` -> `report.json`
pub fn metadata_file_name(file_name: &str) -> String {
    format!("{}.json", PDF_SUFFIX.replace(file_name, ""))
}

/// Everything the upload endpoint needs for one file.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Arc<Vec<u8>>,
    pub metadata: UploadMetadata,
}

/// What the upload endpoint said on success.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadReceipt {
    /// 200 with no body; the endpoint accepts and forgets.
    Accepted { message: String },
    Body(Value),
}

/// Percent counter that only moves forward. Shared by the body stream and
/// the pipeline so the final 100 is never reported twice.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<UploadEvent>,
    last: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<UploadEvent>) -> Self {
        ProgressReporter {
            tx,
            last: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn report(&self, loaded: u64, total: u64) {
        let percent = percent_of(loaded, total);
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        if percent <= previous {
            return;
        }
        tracing::debug!(target: "upload", percent, "progress");
        let _ = self.tx.send(UploadEvent::Progress(percent));
        if percent == 100 {
            let _ = self.tx.send(UploadEvent::Status(UploadStatus::Processing));
        }
    }

    pub fn complete(&self) {
        self.report(1, 1);
    }
}

pub fn percent_of(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let loaded = loaded.min(total);
    ((loaded as f64 * 100.0) / total as f64).round() as u8
}

/// The network half of an upload.
pub trait UploadTransport {
    fn submit(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> impl Future<Output = Result<UploadReceipt, UploadError>> + Send;
}

/// Maps an upload endpoint reply onto success or a normalized failure.
///
/// A 200 with an empty or `null` body is success. This mirrors the ingest
/// backend seen so far and may not hold for other deployments.
pub fn interpret_upload_response(status: u16, body: &str) -> Result<UploadReceipt, UploadError> {
    tracing::info!(target: "upload", status, body, "server response");

    let trimmed = body.trim();
    let parsed: Option<Value> = serde_json::from_str(trimmed).ok();

    if status == 200 {
        return Ok(match parsed {
            None if trimmed.is_empty() => UploadReceipt::Accepted {
                message: UPLOAD_OK_MESSAGE.to_string(),
            },
            Some(Value::Null) => UploadReceipt::Accepted {
                message: UPLOAD_OK_MESSAGE.to_string(),
            },
            Some(value) => UploadReceipt::Body(value),
            None => UploadReceipt::Body(Value::String(trimmed.to_string())),
        });
    }

    if (200..300).contains(&status) {
        return Err(UploadError::Upload("Upload failed".to_string()));
    }

    let server_message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty());
    Err(UploadError::Upload(match server_message {
        Some(message) => message.to_string(),
        None => format!("Request failed with status code {}", status),
    }))
}

fn normalize_transport_error(message: String) -> UploadError {
    if message.trim().is_empty() {
        UploadError::Upload(GENERIC_UPLOAD_ERROR.to_string())
    } else {
        UploadError::Upload(message)
    }
}

#[derive(Clone)]
pub struct UploadClient {
    config: UploadConfig,
    client: reqwest::Client,
}

impl UploadClient {
    pub fn with_config(config: UploadConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    pub fn with_http_client(config: UploadConfig, client: reqwest::Client) -> Self {
        UploadClient { config, client }
    }

    fn build_form(
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Result<Form, reqwest::Error> {
        let total = request.bytes.len() as u64;
        let chunks: Vec<Vec<u8>> = request
            .bytes
            .chunks(CHUNK_SIZE)
            .map(|c| c.to_vec())
            .collect();

        let mut loaded = 0u64;
        let body = stream::iter(chunks).map(move |chunk| {
            loaded += chunk.len() as u64;
            progress.report(loaded, total);
            Ok::<_, std::io::Error>(chunk)
        });

        let pdf = Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(request.file_name.clone())
            .mime_str(PDF_MIME)?;

        let metadata_json =
            serde_json::to_vec_pretty(&request.metadata).unwrap_or_else(|_| b"{}".to_vec());
        let meta_name = metadata_file_name(&request.file_name);
        let meta = Part::bytes(metadata_json)
            .file_name(meta_name.clone())
            .mime_str("application/json")?;

        tracing::info!(
            target: "upload",
            file_name = %request.file_name,
            metadata_name = %meta_name,
            fields = ?["pdf", "meta_data"],
            "request preparation"
        );

        Ok(Form::new().part("pdf", pdf).part("meta_data", meta))
    }
}

impl UploadTransport for UploadClient {
    async fn submit(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Result<UploadReceipt, UploadError> {
        let form = Self::build_form(request, progress)
            .map_err(|e| normalize_transport_error(e.to_string()))?;

        let response = self
            .client
            .post(&self.config.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| normalize_transport_error(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| normalize_transport_error(e.to_string()))?;
        interpret_upload_response(status, &body)
    }
}

/// Validates, encodes and submits one file. Encoding for the local preview
/// and the network submission run side by side; only the submission decides
/// success.
pub async fn upload_document<T: UploadTransport>(
    transport: &T,
    file: Option<SelectedFile>,
    twin_version_id: &str,
    max_size: u64,
    progress: ProgressReporter,
) -> Result<DocumentRef, UploadError> {
    let _ = progress.tx.send(UploadEvent::Status(UploadStatus::Validating));
    validate_file(file.as_ref(), max_size)?;
    let Some(file) = file else {
        return Err(ValidationError::Missing.into());
    };
    tracing::info!(target: "upload", file_name = %file.name, "start");

    let bytes = file
        .read()
        .await
        .map_err(|e| normalize_transport_error(e.to_string()))?;

    let request = UploadRequest {
        file_name: file.name.clone(),
        bytes: bytes.clone(),
        metadata: UploadMetadata::generate(twin_version_id),
    };

    let mime = file.mime.clone().unwrap_or_else(|| PDF_MIME.to_string());
    let encode = tokio::task::spawn_blocking(move || encode_data_uri(&mime, &bytes));

    let _ = progress.tx.send(UploadEvent::Status(UploadStatus::Uploading));
    let (receipt, encoded) = tokio::join!(transport.submit(request, progress.clone()), encode);

    let receipt = receipt?;
    let data = encoded.map_err(|e| {
        tracing::error!(target: "upload", error = %e, "preview encoding failed");
        UploadError::Upload(GENERIC_UPLOAD_ERROR.to_string())
    })?;

    progress.complete();
    tracing::info!(target: "upload", file_name = %file.name, result = ?receipt, "complete");
    Ok(DocumentRef::new(file.name, data))
}

/// Runs [`upload_document`] and yields its progress followed by exactly one
/// `Finished` event. Cancelling the token ends the upload with
/// `UploadError::Cancelled`.
pub fn upload_events<T>(
    transport: T,
    file: Option<SelectedFile>,
    cancel: CancellationToken,
) -> impl Stream<Item = UploadEvent>
where
    T: UploadTransport + UploadSettings + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    let run = async move {
        let progress = ProgressReporter::new(tx.clone());
        let twin_version_id = transport.twin_version_id().to_string();
        let max_size = transport.max_file_size();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            result = upload_document(&transport, file, &twin_version_id, max_size, progress) => result,
        };

        match &outcome {
            Ok(doc) => {
                let _ = tx.send(UploadEvent::Status(UploadStatus::Done));
                tracing::info!(target: "upload", file_name = doc.name(), "finished");
            }
            Err(e) => {
                let _ = tx.send(UploadEvent::Status(UploadStatus::Error));
                tracing::warn!(target: "upload", error = %e, "error");
            }
        }
        let _ = tx.send(UploadEvent::Finished(outcome));
    };

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    });
    let driver = stream::once(run).filter_map(|_| async { None::<UploadEvent> });

    stream::select(driver, events)
}

/// Upload limits and identifiers a transport carries with it.
pub trait UploadSettings {
    fn twin_version_id(&self) -> &str;
    fn max_file_size(&self) -> u64;
}

impl UploadSettings for UploadClient {
    fn twin_version_id(&self) -> &str {
        &self.config.twin_version_id
    }

    fn max_file_size(&self) -> u64 {
        self.config.max_file_size
    }
}
