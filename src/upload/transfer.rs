use std::path::PathBuf;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use crate::api::{ApiFile, FileUploadTarget};
use super::errors::{Result, UploadError};
use super::progress::{ProgressStream, TransferProgress};
use super::record::FileRecordId;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// One negotiated byte transfer.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub record_id: FileRecordId,
    pub local_path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub target: FileUploadTarget,
}

/// Abstract transfer capability: start a transfer, watch progress on the
/// channel, cancel through the token. Platform-specific executors (an OS
/// background-transfer session, a test double) implement this; the batch
/// and record logic above stays agnostic.
#[async_trait]
pub trait TransferService: Send + Sync {
    async fn transfer(
        &self,
        request: TransferRequest,
        progress_tx: mpsc::UnboundedSender<TransferProgress>,
        cancellation_token: CancellationToken,
    ) -> Result<ApiFile>;
}

/// 默认实现：multipart 表单 POST 到协商好的地址
#[derive(Debug, Clone, Default)]
pub struct HttpTransferService {
    client: Client,
}

impl HttpTransferService {
    pub fn new() -> Self {
        Self::default()
    }

    async fn execute(
        &self,
        request: &TransferRequest,
        progress_tx: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<ApiFile> {
        let file = File::open(&request.local_path)
            .await
            .map_err(|_| UploadError::FileNotFound(request.local_path.clone()))?;

        let file_stream = ReaderStream::with_capacity(file, READ_BUFFER_SIZE);
        let body = Body::wrap_stream(ProgressStream::new(
            file_stream,
            request.record_id,
            request.size,
            progress_tx,
        ));

        // The target's form params go first, then the file part.
        let mut form = Form::new();
        for (key, value) in &request.target.upload_params {
            form = form.text(key.clone(), value.clone());
        }

        let file_name = request
            .target
            .upload_params
            .get("filename")
            .or_else(|| request.target.upload_params.get("Filename"))
            .cloned()
            .unwrap_or_else(|| request.file_name.clone());
        let content_type = request
            .target
            .upload_params
            .get("content_type")
            .cloned()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let part = Part::stream_with_length(body, request.size)
            .file_name(file_name)
            .mime_str(&content_type)?;
        form = form.part("file", part);

        let response = self
            .client
            .post(&request.target.upload_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::server_error(status.as_u16(), "File upload rejected"));
        }

        Ok(response.json::<ApiFile>().await?)
    }
}

#[async_trait]
impl TransferService for HttpTransferService {
    async fn transfer(
        &self,
        request: TransferRequest,
        progress_tx: mpsc::UnboundedSender<TransferProgress>,
        cancellation_token: CancellationToken,
    ) -> Result<ApiFile> {
        let future = self.execute(&request, progress_tx);

        tokio::select! {
            result = future => result,
            _ = cancellation_token.cancelled() => Err(UploadError::Cancelled),
        }
    }
}
