use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::api::{ApiClient, LmsApi};
use crate::config::Config;
use super::errors::{Result, UploadError};
use super::notifier::{Notifier, TracingNotifier};
use super::record::{FileRecord, FileRecordId, UploadContext};
use super::submitter::BatchStatus;
use super::transfer::{HttpTransferService, TransferService};
use super::worker::UploadWorker;

/// 上传事件，广播给订阅者
#[derive(Debug, Clone)]
pub enum UploadEvent {
    FileQueued {
        record_id: FileRecordId,
        batch_id: String,
    },
    Progress {
        record_id: FileRecordId,
        bytes_sent: u64,
        size: u64,
    },
    FileUploaded {
        record_id: FileRecordId,
        remote_id: String,
    },
    FileFailed {
        record_id: FileRecordId,
        error: String,
    },
    BatchSubmitted {
        batch_id: String,
        submission_id: String,
    },
    CommentAttached {
        batch_id: String,
        placeholder_id: Option<String>,
        comment_id: Option<String>,
    },
    BatchFailed {
        batch_id: String,
        error: String,
    },
}

/// 管理器命令
pub(crate) enum ManagerCommand {
    AddFile {
        path: PathBuf,
        batch_id: String,
        reply: oneshot::Sender<Result<FileRecordId>>,
    },
    UploadBatch {
        batch_id: String,
        context: UploadContext,
        reply: oneshot::Sender<Result<()>>,
    },
    RetryBatch {
        batch_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    CancelFile {
        record_id: FileRecordId,
        reply: oneshot::Sender<Result<()>>,
    },
    CancelBatch {
        batch_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    GetRecord {
        record_id: FileRecordId,
        reply: oneshot::Sender<Option<FileRecord>>,
    },
    GetBatch {
        batch_id: String,
        reply: oneshot::Sender<Vec<FileRecord>>,
    },
    GetBatchStatus {
        batch_id: String,
        reply: oneshot::Sender<BatchStatus>,
    },
    ActiveUploads {
        reply: oneshot::Sender<usize>,
    },
    CleanupDanglingFiles {
        batch_id: String,
        submitted_ids: Vec<String>,
        reply: oneshot::Sender<Result<()>>,
    },
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Owning user of every record this manager creates
    pub user_id: String,
    /// 最大并发上传数
    pub max_concurrent: usize,
    /// Records survive restarts when set
    pub state_file: Option<PathBuf>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            user_id: "self".to_string(),
            max_concurrent: 3,
            state_file: None,
        }
    }
}

/// Front of the upload pipeline. Commands hop onto the worker task which
/// owns all records, so every mutation is serialized.
#[derive(Clone)]
pub struct UploadManager {
    command_tx: mpsc::Sender<ManagerCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
}

/// 管理器句柄 - 包含管理器和工作任务
pub struct UploadManagerHandle {
    pub manager: UploadManager,
    pub worker_handle: JoinHandle<()>,
}

impl UploadManagerHandle {
    pub async fn shutdown(self) -> Result<()> {
        drop(self.manager);
        self.worker_handle
            .await
            .map_err(|err| UploadError::internal(format!("Worker panic: {err}")))
    }
}

impl UploadManager {
    pub fn new(
        api: Arc<dyn LmsApi>,
        transfer: Arc<dyn TransferService>,
        notifier: Arc<dyn Notifier>,
        options: ManagerOptions,
    ) -> UploadManagerHandle {
        let (command_tx, command_rx) = mpsc::channel(100);
        // 最大缓存 256 个事件
        let (event_tx, _) = broadcast::channel(256);

        let worker_handle = tokio::spawn(UploadWorker::run(
            api,
            transfer,
            notifier,
            options,
            command_rx,
            event_tx.clone(),
        ));

        let manager = Self { command_tx, event_tx };

        UploadManagerHandle {
            manager,
            worker_handle,
        }
    }

    /// Wire up the default HTTP stack from a config.
    pub fn with_config(config: &Config) -> UploadManagerHandle {
        let api = Arc::new(ApiClient::new(&config.base_url, &config.access_token));
        let options = ManagerOptions {
            user_id: config.user_id.clone(),
            max_concurrent: config.max_concurrent,
            state_file: config.state_file.clone(),
        };

        Self::new(
            api,
            Arc::new(HttpTransferService::new()),
            Arc::new(TracingNotifier),
            options,
        )
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    async fn send<T>(
        &self,
        command: ManagerCommand,
        reply_rx: oneshot::Receiver<T>,
    ) -> Result<T> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| UploadError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| UploadError::ManagerShutdown)
    }

    /// Register a local file under a batch. Upload starts separately.
    pub async fn add_file(&self, path: PathBuf, batch_id: impl Into<String>) -> Result<FileRecordId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(
            ManagerCommand::AddFile {
                path,
                batch_id: batch_id.into(),
                reply: reply_tx,
            },
            reply_rx,
        )
        .await?
    }

    /// Upload every record of a batch to the given destination.
    pub async fn upload_batch(&self, batch_id: impl Into<String>, context: UploadContext) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(
            ManagerCommand::UploadBatch {
                batch_id: batch_id.into(),
                context,
                reply: reply_tx,
            },
            reply_rx,
        )
        .await?
    }

    /// Re-upload the non-completed records of a batch, or resubmit when
    /// the files made it but the submission call did not.
    pub async fn retry_batch(&self, batch_id: impl Into<String>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(
            ManagerCommand::RetryBatch {
                batch_id: batch_id.into(),
                reply: reply_tx,
            },
            reply_rx,
        )
        .await?
    }

    /// Cancel a single file: abort its transfer and delete its record.
    pub async fn cancel_file(&self, record_id: FileRecordId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ManagerCommand::CancelFile { record_id, reply: reply_tx }, reply_rx)
            .await?
    }

    /// Cancel a whole batch: abort transfers, delete records and the
    /// local files backing them.
    pub async fn cancel_batch(&self, batch_id: impl Into<String>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(
            ManagerCommand::CancelBatch {
                batch_id: batch_id.into(),
                reply: reply_tx,
            },
            reply_rx,
        )
        .await?
    }

    pub async fn record(&self, record_id: FileRecordId) -> Result<Option<FileRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ManagerCommand::GetRecord { record_id, reply: reply_tx }, reply_rx)
            .await
    }

    pub async fn batch(&self, batch_id: impl Into<String>) -> Result<Vec<FileRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(
            ManagerCommand::GetBatch {
                batch_id: batch_id.into(),
                reply: reply_tx,
            },
            reply_rx,
        )
        .await
    }

    pub async fn batch_status(&self, batch_id: impl Into<String>) -> Result<BatchStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(
            ManagerCommand::GetBatchStatus {
                batch_id: batch_id.into(),
                reply: reply_tx,
            },
            reply_rx,
        )
        .await
    }

    /// Whether any transfer is currently running.
    pub async fn is_uploading(&self) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let active = self
            .send(ManagerCommand::ActiveUploads { reply: reply_tx }, reply_rx)
            .await?;

        Ok(active > 0)
    }

    /// Reconcile records left behind by an interrupted submission: when
    /// the server already lists exactly our uploaded file ids, the local
    /// leftovers are deleted; otherwise they are reset with an error so
    /// the user can retry.
    pub async fn cleanup_dangling_files(
        &self,
        batch_id: impl Into<String>,
        submitted_ids: Vec<String>,
    ) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(
            ManagerCommand::CleanupDanglingFiles {
                batch_id: batch_id.into(),
                submitted_ids,
                reply: reply_tx,
            },
            reply_rx,
        )
        .await?
    }
}
