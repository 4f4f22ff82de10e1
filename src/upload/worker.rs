use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;
use crate::api::{ApiFile, LmsApi, UploadTargetRequest};
use super::comments::CommentPlaceholders;
use super::errors::{Result, UploadError};
use super::manager::{ManagerCommand, ManagerOptions, UploadEvent};
use super::notifier::{Notification, Notifier};
use super::progress::TransferProgress;
use super::record::{FileRecord, FileRecordId, UploadContext};
use super::store::RecordStore;
use super::submitter::{BatchStatus, BatchSubmitter};
use super::transfer::{TransferRequest, TransferService};

const DANGLING_UPLOAD_ERROR: &str =
    "File upload failed. Please cancel your submission and try uploading again.";

enum WorkerEvent {
    TransferFinished {
        record_id: FileRecordId,
        result: Result<ApiFile>,
    },
}

struct TaskHandle {
    cancellation_token: CancellationToken,
    #[allow(dead_code)]
    join_handle: JoinHandle<()>,
}

/// 所有记录的归属者。命令和传输回调都在这个任务上顺序处理，
/// 所以 Ready -> Submitted 的判定不会出现并发竞争。
pub(crate) struct UploadWorker {
    api: Arc<dyn LmsApi>,
    transfer: Arc<dyn TransferService>,
    notifier: Arc<dyn Notifier>,
    submitter: BatchSubmitter,
    user_id: String,
    max_concurrent: usize,
    state_file: Option<PathBuf>,
    store: RecordStore,
    placeholders: CommentPlaceholders,
    comment_placeholders_by_batch: HashMap<String, String>,
    active: HashMap<FileRecordId, TaskHandle>,
    queued: Vec<FileRecordId>,
    event_tx: broadcast::Sender<UploadEvent>,
    worker_tx: mpsc::UnboundedSender<WorkerEvent>,
    progress_tx: mpsc::UnboundedSender<TransferProgress>,
}

impl UploadWorker {
    pub(crate) async fn run(
        api: Arc<dyn LmsApi>,
        transfer: Arc<dyn TransferService>,
        notifier: Arc<dyn Notifier>,
        options: ManagerOptions,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) {
        let (worker_tx, mut worker_rx) = mpsc::unbounded_channel();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

        // 恢复之前的状态
        let store = match &options.state_file {
            Some(path) => match RecordStore::restore(path).await {
                Ok(store) => store,
                Err(err) => {
                    warn!("Failed to restore upload state: {err}");
                    RecordStore::new()
                }
            },
            None => RecordStore::new(),
        };

        let mut worker = Self {
            submitter: BatchSubmitter::new(api.clone()),
            api,
            transfer,
            notifier,
            user_id: options.user_id,
            max_concurrent: options.max_concurrent,
            state_file: options.state_file,
            store,
            placeholders: CommentPlaceholders::new(),
            comment_placeholders_by_batch: HashMap::new(),
            active: HashMap::new(),
            queued: Vec::new(),
            event_tx,
            worker_tx,
            progress_tx,
        };

        // 主事件循环。进度消息每 64 KiB 一条，只改内存里的计数，
        // 不值得每条都重写状态文件。
        loop {
            let mutated = tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => worker.handle_command(command).await,
                        None => break
                    }
                }
                Some(event) = worker_rx.recv() => {
                    worker.handle_event(event).await;
                    true
                }
                Some(progress) = progress_rx.recv() => {
                    worker.handle_progress(progress);
                    false
                }
            };

            worker.process_queue();
            if mutated {
                worker.save_state().await;
            }
        }
    }

    /// Returns whether records may have changed, so queries do not
    /// trigger a state-file rewrite.
    async fn handle_command(&mut self, command: ManagerCommand) -> bool {
        match command {
            ManagerCommand::AddFile { path, batch_id, reply } => {
                let result = self.add_file(path, batch_id).await;
                let _ = reply.send(result);
                true
            }
            ManagerCommand::UploadBatch { batch_id, context, reply } => {
                let result = self.upload_batch(batch_id, context);
                let _ = reply.send(result);
                true
            }
            ManagerCommand::RetryBatch { batch_id, reply } => {
                let result = self.retry_batch(batch_id).await;
                let _ = reply.send(result);
                true
            }
            ManagerCommand::CancelFile { record_id, reply } => {
                let result = self.cancel_file(record_id);
                let _ = reply.send(result);
                true
            }
            ManagerCommand::CancelBatch { batch_id, reply } => {
                let result = self.cancel_batch(batch_id).await;
                let _ = reply.send(result);
                true
            }
            ManagerCommand::GetRecord { record_id, reply } => {
                let _ = reply.send(self.store.get(&record_id).cloned());
                false
            }
            ManagerCommand::GetBatch { batch_id, reply } => {
                let records = self.store.batch(&batch_id).into_iter().cloned().collect();
                let _ = reply.send(records);
                false
            }
            ManagerCommand::GetBatchStatus { batch_id, reply } => {
                let _ = reply.send(self.store.batch_status(&batch_id));
                false
            }
            ManagerCommand::ActiveUploads { reply } => {
                let _ = reply.send(self.active.len());
                false
            }
            ManagerCommand::CleanupDanglingFiles { batch_id, submitted_ids, reply } => {
                let result = self.cleanup_dangling_files(batch_id, submitted_ids).await;
                let _ = reply.send(result);
                true
            }
        }
    }

    async fn add_file(&mut self, path: PathBuf, batch_id: String) -> Result<FileRecordId> {
        // Verify file
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| UploadError::FileNotFound(path.clone()))?;
        if !metadata.is_file() {
            return Err(UploadError::Param("Not a file".to_string()));
        }
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| UploadError::Param("File name is not valid UTF-8".to_string()))?
            .to_string();

        let record = FileRecord::new(
            path,
            file_name,
            metadata.len(),
            batch_id.clone(),
            self.user_id.clone(),
        );
        let record_id = record.id;
        self.store.insert(record);

        let _ = self.event_tx.send(UploadEvent::FileQueued { record_id, batch_id });

        Ok(record_id)
    }

    fn upload_batch(&mut self, batch_id: String, context: UploadContext) -> Result<()> {
        let record_ids = self.store.batch_record_ids(&batch_id);
        if record_ids.is_empty() {
            return Err(UploadError::Param(format!("No files in batch {batch_id}")));
        }

        self.store.release_claim(&batch_id);

        // Comment uploads get an optimistic placeholder until the attach
        // call confirms.
        if matches!(context, UploadContext::SubmissionComment { .. })
            && !self.comment_placeholders_by_batch.contains_key(&batch_id)
        {
            let temp_id = self.placeholders.insert(None);
            self.comment_placeholders_by_batch.insert(batch_id.clone(), temp_id);
        }

        for record_id in record_ids {
            if self.active.contains_key(&record_id) {
                continue;
            }
            if let Some(record) = self.store.get_mut(&record_id) {
                record.context = Some(context.clone());
                record.reset_for_upload();
            }
            if !self.queued.contains(&record_id) {
                self.queued.push(record_id);
            }
        }

        Ok(())
    }

    async fn retry_batch(&mut self, batch_id: String) -> Result<()> {
        let record_ids = self.store.batch_record_ids(&batch_id);
        if record_ids.is_empty() {
            return Err(UploadError::Param(format!("No files in batch {batch_id}")));
        }

        let pending: Vec<FileRecordId> = record_ids
            .iter()
            .filter(|record_id| {
                self.store
                    .get(record_id)
                    .map(|record| !record.is_uploaded())
                    .unwrap_or(false)
            })
            .copied()
            .collect();

        if pending.is_empty() {
            // Files made it to the server; only the final call failed.
            self.store.release_claim(&batch_id);
            for record_id in &record_ids {
                if let Some(record) = self.store.get_mut(record_id) {
                    record.error = None;
                }
            }
            self.finalize_batch(&batch_id).await;
        } else {
            for record_id in pending {
                if self.active.contains_key(&record_id) {
                    continue;
                }
                if let Some(record) = self.store.get_mut(&record_id) {
                    record.reset_for_upload();
                }
                if !self.queued.contains(&record_id) {
                    self.queued.push(record_id);
                }
            }
        }

        Ok(())
    }

    fn cancel_file(&mut self, record_id: FileRecordId) -> Result<()> {
        self.queued.retain(|queued_id| *queued_id != record_id);
        if let Some(handle) = self.active.remove(&record_id) {
            handle.cancellation_token.cancel();
        }

        self.store
            .remove(&record_id)
            .ok_or_else(|| UploadError::Param("Record not found".to_string()))?;

        Ok(())
    }

    async fn cancel_batch(&mut self, batch_id: String) -> Result<()> {
        let record_ids = self.store.batch_record_ids(&batch_id);
        for record_id in &record_ids {
            self.queued.retain(|queued_id| queued_id != record_id);
            if let Some(handle) = self.active.remove(record_id) {
                handle.cancellation_token.cancel();
            }
        }

        let removed = self.store.remove_batch(&batch_id);
        for record in &removed {
            if let Err(err) = tokio::fs::remove_file(&record.local_path).await {
                debug!("Failed to remove local file {}: {err}", record.local_path.display());
            }
        }

        self.store.release_claim(&batch_id);
        if let Some(temp_id) = self.comment_placeholders_by_batch.remove(&batch_id) {
            self.placeholders.discard(&temp_id);
        }

        Ok(())
    }

    fn process_queue(&mut self) {
        while self.active.len() < self.max_concurrent && !self.queued.is_empty() {
            let record_id = self.queued.remove(0);
            self.start_upload(record_id);
        }
    }

    fn start_upload(&mut self, record_id: FileRecordId) {
        let Some(record) = self.store.get_mut(&record_id) else { return };
        let Some(context) = record.context.clone() else {
            record.error = Some("No upload context".to_string());
            return;
        };

        record.task_id = Some(Uuid::new_v4());
        record.started_at = Some(Utc::now());
        let record = record.clone();

        let cancellation_token = CancellationToken::new();
        let api = self.api.clone();
        let transfer = self.transfer.clone();
        let progress_tx = self.progress_tx.clone();
        let worker_tx = self.worker_tx.clone();
        let cancel = cancellation_token.clone();

        debug!(record_id = %record_id, file = %record.file_name, "Starting upload");
        let join_handle = tokio::spawn(async move {
            let result = run_pipeline(api, transfer, record, context, progress_tx, cancel).await;
            let _ = worker_tx.send(WorkerEvent::TransferFinished { record_id, result });
        });

        self.active.insert(record_id, TaskHandle { cancellation_token, join_handle });
    }

    fn handle_progress(&mut self, progress: TransferProgress) {
        if let Some(record) = self.store.get_mut(&progress.record_id) {
            record.bytes_sent = progress.bytes_sent;
            if progress.size > record.size {
                record.size = progress.size;
            }
            let _ = self.event_tx.send(UploadEvent::Progress {
                record_id: progress.record_id,
                bytes_sent: progress.bytes_sent,
                size: record.size,
            });
        }
    }

    async fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::TransferFinished { record_id, result } => {
                self.handle_transfer_finished(record_id, result).await;
            }
        }
    }

    async fn handle_transfer_finished(&mut self, record_id: FileRecordId, result: Result<ApiFile>) {
        self.active.remove(&record_id);

        // 记录可能在传输期间被取消删除
        let Some(record) = self.store.get_mut(&record_id) else { return };

        match result {
            Ok(api_file) => {
                record.remote_id = Some(api_file.id.clone());
                record.bytes_sent = record.size;
                record.task_id = None;
                record.error = None;
                record.completed_at = Some(Utc::now());
                let batch_id = record.batch_id.clone();
                let context = record.context.clone();
                let local_path = record.local_path.clone();

                let _ = self.event_tx.send(UploadEvent::FileUploaded {
                    record_id,
                    remote_id: api_file.id,
                });

                match context {
                    Some(UploadContext::Submission { .. })
                    | Some(UploadContext::SubmissionComment { .. }) => {
                        self.finalize_batch(&batch_id).await;
                    }
                    Some(UploadContext::Course { .. }) => {
                        // Generic uploads are done here; the local copy is
                        // no longer needed.
                        if let Err(err) = tokio::fs::remove_file(&local_path).await {
                            debug!("Failed to remove local file {}: {err}", local_path.display());
                        }
                    }
                    None => {}
                }
            }
            Err(err) => {
                let cancelled = matches!(err, UploadError::Cancelled);
                let error = err.to_string();
                record.error = Some(error.clone());
                record.task_id = None;
                let context = record.context.clone();

                warn!(record_id = %record_id, "Upload failed: {error}");
                let _ = self.event_tx.send(UploadEvent::FileFailed { record_id, error });

                if !cancelled {
                    match context {
                        Some(UploadContext::Submission { course_id, assignment_id, .. }) => {
                            self.notifier
                                .notify(Notification::submission_failed(&course_id, &assignment_id))
                                .await;
                        }
                        _ => {
                            self.notifier.notify(Notification::upload_failed()).await;
                        }
                    }
                }
            }
        }
    }

    /// Ready -> Submitted. The claim makes this first-wins: of all the
    /// completions that observe a ready batch, exactly one issues the
    /// final call.
    async fn finalize_batch(&mut self, batch_id: &str) {
        if !self.store.claim_submission(batch_id) {
            return;
        }

        let records: Vec<FileRecord> = self.store.batch(batch_id).into_iter().cloned().collect();
        let Some(context) = records.first().and_then(|record| record.context.clone()) else {
            self.store.release_claim(batch_id);
            return;
        };
        let file_ids = BatchSubmitter::file_ids(&records);

        match context {
            UploadContext::Submission { course_id, assignment_id, comment } => {
                match self.submitter.submit(&course_id, &assignment_id, file_ids, comment).await {
                    Ok(submission) => {
                        self.delete_batch_files(batch_id).await;
                        let _ = self.event_tx.send(UploadEvent::BatchSubmitted {
                            batch_id: batch_id.to_string(),
                            submission_id: submission.id,
                        });
                        self.notifier
                            .notify(Notification::submission_completed(&course_id, &assignment_id))
                            .await;
                    }
                    Err(err) => {
                        let error = err.to_string();
                        warn!(batch_id, "Submission failed: {error}");
                        self.store.release_claim(batch_id);
                        self.mark_batch_failed(batch_id, &error);
                        let _ = self.event_tx.send(UploadEvent::BatchFailed {
                            batch_id: batch_id.to_string(),
                            error,
                        });
                        self.notifier
                            .notify(Notification::submission_failed(&course_id, &assignment_id))
                            .await;
                    }
                }
            }
            UploadContext::SubmissionComment { course_id, assignment_id, user_id } => {
                match self
                    .submitter
                    .attach_comment(&course_id, &assignment_id, &user_id, file_ids)
                    .await
                {
                    Ok(submission) => {
                        self.delete_batch_files(batch_id).await;
                        let placeholder_id = self.comment_placeholders_by_batch.remove(batch_id);
                        if let Some(temp_id) = &placeholder_id {
                            self.placeholders.resolve(temp_id);
                        }
                        let comment_id = submission
                            .submission_comments
                            .as_ref()
                            .and_then(|comments| comments.last())
                            .map(|comment| comment.id.clone());
                        let _ = self.event_tx.send(UploadEvent::CommentAttached {
                            batch_id: batch_id.to_string(),
                            placeholder_id,
                            comment_id,
                        });
                    }
                    Err(err) => {
                        let error = err.to_string();
                        warn!(batch_id, "Comment attach failed: {error}");
                        self.store.release_claim(batch_id);
                        self.mark_batch_failed(batch_id, &error);
                        if let Some(temp_id) = self.comment_placeholders_by_batch.remove(batch_id) {
                            self.placeholders.discard(&temp_id);
                        }
                        let _ = self.event_tx.send(UploadEvent::BatchFailed {
                            batch_id: batch_id.to_string(),
                            error,
                        });
                        self.notifier.notify(Notification::upload_failed()).await;
                    }
                }
            }
            UploadContext::Course { .. } => {
                // nothing to finalize
                self.store.release_claim(batch_id);
            }
        }
    }

    async fn delete_batch_files(&mut self, batch_id: &str) {
        let removed = self.store.remove_batch(batch_id);
        for record in &removed {
            if let Err(err) = tokio::fs::remove_file(&record.local_path).await {
                debug!("Failed to remove local file {}: {err}", record.local_path.display());
            }
        }
    }

    fn mark_batch_failed(&mut self, batch_id: &str, error: &str) {
        for record_id in self.store.batch_record_ids(batch_id) {
            if let Some(record) = self.store.get_mut(&record_id) {
                record.error = Some(error.to_string());
            }
        }
    }

    /// Reconcile uploaded-but-unsubmitted leftovers against what the
    /// server reports for the assignment.
    async fn cleanup_dangling_files(
        &mut self,
        batch_id: String,
        submitted_ids: Vec<String>,
    ) -> Result<()> {
        if self.store.batch_status(&batch_id) == BatchStatus::Submitted {
            return Ok(());
        }

        let batch: Vec<FileRecord> = self.store.batch(&batch_id).into_iter().cloned().collect();
        if batch.iter().any(|record| self.active.contains_key(&record.id)) {
            return Ok(());
        }

        let uploaded: Vec<&FileRecord> = batch
            .iter()
            .filter(|record| record.is_uploaded() && record.error.is_none())
            .collect();
        if uploaded.is_empty() {
            return Ok(());
        }

        let local_ids: HashSet<&str> = uploaded
            .iter()
            .filter_map(|record| record.remote_id.as_deref())
            .collect();
        let server_ids: HashSet<&str> = submitted_ids.iter().map(String::as_str).collect();

        if local_ids == server_ids {
            // The submission went through before we were interrupted.
            for record in &uploaded {
                self.store.remove(&record.id);
                if let Err(err) = tokio::fs::remove_file(&record.local_path).await {
                    debug!("Failed to remove local file {}: {err}", record.local_path.display());
                }
            }
        } else {
            for record in &uploaded {
                if let Some(record) = self.store.get_mut(&record.id) {
                    record.remote_id = None;
                    record.task_id = None;
                    record.error = Some(DANGLING_UPLOAD_ERROR.to_string());
                }
            }
        }

        Ok(())
    }

    /// Best effort; storage errors are logged, not surfaced.
    async fn save_state(&self) {
        if let Some(path) = &self.state_file {
            if let Err(err) = self.store.save(path).await {
                warn!("Failed to save upload state: {err}");
            }
        }
    }
}

async fn run_pipeline(
    api: Arc<dyn LmsApi>,
    transfer: Arc<dyn TransferService>,
    record: FileRecord,
    context: UploadContext,
    progress_tx: mpsc::UnboundedSender<TransferProgress>,
    cancellation_token: CancellationToken,
) -> Result<ApiFile> {
    let mut body = UploadTargetRequest::new(record.file_name.clone(), record.size);
    if let UploadContext::Course { folder_path: Some(folder_path), .. } = &context {
        body = body.with_folder_path(folder_path.clone());
    }

    // The target is single-use and time-limited; an error here is
    // terminal for the attempt.
    let negotiation = api.request_upload_target(&context, &body);
    let target = tokio::select! {
        result = negotiation => result?,
        _ = cancellation_token.cancelled() => return Err(UploadError::Cancelled),
    };

    let request = TransferRequest {
        record_id: record.id,
        local_path: record.local_path.clone(),
        file_name: record.file_name.clone(),
        size: record.size,
        target,
    };

    transfer.transfer(request, progress_tx, cancellation_token).await
}
