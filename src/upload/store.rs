use std::collections::{HashMap, HashSet};
use std::path::Path;
use super::errors::Result;
use super::record::{FileRecord, FileRecordId};
use super::submitter::BatchStatus;

/// 所有文件记录的唯一存储，只在 worker 任务内被修改
#[derive(Default)]
pub struct RecordStore {
    records: HashMap<FileRecordId, FileRecord>,
    /// Batches whose Ready -> Submitted transition has been claimed.
    /// The claim is what makes the transition first-wins when several
    /// members complete back to back.
    submitted_batches: HashSet<String>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: FileRecord) {
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: &FileRecordId) -> Option<&FileRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &FileRecordId) -> Option<&mut FileRecord> {
        self.records.get_mut(id)
    }

    pub fn remove(&mut self, id: &FileRecordId) -> Option<FileRecord> {
        self.records.remove(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Records sharing a batch id, in creation order.
    pub fn batch(&self, batch_id: &str) -> Vec<&FileRecord> {
        let mut records: Vec<&FileRecord> = self
            .records
            .values()
            .filter(|record| record.batch_id == batch_id)
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        records
    }

    pub fn batch_record_ids(&self, batch_id: &str) -> Vec<FileRecordId> {
        self.batch(batch_id).into_iter().map(|record| record.id).collect()
    }

    pub fn batch_status(&self, batch_id: &str) -> BatchStatus {
        if self.submitted_batches.contains(batch_id) {
            return BatchStatus::Submitted;
        }

        BatchStatus::of(&self.batch(batch_id))
    }

    /// Claim the Ready -> Submitted transition for a batch. Returns false
    /// when the batch is not ready or another completion already claimed
    /// it, so exactly one caller wins.
    pub fn claim_submission(&mut self, batch_id: &str) -> bool {
        if self.batch_status(batch_id) != BatchStatus::Ready {
            return false;
        }

        self.submitted_batches.insert(batch_id.to_string())
    }

    /// Give the claim back after a failed submission call so a manual
    /// retry can resubmit.
    pub fn release_claim(&mut self, batch_id: &str) {
        self.submitted_batches.remove(batch_id);
    }

    pub fn remove_batch(&mut self, batch_id: &str) -> Vec<FileRecord> {
        let ids = self.batch_record_ids(batch_id);
        ids.into_iter()
            .filter_map(|id| self.records.remove(&id))
            .collect()
    }

    /// Save records so they survive app restarts.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let mut records: Vec<&FileRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));

        let data = serde_json::to_string_pretty(&records)?;
        tokio::fs::write(path, data).await?;

        Ok(())
    }

    /// Restore records from a previous run. In-flight transfer ids do not
    /// survive the process, so they are cleared; retry is manual.
    pub async fn restore(path: &Path) -> Result<Self> {
        let mut store = Self::new();
        if !path.exists() {
            return Ok(store);
        }

        let data = tokio::fs::read_to_string(path).await?;
        let records: Vec<FileRecord> = serde_json::from_str(&data)?;
        for mut record in records {
            record.task_id = None;
            store.insert(record);
        }

        Ok(store)
    }
}
