use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::api::{ApiSubmission, CommentParams, CreateSubmissionBody, LmsApi, PutCommentBody};
use super::errors::Result;
use super::record::FileRecord;

/// 批次状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum BatchStatus {
    /// At least one member still lacks a remote id and has no error
    Pending,
    /// Every member record has a remote id
    Ready,
    /// At least one member has an error; retry is manual
    Failed,
    /// The create-submission call has returned success
    Submitted,
}

impl BatchStatus {
    /// Derive the status of a set of records sharing a batch id.
    /// The Submitted state is tracked separately by the store's claim.
    pub fn of(records: &[&FileRecord]) -> Self {
        if records.is_empty() {
            return BatchStatus::Pending;
        }
        if records.iter().any(|record| record.error.is_some()) {
            return BatchStatus::Failed;
        }
        if records.iter().all(|record| record.is_uploaded()) {
            return BatchStatus::Ready;
        }

        BatchStatus::Pending
    }
}

/// Issues the final API call once every record in a batch is uploaded.
pub struct BatchSubmitter {
    api: Arc<dyn LmsApi>,
}

impl BatchSubmitter {
    pub fn new(api: Arc<dyn LmsApi>) -> Self {
        Self { api }
    }

    /// Collect the remote ids of a ready batch, in record creation order.
    pub fn file_ids(records: &[FileRecord]) -> Vec<String> {
        let mut ordered: Vec<&FileRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        ordered
            .into_iter()
            .filter_map(|record| record.remote_id.clone())
            .collect()
    }

    pub async fn submit(
        &self,
        course_id: &str,
        assignment_id: &str,
        file_ids: Vec<String>,
        comment: Option<String>,
    ) -> Result<ApiSubmission> {
        let body = CreateSubmissionBody::file_upload(file_ids, comment);
        self.api.create_submission(course_id, assignment_id, &body).await
    }

    pub async fn attach_comment(
        &self,
        course_id: &str,
        assignment_id: &str,
        user_id: &str,
        file_ids: Vec<String>,
    ) -> Result<ApiSubmission> {
        let body = PutCommentBody {
            comment: CommentParams::files(file_ids),
        };
        self.api
            .put_submission_comment(course_id, assignment_id, user_id, &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(batch_id: &str) -> FileRecord {
        FileRecord::new(PathBuf::from("/tmp/a"), "a", 10, batch_id, "u1")
    }

    #[test]
    fn test_empty_batch_is_pending() {
        assert_eq!(BatchStatus::of(&[]), BatchStatus::Pending);
    }

    #[test]
    fn test_ready_requires_every_remote_id_and_no_error() {
        let mut a = record("b1");
        let mut b = record("b1");

        assert_eq!(BatchStatus::of(&[&a, &b]), BatchStatus::Pending);

        a.remote_id = Some("55".to_string());
        assert_eq!(BatchStatus::of(&[&a, &b]), BatchStatus::Pending);

        b.remote_id = Some("56".to_string());
        assert_eq!(BatchStatus::of(&[&a, &b]), BatchStatus::Ready);

        b.error = Some("denied".to_string());
        assert_eq!(BatchStatus::of(&[&a, &b]), BatchStatus::Failed);
    }

    #[test]
    fn test_file_ids_follow_creation_order() {
        let mut a = record("b1");
        a.remote_id = Some("55".to_string());
        let mut b = record("b1");
        b.remote_id = Some("56".to_string());
        b.created_at = a.created_at + chrono::Duration::seconds(1);

        assert_eq!(BatchSubmitter::file_ids(&[b.clone(), a.clone()]), vec!["55", "56"]);
    }
}
