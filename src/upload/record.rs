use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 本地文件记录唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct FileRecordId(pub Uuid);

impl FileRecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote destination the batch is uploaded to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum UploadContext {
    /// Generic course file
    Course {
        course_id: String,
        folder_path: Option<String>,
    },
    /// Assignment submission, finalized with a create-submission call
    Submission {
        course_id: String,
        assignment_id: String,
        comment: Option<String>,
    },
    /// Files attached to a submission comment
    SubmissionComment {
        course_id: String,
        assignment_id: String,
        user_id: String,
    },
}

impl UploadContext {
    /// API path of the upload target negotiation endpoint for this context.
    pub fn files_path(&self) -> String {
        match self {
            UploadContext::Course { course_id, .. } => {
                format!("courses/{course_id}/files")
            }
            UploadContext::Submission { course_id, assignment_id, .. } => {
                format!("courses/{course_id}/assignments/{assignment_id}/submissions/self/files")
            }
            UploadContext::SubmissionComment { course_id, assignment_id, user_id } => {
                format!("courses/{course_id}/assignments/{assignment_id}/submissions/{user_id}/comments/files")
            }
        }
    }
}

/// 待上传或已上传的本地文件记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileRecordId,
    /// Groups files submitted together
    pub batch_id: String,
    /// Owning user
    pub user_id: String,
    /// Local copy of the file, owned exclusively; deleted once the
    /// batch is through
    pub local_path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub bytes_sent: u64,
    /// Assigned by the server once the transfer completes
    pub remote_id: Option<String>,
    pub context: Option<UploadContext>,
    /// Correlates the record to its in-flight transfer
    pub task_id: Option<Uuid>,
    /// Last upload error; absent when healthy
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub fn new(
        local_path: PathBuf,
        file_name: impl Into<String>,
        size: u64,
        batch_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: FileRecordId::new(),
            batch_id: batch_id.into(),
            user_id: user_id.into(),
            local_path,
            file_name: file_name.into(),
            size,
            bytes_sent: 0,
            remote_id: None,
            context: None,
            task_id: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// A record with a remote id is considered uploaded.
    pub fn is_uploaded(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Clear any previous attempt before re-uploading.
    pub fn reset_for_upload(&mut self) {
        self.remote_id = None;
        self.bytes_sent = 0;
        self.error = None;
        self.task_id = None;
        self.started_at = None;
        self.completed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FileRecord {
        FileRecord::new(PathBuf::from("/tmp/essay.pdf"), "essay.pdf", 100, "b1", "u1")
    }

    #[test]
    fn test_uploaded_iff_remote_id_assigned() {
        let mut record = record();
        assert!(!record.is_uploaded());

        record.remote_id = Some("55".to_string());
        assert!(record.is_uploaded());
    }

    #[test]
    fn test_reset_clears_previous_attempt() {
        let mut record = record();
        record.remote_id = Some("55".to_string());
        record.bytes_sent = 100;
        record.error = Some("boom".to_string());
        record.task_id = Some(Uuid::new_v4());

        record.reset_for_upload();
        assert!(!record.is_uploaded());
        assert_eq!(record.bytes_sent, 0);
        assert!(record.error.is_none());
        assert!(record.task_id.is_none());
    }

    #[test]
    fn test_files_path_per_context() {
        let course = UploadContext::Course { course_id: "1".into(), folder_path: None };
        assert_eq!(course.files_path(), "courses/1/files");

        let submission = UploadContext::Submission {
            course_id: "1".into(),
            assignment_id: "2".into(),
            comment: None,
        };
        assert_eq!(
            submission.files_path(),
            "courses/1/assignments/2/submissions/self/files"
        );

        let comment = UploadContext::SubmissionComment {
            course_id: "1".into(),
            assignment_id: "2".into(),
            user_id: "3".into(),
        };
        assert_eq!(
            comment.files_path(),
            "courses/1/assignments/2/submissions/3/comments/files"
        );
    }
}
