use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Canvas serializes ids sometimes as strings and sometimes as numbers.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Str(String),
        Num(i64),
    }

    match IdRepr::deserialize(deserializer)? {
        IdRepr::Str(s) => Ok(s),
        IdRepr::Num(n) => Ok(n.to_string()),
    }
}

/// Short-lived, server-issued upload destination.
///
/// https://canvas.instructure.com/doc/api/file.file_uploads.html - Step 1 response
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileUploadTarget {
    pub upload_url: String,
    #[serde(default)]
    pub upload_params: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDuplicate {
    Rename,
    Overwrite,
}

/// Body of the upload target negotiation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadTargetRequest {
    pub name: String,
    pub size: u64,
    pub on_duplicate: OnDuplicate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_folder_path: Option<String>,
}

impl UploadTargetRequest {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            on_duplicate: OnDuplicate::Rename,
            parent_folder_path: None,
        }
    }

    pub fn with_folder_path(mut self, folder_path: impl Into<String>) -> Self {
        self.parent_folder_path = Some(folder_path.into());
        self
    }
}

/// https://canvas.instructure.com/doc/api/files.html#File
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiFile {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub display_name: String,
    pub filename: String,
    #[serde(rename = "content-type", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    OnlineUpload,
    OnlineTextEntry,
    OnlineUrl,
    MediaRecording,
    BasicLtiLaunch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCommentType {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiSubmissionComment {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Option<Vec<ApiFile>>,
}

/// https://canvas.instructure.com/doc/api/submissions.html#Submission
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiSubmission {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub submission_type: Option<SubmissionType>,
    #[serde(default)]
    pub attempt: Option<u32>,
    #[serde(default)]
    pub late: Option<bool>,
    #[serde(default)]
    pub attachments: Option<Vec<ApiFile>>,
    #[serde(default)]
    pub submission_comments: Option<Vec<ApiSubmissionComment>>,
    #[serde(default)]
    pub turnitin_data: Option<TurnItInData>,
}

/// Plagiarism results keyed by dynamic `submission_{id}` / `attachment_{id}`
/// keys. The server mixes non-result values (e.g. webhook bookkeeping) into
/// the same object, so entries that do not decode as results are skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnItInData(pub HashMap<String, TurnItInEntry>);

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TurnItInEntry {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_response: Option<serde_json::Value>,
}

impl TurnItInData {
    pub fn get(&self, key: &str) -> Option<&TurnItInEntry> {
        self.0.get(key)
    }
}

impl<'de> Deserialize<'de> for TurnItInData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = HashMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let entries = raw
            .into_iter()
            .filter_map(|(key, value)| {
                serde_json::from_value::<TurnItInEntry>(value)
                    .ok()
                    .map(|entry| (key, entry))
            })
            .collect();

        Ok(Self(entries))
    }
}

impl Serialize for TurnItInData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// https://canvas.instructure.com/doc/api/submissions.html#method.submissions.create
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateSubmissionBody {
    pub submission: SubmissionParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<CommentParams>,
}

impl CreateSubmissionBody {
    /// Final step of a file submission: reference the uploaded file ids.
    pub fn file_upload(file_ids: Vec<String>, text_comment: Option<String>) -> Self {
        let comment = text_comment.clone().map(CommentParams::text);
        Self {
            submission: SubmissionParams {
                text_comment,
                submission_type: SubmissionType::OnlineUpload,
                file_ids: Some(file_ids),
            },
            comment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_comment: Option<String>,
    pub submission_type: SubmissionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<String>>,
}

/// Comment attached to an existing submission, either standalone text,
/// a media recording reference, or uploaded file ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentParams {
    pub group_comment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_comment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_comment_type: Option<MediaCommentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<String>>,
}

impl CommentParams {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            group_comment: false,
            text_comment: Some(text.into()),
            media_comment_id: None,
            media_comment_type: None,
            file_ids: None,
        }
    }

    pub fn media(media_id: impl Into<String>, media_type: MediaCommentType) -> Self {
        Self {
            group_comment: false,
            text_comment: None,
            media_comment_id: Some(media_id.into()),
            media_comment_type: Some(media_type),
            file_ids: None,
        }
    }

    pub fn files(file_ids: Vec<String>) -> Self {
        Self {
            group_comment: false,
            text_comment: None,
            media_comment_id: None,
            media_comment_type: None,
            file_ids: Some(file_ids),
        }
    }
}

/// https://canvas.instructure.com/doc/api/submissions.html#method.submissions_api.update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PutCommentBody {
    pub comment: CommentParams,
}
