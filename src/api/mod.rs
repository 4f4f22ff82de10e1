mod client;
pub mod types;

pub use client::{ApiClient, LmsApi};
pub use types::{
    ApiFile,
    ApiSubmission,
    ApiSubmissionComment,
    CommentParams,
    CreateSubmissionBody,
    FileUploadTarget,
    MediaCommentType,
    OnDuplicate,
    PutCommentBody,
    SubmissionType,
    TurnItInData,
    TurnItInEntry,
    UploadTargetRequest,
};
