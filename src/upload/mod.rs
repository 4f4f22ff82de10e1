pub mod comments;
pub mod errors;
mod manager;
pub mod notifier;
pub mod progress;
pub mod record;
pub mod session;
pub mod store;
pub mod submitter;
pub mod transfer;
mod worker;

pub use comments::{CommentPlaceholders, PlaceholderComment};
pub use errors::{Result, UploadError};
pub use manager::{ManagerOptions, UploadEvent, UploadManager, UploadManagerHandle};
pub use notifier::{Notification, Notifier, TracingNotifier};
pub use progress::TransferProgress;
pub use record::{FileRecord, FileRecordId, UploadContext};
pub use session::SessionBlob;
pub use submitter::{BatchStatus, BatchSubmitter};
pub use transfer::{HttpTransferService, TransferRequest, TransferService};
