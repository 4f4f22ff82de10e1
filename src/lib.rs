pub mod api;
pub mod config;
pub mod upload;

// 重新导出核心类型
pub use upload::{
    BatchStatus,
    FileRecord,
    FileRecordId,
    ManagerOptions,
    Result,
    TransferProgress,
    TransferService,
    UploadContext,
    UploadError,
    UploadEvent,
    UploadManager,
    UploadManagerHandle,
};

pub use config::Config;
