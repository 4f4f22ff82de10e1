use std::path::PathBuf;
use anyhow::{Context, bail};
use tracing::info;
use tracing_subscriber::EnvFilter;
use satchel::config::Config;
use satchel::upload::{UploadContext, UploadEvent, UploadManager};

/// 命令行：satchel <course_id> <assignment_id> <file>...
/// 上传文件并提交作业
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(course_id), Some(assignment_id)) = (args.next(), args.next()) else {
        bail!("Usage: satchel <course_id> <assignment_id> <file>...");
    };
    let files: Vec<PathBuf> = args.map(PathBuf::from).collect();
    if files.is_empty() {
        bail!("Usage: satchel <course_id> <assignment_id> <file>...");
    }

    let config = Config::load("config.toml").context("Can't load config.toml")?;
    let handle = UploadManager::with_config(&config);
    let manager = handle.manager.clone();
    let mut events = manager.subscribe_events();

    let batch_id = format!("assignment-{assignment_id}");
    for file in files {
        let record_id = manager.add_file(file.clone(), &batch_id).await?;
        info!(%record_id, "Queued {}", file.display());
    }

    manager
        .upload_batch(
            &batch_id,
            UploadContext::Submission {
                course_id,
                assignment_id,
                comment: None,
            },
        )
        .await?;

    loop {
        match events.recv().await? {
            UploadEvent::Progress { record_id, bytes_sent, size } => {
                info!(%record_id, "{bytes_sent}/{size} bytes");
            }
            UploadEvent::FileUploaded { record_id, remote_id } => {
                info!(%record_id, "Uploaded as file {remote_id}");
            }
            UploadEvent::BatchSubmitted { submission_id, .. } => {
                info!("Submission {submission_id} created");
                break;
            }
            UploadEvent::FileFailed { record_id, error } => {
                info!(%record_id, "Upload failed: {error}");
            }
            UploadEvent::BatchFailed { error, .. } => {
                drop(manager);
                let _ = handle.shutdown().await;
                bail!("Submission failed: {error}");
            }
            _ => {}
        }
    }

    drop(manager);
    handle.shutdown().await?;

    Ok(())
}
