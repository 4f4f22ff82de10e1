use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use tokio::sync::mpsc;
use super::record::FileRecordId;

/// 进度更新，从传输流发往 worker
#[derive(Debug, Clone, Copy)]
pub struct TransferProgress {
    pub record_id: FileRecordId,
    pub bytes_sent: u64,
    pub size: u64,
}

pin_project! {
    /// Wraps the file body stream and reports sent bytes per chunk.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        record_id: FileRecordId,
        size: u64,
        bytes_sent: u64,
        progress_tx: mpsc::UnboundedSender<TransferProgress>,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(
        inner: S,
        record_id: FileRecordId,
        size: u64,
        progress_tx: mpsc::UnboundedSender<TransferProgress>,
    ) -> Self {
        Self {
            inner,
            record_id,
            size,
            bytes_sent: 0,
            progress_tx,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.bytes_sent += chunk.len() as u64;
                    let _ = this.progress_tx.send(TransferProgress {
                        record_id: *this.record_id,
                        bytes_sent: *this.bytes_sent,
                        size: *this.size,
                    });
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                // 流结束时，发送最终更新
                let _ = this.progress_tx.send(TransferProgress {
                    record_id: *this.record_id,
                    bytes_sent: *this.bytes_sent,
                    size: *this.size,
                });
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
            Poll::Pending => Poll::Pending,
        }
    }
}
