//! Output sink: bounded image queue drained into storage by one task.

use std::sync::Arc;
use std::time::Duration;

use daq_core::capabilities::TileStorage;
use daq_core::{AppResult, Cancelled, DaqError, TaggedImage};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

enum SinkMessage {
    Image(Arc<TaggedImage>),
    EndOfAcquisition,
}

/// Counters reported when the drain task exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Images handed to storage
    pub stored: u64,
    /// Images storage rejected
    pub failed: u64,
}

/// Handle to the drain task.
pub struct ImageSink {
    tx: mpsc::Sender<SinkMessage>,
    exited: watch::Receiver<Option<SinkReport>>,
}

impl ImageSink {
    /// Spawn the drain task. `on_drained` runs once storage is finished.
    pub fn start<F>(capacity: usize, storage: Arc<dyn TileStorage>, on_drained: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (exited_tx, exited) = watch::channel(None);
        tokio::spawn(
            async move {
                let report = drain(rx, storage.as_ref()).await;
                on_drained();
                let _ = exited_tx.send(Some(report));
            }
            .instrument(info_span!("image_sink")),
        );
        Self { tx, exited }
    }

    /// Queue an image, waiting for space.
    ///
    /// If the drain task is gone the image is dropped with a warning.
    pub async fn put(&self, image: Arc<TaggedImage>, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            sent = self.tx.send(SinkMessage::Image(image)) => {
                if sent.is_err() {
                    warn!("Image sink closed; image dropped");
                }
                Ok(())
            }
        }
    }

    /// Tell the drain task no more images follow.
    pub async fn end_of_acquisition(&self) {
        if self.tx.send(SinkMessage::EndOfAcquisition).await.is_err() {
            debug!("Image sink already closed");
        }
    }

    /// Images waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Whether the drain task is still running.
    pub fn is_alive(&self) -> bool {
        self.exited.borrow().is_none()
    }

    /// Wait up to `timeout` for the drain task to exit.
    pub async fn wait_to_die(&self, timeout: Duration) -> AppResult<SinkReport> {
        let mut exited = self.exited.clone();
        let waited = tokio::time::timeout(timeout, async {
            exited.wait_for(Option::is_some).await.map(|report| *report)
        })
        .await;
        match waited {
            Ok(Ok(report)) => Ok(report.unwrap_or_default()),
            Ok(Err(_)) => {
                warn!("Image sink task ended without reporting");
                Ok(SinkReport::default())
            }
            Err(_) => Err(DaqError::ShutdownTimeout {
                what: "image sink",
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

async fn drain(mut rx: mpsc::Receiver<SinkMessage>, storage: &dyn TileStorage) -> SinkReport {
    let mut report = SinkReport::default();
    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Image(image) => {
                let image = Arc::try_unwrap(image).unwrap_or_else(|shared| (*shared).clone());
                match storage.store_image(image).await {
                    Ok(()) => report.stored += 1,
                    Err(e) => {
                        report.failed += 1;
                        error!(error = %e, "Storage rejected image");
                    }
                }
            }
            SinkMessage::EndOfAcquisition => break,
        }
    }
    rx.close();
    if let Err(e) = storage.finish().await {
        error!(error = %e, "Storage failed to finish");
    }
    info!(stored = report.stored, failed = report.failed, "Image sink drained");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use daq_core::data::tags;
    use daq_core::Frame;
    use daq_storage::{MemoryTileStorage, TileGrid};
    use tracing_test::traced_test;

    fn image(slice: i64) -> Arc<TaggedImage> {
        Arc::new(
            TaggedImage::new(Frame::from_u8(2, 1, vec![1, 2]))
                .with_tag(tags::POSITION_INDEX, 0)
                .with_tag(tags::SLICE_INDEX, slice),
        )
    }

    fn storage() -> Arc<MemoryTileStorage> {
        Arc::new(MemoryTileStorage::new("sink", TileGrid::from_camera(2, 1, 1.0, 0, 0)))
    }

    #[tokio::test]
    async fn drains_then_finishes_storage_then_reports() {
        let storage = storage();
        let drained = Arc::new(AtomicBool::new(false));
        let flag = drained.clone();
        let sink = ImageSink::start(4, storage.clone(), move || flag.store(true, Ordering::SeqCst));
        let cancel = CancellationToken::new();

        for slice in 0..3 {
            sink.put(image(slice), &cancel).await.unwrap();
        }
        assert!(sink.is_alive());
        sink.end_of_acquisition().await;

        let report = sink.wait_to_die(Duration::from_secs(1)).await.unwrap();
        assert_eq!(report, SinkReport { stored: 3, failed: 0 });
        assert!(drained.load(Ordering::SeqCst));
        assert!(storage.is_finished());
        assert_eq!(storage.image_count(), 3);
        assert!(!sink.is_alive());
    }

    #[tokio::test]
    #[traced_test]
    async fn rejected_images_are_counted() {
        let sink = ImageSink::start(4, storage(), || {});
        let untagged = Arc::new(TaggedImage::new(Frame::from_u8(1, 1, vec![0])));
        sink.put(untagged, &CancellationToken::new()).await.unwrap();
        sink.end_of_acquisition().await;

        let report = sink.wait_to_die(Duration::from_secs(1)).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(logs_contain("Storage rejected image"));
    }

    #[tokio::test]
    async fn put_after_exit_is_dropped() {
        let sink = ImageSink::start(1, storage(), || {});
        sink.end_of_acquisition().await;
        sink.wait_to_die(Duration::from_secs(1)).await.unwrap();
        assert!(sink.put(image(0), &CancellationToken::new()).await.is_ok());
        sink.end_of_acquisition().await;
    }

    #[tokio::test]
    async fn cancelled_put_returns_cancelled() {
        let sink = ImageSink::start(1, storage(), || {});
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(sink.put(image(0), &cancel).await, Err(Cancelled));
        assert_eq!(sink.queued(), 0);
    }

    #[tokio::test]
    async fn wait_times_out_while_open() {
        let sink = ImageSink::start(1, storage(), || {});
        let err = sink.wait_to_die(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, DaqError::ShutdownTimeout { what: "image sink", .. }));
    }
}
