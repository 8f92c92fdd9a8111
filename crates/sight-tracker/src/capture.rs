//! Capture task: pulls frames from the video source into the buffer
//!
//! Runs on a blocking thread so camera reads never stall the runtime.
//! A missing frame is a transient condition and the loop retries after a
//! short pause. On cancellation the source is released before the task
//! returns.

use crate::FrameBuffer;
use sight_cv::VideoSource;
use sight_telemetry::MetricsCollector;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u64,
    pub misses: u64,
}

/// Read until cancelled, publishing every frame
pub fn run_capture(
    source: &mut dyn VideoSource,
    buffer: &FrameBuffer,
    retry: Duration,
    cancel: &CancellationToken,
    metrics: &MetricsCollector,
) -> CaptureStats {
    let mut stats = CaptureStats::default();
    info!("📹 Capture started: {}", source.describe());
    buffer.set_source_active(true);

    while !cancel.is_cancelled() {
        match source.read() {
            Some(frame) => {
                buffer.publish(frame);
                stats.frames += 1;
                metrics.record_capture();
            }
            None => {
                stats.misses += 1;
                metrics.record_capture_miss();
                trace!("No frame from source, retrying in {:?}", retry);
                std::thread::sleep(retry);
            }
        }
    }

    source.release();
    buffer.set_source_active(false);
    info!(
        "📹 Camera released after {} frames ({} empty reads)",
        stats.frames, stats.misses
    );
    stats
}

pub fn spawn_capture(
    mut source: Box<dyn VideoSource>,
    buffer: Arc<FrameBuffer>,
    retry: Duration,
    cancel: CancellationToken,
    metrics: Arc<MetricsCollector>,
) -> JoinHandle<CaptureStats> {
    tokio::task::spawn_blocking(move || run_capture(source.as_mut(), &buffer, retry, &cancel, &metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Alternates frames and gaps; cancels after `limit` reads
    struct FlakySource {
        reads: u64,
        limit: u64,
        cancel: CancellationToken,
        released: Arc<AtomicBool>,
    }

    impl VideoSource for FlakySource {
        fn read(&mut self) -> Option<RgbImage> {
            self.reads += 1;
            if self.reads >= self.limit {
                self.cancel.cancel();
            }
            (self.reads % 2 == 1).then(|| RgbImage::new(4, 4))
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    #[test]
    fn test_capture_retries_and_releases() {
        let cancel = CancellationToken::new();
        let released = Arc::new(AtomicBool::new(false));
        let mut source = FlakySource {
            reads: 0,
            limit: 6,
            cancel: cancel.clone(),
            released: released.clone(),
        };
        let buffer = FrameBuffer::new();
        let metrics = MetricsCollector::new().unwrap();

        let stats = run_capture(&mut source, &buffer, Duration::from_millis(1), &cancel, &metrics);

        assert_eq!(stats, CaptureStats { frames: 3, misses: 3 });
        assert_eq!(buffer.latest_seq(), 3);
        assert!(released.load(Ordering::SeqCst));
        assert!(!buffer.source_active());
        assert_eq!(metrics.frames_captured(), 3);
    }

    #[tokio::test]
    async fn test_spawned_capture_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let buffer = Arc::new(FrameBuffer::new());
        let source = sight_cv::SyntheticSource::new(32, 32, Some(Duration::from_millis(2))).unwrap();
        let handle = spawn_capture(
            Box::new(source),
            buffer.clone(),
            Duration::from_millis(1),
            cancel.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
        );

        let first = tokio::time::timeout(Duration::from_secs(2), buffer.wait_for_newer(0))
            .await
            .unwrap();
        assert_eq!(first.image.dimensions(), (32, 32));

        cancel.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(stats.frames >= 1);
        assert!(!buffer.source_active());
    }
}
