//! Single-slot, latest-wins frame buffer between capture and processing
//!
//! The capture side overwrites the slot on every read and never waits.
//! The processing side takes a copy of whatever is newest; frames it did
//! not get to in time are simply lost.

use image::RgbImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::trace;

/// A frame as stored in the slot
#[derive(Debug)]
struct StoredFrame {
    seq: u64,
    image: RgbImage,
    captured_at: Instant,
}

/// Processing-side copy of a buffered frame
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    /// Capture sequence number, starting at 1
    pub seq: u64,
    pub image: RgbImage,
    pub captured_at: Instant,
}

#[derive(Debug, Default)]
pub struct FrameBuffer {
    slot: Mutex<Option<Arc<StoredFrame>>>,
    seq: AtomicU64,
    notify: Notify,
    source_active: AtomicBool,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the buffered frame; returns its sequence number
    pub fn publish(&self, image: RgbImage) -> u64 {
        let seq = {
            let mut slot = self.slot.lock();
            let seq = self.seq.fetch_add(1, Ordering::AcqRel) + 1;
            *slot = Some(Arc::new(StoredFrame {
                seq,
                image,
                captured_at: Instant::now(),
            }));
            seq
        };
        self.notify.notify_one();
        trace!("Frame {} buffered", seq);
        seq
    }

    /// Copy of the newest frame if it is newer than `seen`.
    ///
    /// Only the handle is taken under the lock; the pixel copy happens
    /// after it is released.
    pub fn latest_since(&self, seen: u64) -> Option<FrameSnapshot> {
        let stored = {
            let slot = self.slot.lock();
            slot.as_ref().filter(|f| f.seq > seen).cloned()
        }?;
        Some(FrameSnapshot {
            seq: stored.seq,
            image: stored.image.clone(),
            captured_at: stored.captured_at,
        })
    }

    /// Wait until a frame newer than `seen` is available
    pub async fn wait_for_newer(&self, seen: u64) -> FrameSnapshot {
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self.latest_since(seen) {
                return frame;
            }
            notified.await;
        }
    }

    /// Sequence number of the newest frame, 0 before the first
    pub fn latest_seq(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    pub fn set_source_active(&self, active: bool) {
        self.source_active.store(active, Ordering::Release);
    }

    pub fn source_active(&self) -> bool {
        self.source_active.load(Ordering::Acquire)
    }
}
