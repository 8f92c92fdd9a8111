//! Fan-out of pipeline output to serving clients
//!
//! JSON frame records go out on a broadcast channel (slow subscribers lag
//! and skip). The newest annotated JPEG sits in a watch slot that MJPEG
//! viewers poll at their own pace.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use sight_core::FrameRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::debug;
use uuid::Uuid;

pub type JpegFrame = Arc<Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    Stream,
    Events,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: Uuid,
    pub kind: ClientKind,
    pub connected_at: DateTime<Utc>,
}

pub struct OutputHub {
    records: broadcast::Sender<Arc<FrameRecord>>,
    jpeg: watch::Sender<Option<JpegFrame>>,
    latest: RwLock<Option<Arc<FrameRecord>>>,
    clients: DashMap<Uuid, ClientInfo>,
    published: AtomicU64,
}

impl OutputHub {
    pub fn new(capacity: usize) -> Self {
        let (records, _) = broadcast::channel(capacity.max(1));
        let (jpeg, _) = watch::channel(None);
        Self {
            records,
            jpeg,
            latest: RwLock::new(None),
            clients: DashMap::new(),
            published: AtomicU64::new(0),
        }
    }

    /// Publish a frame record to subscribers and keep it as the latest
    pub fn publish_record(&self, record: FrameRecord) {
        let record = Arc::new(record);
        *self.latest.write() = Some(record.clone());
        self.published.fetch_add(1, Ordering::Relaxed);
        // No subscribers is fine
        let _ = self.records.send(record);
    }

    /// Replace the current annotated JPEG
    pub fn publish_jpeg(&self, jpeg: Vec<u8>) {
        self.jpeg.send_replace(Some(Arc::new(jpeg)));
    }

    pub fn subscribe_records(&self) -> broadcast::Receiver<Arc<FrameRecord>> {
        self.records.subscribe()
    }

    pub fn subscribe_jpeg(&self) -> watch::Receiver<Option<JpegFrame>> {
        self.jpeg.subscribe()
    }

    pub fn latest_record(&self) -> Option<Arc<FrameRecord>> {
        self.latest.read().clone()
    }

    pub fn latest_jpeg(&self) -> Option<JpegFrame> {
        self.jpeg.borrow().clone()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    // ========================================================================
    // CLIENT REGISTRY
    // ========================================================================

    pub fn register_client(&self, kind: ClientKind) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.insert(
            id,
            ClientInfo {
                id,
                kind,
                connected_at: Utc::now(),
            },
        );
        debug!("Client {} connected ({:?})", id, kind);
        id
    }

    pub fn unregister_client(&self, id: &Uuid) {
        if self.clients.remove(id).is_some() {
            debug!("Client {} disconnected", id);
        }
    }

    pub fn client_count(&self, kind: ClientKind) -> usize {
        self.clients.iter().filter(|c| c.kind == kind).count()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.clients.iter().map(|c| c.value().clone()).collect()
    }
}

impl Default for OutputHub {
    fn default() -> Self {
        Self::new(64)
    }
}
