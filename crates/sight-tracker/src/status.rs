//! Shared pipeline status and user binding handles

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sight_core::UserId;
use std::sync::Arc;
use tokio::sync::watch;

/// Snapshot written by the processing task after every frame
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStatus {
    pub model_loaded: bool,
    pub detector: String,
    pub safe_zone_defined: bool,
    pub alert_enabled: bool,
    pub user_id: Option<String>,
    pub active_tracks: usize,
    pub surfaced_tracks: usize,
    pub frame_index: u64,
    pub fps: f64,
    pub last_alert_at: Option<DateTime<Utc>>,
}

pub type StatusHandle = Arc<RwLock<PipelineStatus>>;

/// Writer side of the user the pipeline works for. The processing task
/// picks up changes at the start of its next frame.
#[derive(Clone)]
pub struct UserBinding {
    tx: Arc<watch::Sender<Option<UserId>>>,
}

impl UserBinding {
    /// A binding with no user, plus the receiver the processing task reads
    pub fn new() -> (Self, watch::Receiver<Option<UserId>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn set(&self, user: Option<UserId>) {
        self.tx.send_replace(user);
    }

    pub fn current(&self) -> Option<UserId> {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_binding_marks_change() {
        let (binding, mut rx) = UserBinding::new();
        assert!(!rx.has_changed().unwrap());

        binding.set(Some(UserId::new("u1")));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().clone(), Some(UserId::new("u1")));
        assert_eq!(binding.current(), Some(UserId::new("u1")));
        assert!(!rx.has_changed().unwrap());
    }
}
