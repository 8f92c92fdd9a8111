//! Application state shared by the HTTP handlers

use crate::config::AppConfig;
use sight_telemetry::MetricsCollector;
use sight_tracker::{ClientKind, FrameBuffer, OutputHub, PipelineStatus, StatusHandle, UserBinding};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Frame records and annotated JPEGs from the processing task
    pub hub: Arc<OutputHub>,
    /// Capture buffer, read only for source liveness
    pub buffer: Arc<FrameBuffer>,
    pub status: StatusHandle,
    pub users: UserBinding,
    pub metrics: Arc<MetricsCollector>,
    /// Cancelled on shutdown; long-lived responses end with it
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn status_snapshot(&self) -> PipelineStatus {
        self.status.read().clone()
    }

    pub fn stream_pacing(&self) -> Duration {
        self.config.stream_pacing()
    }

    /// Register a streaming client for as long as the guard lives
    pub fn track_client(&self, kind: ClientKind) -> ClientGuard {
        let id = self.hub.register_client(kind);
        self.publish_client_count(kind);
        ClientGuard {
            state: self.clone(),
            id,
            kind,
        }
    }

    fn publish_client_count(&self, kind: ClientKind) {
        let count = self.hub.client_count(kind);
        match kind {
            ClientKind::Stream => self.metrics.set_stream_clients(count),
            ClientKind::Events => self.metrics.set_event_clients(count),
        }
    }
}

pub struct ClientGuard {
    state: AppState,
    id: Uuid,
    kind: ClientKind,
}

impl ClientGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.state.hub.unregister_client(&self.id);
        self.state.publish_client_count(self.kind);
    }
}
