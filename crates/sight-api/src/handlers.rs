//! HTTP request handlers

use crate::error::ApiError;
use crate::state::{AppState, ClientGuard};

use axum::{
    body::{Body, Bytes},
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use futures::{stream, SinkExt, StreamExt};
use serde::Serialize;
use sight_core::{FrameRecord, UserId};
use sight_tracker::{ClientKind, JpegFrame};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub model_loaded: bool,
    pub detector: String,
    pub camera_active: bool,
    pub safe_zone_defined: bool,
    pub alert_enabled: bool,
    pub user_id: Option<String>,
    pub active_tracks: usize,
    pub surfaced_tracks: usize,
    pub frame_index: u64,
    pub fps: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetUserResponse {
    pub status: String,
    pub user_id: String,
}

// ============================================================================
// HEALTH & METRICS
// ============================================================================

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status_snapshot();
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        timestamp: Utc::now().to_rfc3339(),
        model_loaded: status.model_loaded,
        detector: status.detector,
        camera_active: state.buffer.source_active(),
        safe_zone_defined: status.safe_zone_defined,
        alert_enabled: status.alert_enabled,
        user_id: status.user_id,
        active_tracks: status.active_tracks,
        surfaced_tracks: status.surfaced_tracks,
        frame_index: status.frame_index,
        fps: (status.fps * 10.0).round() / 10.0,
    })
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .metrics
        .export()
        .map_err(|e| ApiError::internal(format!("metrics export failed: {}", e)))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

// ============================================================================
// FRAME & USER HANDLERS
// ============================================================================

/// Latest frame record, without its image
pub async fn latest_frame(State(state): State<AppState>) -> Result<Json<FrameRecord>, ApiError> {
    state
        .hub
        .latest_record()
        .map(|record| Json(record.without_image()))
        .ok_or_else(|| ApiError::not_found("no frame has been processed yet"))
}

/// Bind the pipeline to a user; takes effect on the next frame
pub async fn set_user(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<SetUserResponse>, ApiError> {
    let uid = uid.trim();
    if uid.is_empty() {
        return Err(ApiError::bad_request("user id must not be empty"));
    }
    if uid == "." || uid == ".." || uid.contains(['/', '\\', '%']) {
        return Err(ApiError::bad_request("user id must be a single path segment"));
    }

    info!("👤 Binding pipeline to user {}", uid);
    state.users.set(Some(UserId::new(uid)));

    Ok(Json(SetUserResponse {
        status: "ok".into(),
        user_id: uid.to_string(),
    }))
}

// ============================================================================
// MJPEG STREAM
// ============================================================================

/// Unfold state for one MJPEG viewer
struct MjpegViewer {
    frames: watch::Receiver<Option<JpegFrame>>,
    shutdown: CancellationToken,
    pacing: Duration,
    first: bool,
    _guard: ClientGuard,
}

impl MjpegViewer {
    /// Wait for the next JPEG, `None` once the server is stopping
    async fn next_frame(&mut self) -> Option<JpegFrame> {
        if !self.first {
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(self.pacing) => {}
            }
        }
        self.first = false;

        loop {
            let current = self.frames.borrow_and_update().clone();
            if let Some(frame) = current {
                return Some(frame);
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                changed = self.frames.changed() => changed.ok()?,
            }
        }
    }
}

/// Wrap a JPEG as one multipart part
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Multipart stream of the latest annotated frame
pub async fn video_stream(State(state): State<AppState>) -> impl IntoResponse {
    let guard = state.track_client(ClientKind::Stream);
    debug!("MJPEG viewer {} attached", guard.id());

    let viewer = MjpegViewer {
        frames: state.hub.subscribe_jpeg(),
        shutdown: state.shutdown.clone(),
        pacing: state.stream_pacing(),
        first: true,
        _guard: guard,
    };

    let parts = stream::unfold(viewer, |mut viewer| async move {
        let frame = viewer.next_frame().await?;
        Some((Ok::<_, Infallible>(multipart_part(&frame)), viewer))
    });

    (
        [
            (header::CONTENT_TYPE, MJPEG_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(parts),
    )
}

// ============================================================================
// EVENT STREAM
// ============================================================================

pub async fn events_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events(socket, state))
}

/// Push every frame record to one WebSocket client until either side
/// goes away
async fn handle_events(socket: WebSocket, state: AppState) {
    let guard = state.track_client(ClientKind::Events);
    let client_id = guard.id();
    info!("🔗 Event client {} connected", client_id);

    let mut records = state.hub.subscribe_records();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("Event client {} receive error: {}", client_id, e);
                    break;
                }
                // Clients have nothing to say; pings are answered by axum
                Some(Ok(_)) => {}
            },
            result = records.recv() => match result {
                Ok(record) => match record.to_json() {
                    Ok(json) => {
                        if let Err(e) = sender.send(Message::Text(json.into())).await {
                            debug!("Failed to send to event client {}: {}", client_id, e);
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to serialize frame record: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event client {} lagged by {} records", client_id, n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    drop(guard);
    info!("🔌 Event client {} disconnected", client_id);
}

// ============================================================================
// TESTS
// ============================================================================
