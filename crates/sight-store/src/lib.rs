//! # Sight Store - Safe Zones and Alert Delivery
//!
//! Read-only lookups of a user's safe-zone polygon and alert preference,
//! and the fire-and-forget alert relay. Backends:
//! - Firestore REST (`safezones/{uid}`, `users/{uid}`)
//! - A local JSON file with the same shape, for offline runs
//! - A null store (no zone, alerts off)
//! - Log and webhook relays

pub mod error;
pub mod file;
pub mod firestore;
pub mod relay;

pub use error::{RelayError, RelayResult, StoreError, StoreResult};
pub use file::JsonFileStore;
pub use firestore::FirestoreStore;
pub use relay::{LogRelay, WebhookRelay};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sight_core::{Geofence, NormalizedPoint, UserId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Per-user safe zone and alert preference lookups
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ZoneStore: Send + Sync {
    /// The user's polygon; `None` when absent or under three points
    async fn fetch_geofence(&self, user: &UserId) -> StoreResult<Option<Geofence>>;

    /// Whether the user wants alerts; `false` when the user is unknown
    async fn fetch_alert_enabled(&self, user: &UserId) -> StoreResult<bool>;

    fn backend(&self) -> &'static str;
}

/// Outbound alert notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertRelay: Send + Sync {
    async fn send_alert(&self, user: &UserId, message: &str) -> RelayResult<()>;

    fn backend(&self) -> &'static str;
}

/// Store that knows no zones; everything is safe and alerts stay off
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl ZoneStore for NullStore {
    async fn fetch_geofence(&self, _user: &UserId) -> StoreResult<Option<Geofence>> {
        Ok(None)
    }

    async fn fetch_alert_enabled(&self, _user: &UserId) -> StoreResult<bool> {
        Ok(false)
    }

    fn backend(&self) -> &'static str {
        "none"
    }
}

/// Build a geofence from `(x, y)` pairs. Fewer than three points, or any
/// point outside the unit square, means no geofence rather than an error
pub fn geofence_from_pairs(pairs: Vec<(f64, f64)>) -> Option<Geofence> {
    Geofence::new(
        pairs
            .into_iter()
            .map(|(x, y)| NormalizedPoint::new(x, y))
            .collect(),
    )
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    None,
    JsonFile,
    Firestore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Firestore project id
    pub project_id: Option<String>,
    /// Firestore REST root, overridable for the emulator
    pub base_url: String,
    /// OAuth bearer token for Firestore
    pub token: Option<String>,
    /// JSON document file for `json_file`
    pub path: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::None,
            project_id: None,
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            token: None,
            path: None,
            timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayBackend {
    Log,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub backend: RelayBackend,
    /// Endpoint receiving `{"userId", "message"}` posts
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend: RelayBackend::Log,
            url: None,
            timeout_ms: 3000,
        }
    }
}

pub fn build_store(config: &StoreConfig) -> StoreResult<Arc<dyn ZoneStore>> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let store: Arc<dyn ZoneStore> = match config.backend {
        StoreBackend::None => Arc::new(NullStore),
        StoreBackend::JsonFile => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| StoreError::configuration("store.path is required for json_file"))?;
            Arc::new(JsonFileStore::new(path))
        }
        StoreBackend::Firestore => {
            let project = config
                .project_id
                .as_deref()
                .ok_or_else(|| StoreError::configuration("store.project_id is required for firestore"))?;
            Arc::new(FirestoreStore::new(
                &config.base_url,
                project,
                config.token.clone(),
                timeout,
            )?)
        }
    };
    info!("🗂️ Zone store backend: {}", store.backend());
    Ok(store)
}

pub fn build_relay(config: &RelayConfig) -> RelayResult<Arc<dyn AlertRelay>> {
    let relay: Arc<dyn AlertRelay> = match config.backend {
        RelayBackend::Log => Arc::new(LogRelay),
        RelayBackend::Webhook => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| RelayError::Configuration("relay.url is required for webhook".into()))?;
            Arc::new(WebhookRelay::new(url, Duration::from_millis(config.timeout_ms))?)
        }
    };
    info!("📣 Alert relay backend: {}", relay.backend());
    Ok(relay)
}

// ============================================================================
// TESTS
// ============================================================================
