//! Local JSON document backend
//!
//! ```json
//! {
//!   "safezones": { "<uid>": { "polygon": [{"x": 0.1, "y": 0.1}, ...] } },
//!   "users":     { "<uid>": { "alertEnabled": true } }
//! }
//! ```
//!
//! The file is re-read on every lookup so edits take effect on the next
//! refresh.

use crate::{geofence_from_pairs, StoreResult, ZoneStore};
use async_trait::async_trait;
use serde::Deserialize;
use sight_core::{Geofence, UserId};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Documents {
    safezones: HashMap<String, SafeZoneDoc>,
    users: HashMap<String, UserDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SafeZoneDoc {
    polygon: Vec<PointDoc>,
}

#[derive(Debug, Deserialize)]
struct PointDoc {
    x: f64,
    y: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UserDoc {
    alert_enabled: bool,
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> StoreResult<Documents> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ZoneStore for JsonFileStore {
    async fn fetch_geofence(&self, user: &UserId) -> StoreResult<Option<Geofence>> {
        let mut docs = self.load().await?;
        Ok(docs
            .safezones
            .remove(user.as_str())
            .and_then(|zone| geofence_from_pairs(zone.polygon.into_iter().map(|p| (p.x, p.y)).collect())))
    }

    async fn fetch_alert_enabled(&self, user: &UserId) -> StoreResult<bool> {
        let docs = self.load().await?;
        Ok(docs.users.get(user.as_str()).map(|u| u.alert_enabled).unwrap_or(false))
    }

    fn backend(&self) -> &'static str {
        "json_file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    fn write_docs(body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("sight-store-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_reads_zone_and_flag() {
        let path = write_docs(
            r#"{
                "safezones": {"u1": {"polygon": [{"x": 0, "y": 0}, {"x": 0.5, "y": 0}, {"x": 0.5, "y": 1}]}},
                "users": {"u1": {"alertEnabled": true}, "u2": {}}
            }"#,
        );
        let store = JsonFileStore::new(&path);

        let zone = store.fetch_geofence(&UserId::new("u1")).await.unwrap().unwrap();
        assert_eq!(zone.len(), 3);
        assert!(store.fetch_alert_enabled(&UserId::new("u1")).await.unwrap());
        assert!(!store.fetch_alert_enabled(&UserId::new("u2")).await.unwrap());
        assert!(store.fetch_geofence(&UserId::new("u2")).await.unwrap().is_none());
        assert!(!store.fetch_alert_enabled(&UserId::new("nobody")).await.unwrap());

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_out_of_range_zone_reads_as_none() {
        let path = write_docs(
            r#"{"safezones": {"u1": {"polygon": [{"x": 0, "y": 0}, {"x": 100000000, "y": 0}, {"x": 0.5, "y": 1}]}}}"#,
        );
        let store = JsonFileStore::new(&path);
        assert!(store.fetch_geofence(&UserId::new("u1")).await.unwrap().is_none());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let store = JsonFileStore::new("/nonexistent/sight-zones.json");
        assert!(matches!(
            store.fetch_geofence(&UserId::new("u1")).await,
            Err(StoreError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let path = write_docs("{ not json");
        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.fetch_alert_enabled(&UserId::new("u1")).await,
            Err(StoreError::Malformed(_))
        ));
        let _ = std::fs::remove_file(path);
    }
}
