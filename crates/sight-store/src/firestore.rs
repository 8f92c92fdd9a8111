//! Firestore REST backend
//!
//! Documents:
//! - `safezones/{uid}`: `polygon` array of `{x, y}` maps, normalized [0,1]
//! - `users/{uid}`: `alertEnabled` boolean
//!
//! A missing document (HTTP 404) is an absence, not an error.

use crate::{geofence_from_pairs, StoreError, StoreResult, ZoneStore};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use sight_core::{Geofence, UserId};
use std::time::Duration;
use tracing::{debug, trace};

pub struct FirestoreStore {
    client: reqwest::Client,
    documents_url: Url,
    token: Option<String>,
}

impl FirestoreStore {
    pub fn new(base_url: &str, project_id: &str, token: Option<String>, timeout: Duration) -> StoreResult<Self> {
        if project_id.is_empty() {
            return Err(StoreError::configuration("firestore project id is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::configuration(format!("http client: {}", e)))?;

        let documents_url = Url::parse(&format!(
            "{}/projects/{}/databases/(default)/documents",
            base_url.trim_end_matches('/'),
            project_id
        ))
        .map_err(|e| StoreError::configuration(format!("firestore url: {}", e)))?;
        if documents_url.cannot_be_a_base() {
            return Err(StoreError::configuration("firestore url cannot take a path"));
        }

        Ok(Self {
            client,
            documents_url,
            token,
        })
    }

    /// URL of one document. The id is always a single path segment.
    fn document_url(&self, collection: &str, id: &str) -> StoreResult<Url> {
        validate_document_id(id)?;
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::configuration("firestore url cannot take a path"))?
            .push(collection)
            .push(id);
        Ok(url)
    }

    /// Fields of a document, `None` on 404
    async fn get_fields(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        let url = self.document_url(collection, id)?;
        trace!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let document: Value = serde_json::from_str(&response.text().await?)?;
        Ok(Some(document.get("fields").cloned().unwrap_or(Value::Null)))
    }
}

/// Firestore document ids cannot contain `/` or be `.` or `..`; escapes
/// are refused too so the server never decodes one into a dot segment
fn validate_document_id(id: &str) -> StoreResult<()> {
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.chars().any(|c| matches!(c, '/' | '\\' | '%') || c.is_control());
    if invalid {
        return Err(StoreError::query(format!("invalid document id {:?}", id)));
    }
    Ok(())
}

/// Numeric Firestore value (`doubleValue` or string-encoded `integerValue`)
fn number(value: &Value) -> Option<f64> {
    if let Some(v) = value.get("doubleValue").and_then(Value::as_f64) {
        return Some(v);
    }
    match value.get("integerValue")? {
        Value::String(s) => s.parse().ok(),
        other => other.as_f64(),
    }
}

pub(crate) fn parse_polygon(fields: &Value) -> StoreResult<Option<Geofence>> {
    let Some(values) = fields
        .pointer("/polygon/arrayValue/values")
        .and_then(Value::as_array)
    else {
        return Ok(None);
    };

    let mut pairs = Vec::with_capacity(values.len());
    for (i, entry) in values.iter().enumerate() {
        let point = entry
            .pointer("/mapValue/fields")
            .ok_or_else(|| StoreError::malformed(format!("polygon[{}] is not a map", i)))?;
        let x = point.get("x").and_then(number);
        let y = point.get("y").and_then(number);
        match (x, y) {
            (Some(x), Some(y)) => pairs.push((x, y)),
            _ => return Err(StoreError::malformed(format!("polygon[{}] lacks numeric x/y", i))),
        }
    }
    Ok(geofence_from_pairs(pairs))
}

pub(crate) fn parse_alert_enabled(fields: &Value) -> bool {
    fields
        .pointer("/alertEnabled/booleanValue")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[async_trait]
impl ZoneStore for FirestoreStore {
    async fn fetch_geofence(&self, user: &UserId) -> StoreResult<Option<Geofence>> {
        let geofence = match self.get_fields("safezones", user.as_str()).await? {
            Some(fields) => parse_polygon(&fields)?,
            None => None,
        };
        debug!(
            "Safe zone for {}: {}",
            user,
            geofence.as_ref().map(|g| format!("{} points", g.len())).unwrap_or_else(|| "none".into())
        );
        Ok(geofence)
    }

    async fn fetch_alert_enabled(&self, user: &UserId) -> StoreResult<bool> {
        Ok(self
            .get_fields("users", user.as_str())
            .await?
            .map(|fields| parse_alert_enabled(&fields))
            .unwrap_or(false))
    }

    fn backend(&self) -> &'static str {
        "firestore"
    }
}
