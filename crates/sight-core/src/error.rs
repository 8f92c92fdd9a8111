//! Error types for the core domain

use thiserror::Error;

/// Core error type shared by the pipeline crates
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid bounding box: ({x1}, {y1}, {x2}, {y2})")]
    InvalidBox { x1: f64, y1: f64, x2: f64, y2: f64 },

    #[error("Invalid geofence: {0}")]
    InvalidGeofence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn invalid_box(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::InvalidBox { x1, y1, x2, y2 }
    }

    pub fn invalid_geofence(msg: impl Into<String>) -> Self {
        Self::InvalidGeofence(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
