//! # Sight Core
//!
//! Core domain models for the DogSight detection pipeline.
//! This crate provides the shared types used by the vision, tracking,
//! store and API crates: detections, tracks, geofences, output records
//! and the clock abstraction the timers are driven by.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod clock;
pub mod error;
pub mod events;
pub mod geo;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use events::*;
pub use geo::*;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Owner of a geofence and alert preferences in the document store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Process-unique track identity, allocated in increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Object class label as reported by the vision model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassLabel(pub String);

impl ClassLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Label with a leading capital, for status text
    pub fn title(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClassLabel {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// DETECTION MODELS
// ============================================================================

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Validated constructor for boxes arriving from collaborators
    pub fn try_new(x1: f64, y1: f64, x2: f64, y2: f64) -> CoreResult<Self> {
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        if !finite || x1 > x2 || y1 > y2 {
            return Err(CoreError::invalid_box(x1, y1, x2, y2));
        }
        Ok(Self::new(x1, y1, x2, y2))
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        geo::iou(self, other)
    }

    /// Exponential moving average toward `observed`, component-wise:
    /// `self * (1 - alpha) + observed * alpha`
    pub fn blend(&self, observed: &BoundingBox, alpha: f64) -> BoundingBox {
        let mix = |old: f64, new: f64| old * (1.0 - alpha) + new * alpha;
        BoundingBox::new(
            mix(self.x1, observed.x1),
            mix(self.y1, observed.y1),
            mix(self.x2, observed.x2),
            mix(self.y2, observed.y2),
        )
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// One object reported by the vision model for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: ClassLabel,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: impl Into<ClassLabel>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            class: class.into(),
            confidence,
            bbox,
        }
    }
}

// ============================================================================
// TRACK MODELS
// ============================================================================

/// A persistent identity assigned to temporally matched detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub class: ClassLabel,
    /// Smoothed geometry
    pub bbox: BoundingBox,
    /// Observed or decayed confidence
    pub confidence: f64,
    /// Frames matched since creation
    pub hits: u32,
    /// Consecutive frames since the last match
    pub age: u32,
}

impl Track {
    /// Start a track from an unmatched detection
    pub fn from_detection(id: TrackId, detection: &Detection) -> Self {
        Self {
            id,
            class: detection.class.clone(),
            bbox: detection.bbox,
            confidence: detection.confidence,
            hits: 1,
            age: 0,
        }
    }

    pub fn area(&self) -> f64 {
        self.bbox.area()
    }

    pub fn center(&self) -> (f64, f64) {
        self.bbox.center()
    }
}

/// A surfaced track together with its geofence status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackView {
    pub track: Track,
    pub outside_zone: bool,
}

// ============================================================================
// TESTS
// ============================================================================
