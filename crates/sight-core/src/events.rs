//! Output records for the serving collaborators
//!
//! One `FrameRecord` is produced per processed frame and pushed to JSON
//! subscribers; numeric fields are rounded here so every consumer sees
//! the same values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TrackView;

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// A surfaced track as exposed on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: u64,
    pub class: String,
    /// Rounded to 3 decimals
    pub confidence: f64,
    pub hits: u32,
    /// Rounded to 1 decimal
    pub area: f64,
    /// `[x1, y1, x2, y2]`, each rounded to 1 decimal
    pub bbox: [f64; 4],
    pub outside_zone: bool,
}

impl From<&TrackView> for TrackRecord {
    fn from(view: &TrackView) -> Self {
        let track = &view.track;
        Self {
            id: track.id.0,
            class: track.class.0.clone(),
            confidence: round_to(track.confidence, 3),
            hits: track.hits,
            area: round_to(track.area(), 1),
            bbox: track.bbox.to_array().map(|v| round_to(v, 1)),
            outside_zone: view.outside_zone,
        }
    }
}

/// Per-frame JSON record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_index: u64,
    pub timestamp: DateTime<Utc>,
    pub tracks: Vec<TrackRecord>,
    pub fps: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Any surfaced track is outside the safe zone
    pub outside_zone: bool,
    /// Base64 JPEG, present only on frames where the send cadence fired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl FrameRecord {
    pub fn from_views(
        frame_index: u64,
        timestamp: DateTime<Utc>,
        views: &[TrackView],
        fps: f64,
        frame_size: (u32, u32),
    ) -> Self {
        Self {
            frame_index,
            timestamp,
            tracks: views.iter().map(TrackRecord::from).collect(),
            fps: round_to(fps, 1),
            frame_width: frame_size.0,
            frame_height: frame_size.1,
            outside_zone: views.iter().any(|v| v.outside_zone),
            image: None,
        }
    }

    pub fn with_image(mut self, image: String) -> Self {
        self.image = Some(image);
        self
    }

    /// Copy of the record without the image payload
    pub fn without_image(&self) -> Self {
        Self {
            image: None,
            ..self.clone()
        }
    }

    pub fn to_json(&self) -> crate::CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoundingBox, ClassLabel, Track, TrackId};

    fn view() -> TrackView {
        TrackView {
            track: Track {
                id: TrackId(4),
                class: ClassLabel::new("dog"),
                bbox: BoundingBox::new(10.04, 10.06, 50.12, 49.96),
                confidence: 0.876_54,
                hits: 5,
                age: 1,
            },
            outside_zone: true,
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.876_54, 3), 0.877);
        assert_eq!(round_to(1603.249, 1), 1603.2);
        assert_eq!(round_to(-2.25, 0), -2.0);
    }

    #[test]
    fn test_track_record_rounding() {
        let record = TrackRecord::from(&view());
        assert_eq!(record.id, 4);
        assert_eq!(record.confidence, 0.877);
        assert_eq!(record.bbox, [10.0, 10.1, 50.1, 50.0]);
        assert_eq!(record.area, round_to(40.08 * 39.9, 1));
        assert!(record.outside_zone);
    }

    #[test]
    fn test_frame_record_json() {
        let record = FrameRecord::from_views(12, Utc::now(), &[view()], 14.26, (640, 480));
        assert!(record.outside_zone);
        assert_eq!(record.fps, 14.3);

        let json = record.to_json().unwrap();
        assert!(json.contains("\"frame_index\":12"));
        assert!(!json.contains("\"image\""));

        let with_image = record.with_image("aGVsbG8=".into());
        assert!(with_image.to_json().unwrap().contains("aGVsbG8="));
        assert!(with_image.without_image().image.is_none());
    }
}
