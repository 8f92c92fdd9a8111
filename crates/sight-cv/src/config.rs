//! Configuration for the CV module

use crate::{CvError, CvResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the CV engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CvConfig {
    /// Association and track lifecycle settings
    pub tracking: TrackingConfig,
    /// Detection pre-filter applied before association
    pub filter: DetectionFilterConfig,
    /// Overlay rendering settings
    pub rendering: RenderingConfig,
}

impl CvConfig {
    pub fn validate(&self) -> CvResult<()> {
        self.tracking.validate()?;
        self.filter.validate()?;
        self.rendering.validate()
    }
}

/// Tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Minimum IoU for a detection to continue an existing track
    pub iou_match_threshold: f64,
    /// EMA weight given to the new observation, in (0, 1]
    pub ema_alpha: f64,
    /// Confidence multiplier applied to every unmatched track
    pub decay_factor: f64,
    /// Tracks at or below this confidence are dropped
    pub min_confidence_keep: f64,
    /// Consecutive misses tolerated before a track is dropped
    pub max_age: u32,
    /// Hits required before a track is exposed
    pub min_hits_output: u32,
    /// Minimum box area (px²) before a track is exposed
    pub min_area_output: f64,
    /// Upper bound on live tracks; extra detections do not open tracks
    pub max_tracks: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            iou_match_threshold: 0.3,
            ema_alpha: 0.6,
            decay_factor: 0.88,
            min_confidence_keep: 0.25,
            max_age: 5,
            min_hits_output: 3,
            min_area_output: 400.0,
            max_tracks: 64,
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> CvResult<()> {
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(CvError::invalid_config(format!(
                "tracking.ema_alpha must be in (0, 1], got {}",
                self.ema_alpha
            )));
        }
        if !(self.decay_factor > 0.0 && self.decay_factor < 1.0) {
            return Err(CvError::invalid_config(format!(
                "tracking.decay_factor must be in (0, 1), got {}",
                self.decay_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_match_threshold) {
            return Err(CvError::invalid_config(format!(
                "tracking.iou_match_threshold must be in [0, 1], got {}",
                self.iou_match_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence_keep) {
            return Err(CvError::invalid_config(format!(
                "tracking.min_confidence_keep must be in [0, 1], got {}",
                self.min_confidence_keep
            )));
        }
        if !(self.min_area_output >= 0.0) {
            return Err(CvError::invalid_config("tracking.min_area_output must be >= 0"));
        }
        if self.max_tracks == 0 {
            return Err(CvError::invalid_config("tracking.max_tracks must be >= 1"));
        }
        Ok(())
    }
}

/// Which detections reach the tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFilterConfig {
    /// Accepted class labels; empty accepts every class
    pub classes: Vec<String>,
    /// Detections must be strictly above this confidence
    pub min_confidence: f64,
}

impl Default for DetectionFilterConfig {
    fn default() -> Self {
        Self {
            classes: vec!["dog".to_string()],
            min_confidence: 0.5,
        }
    }
}

impl DetectionFilterConfig {
    pub fn validate(&self) -> CvResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CvError::invalid_config(format!(
                "filter.min_confidence must be in [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

/// Rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderingConfig {
    /// Draw the geofence fill and border
    pub draw_zone: bool,
    /// Draw track boxes and center markers
    pub draw_tracks: bool,
    /// Draw label and status text (needs `font_path`)
    pub draw_text: bool,
    /// Opacity of the geofence fill
    pub zone_opacity: f32,
    /// Box border thickness in pixels
    pub box_thickness: u32,
    /// Center marker radius in pixels
    pub center_radius: i32,
    /// TrueType font used for labels
    pub font_path: Option<PathBuf>,
    /// Text height in pixels
    pub font_size: f32,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            draw_zone: true,
            draw_tracks: true,
            draw_text: true,
            zone_opacity: 0.15,
            box_thickness: 2,
            center_radius: 5,
            font_path: None,
            font_size: 20.0,
        }
    }
}

impl RenderingConfig {
    pub fn validate(&self) -> CvResult<()> {
        if !(0.0..=1.0).contains(&self.zone_opacity) {
            return Err(CvError::invalid_config(format!(
                "rendering.zone_opacity must be in [0, 1], got {}",
                self.zone_opacity
            )));
        }
        if self.box_thickness == 0 {
            return Err(CvError::invalid_config("rendering.box_thickness must be >= 1"));
        }
        Ok(())
    }
}
