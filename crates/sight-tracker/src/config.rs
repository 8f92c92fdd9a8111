//! Pipeline configuration

use crate::{TrackerError, TrackerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cadence, timer and alert settings for the processing task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run the model on every Nth frame
    pub detect_interval: u64,
    /// Encode and attach an image on every Nth frame
    pub frame_send_interval: u64,
    pub jpeg_quality: u8,
    pub inference_timeout_ms: u64,
    /// Pause after the source reports no frame
    pub capture_retry_ms: u64,
    pub geofence_refresh_secs: u64,
    pub alert_flag_refresh_secs: u64,
    /// Minimum spacing between alerts, across all tracks
    pub alert_cooldown_secs: u64,
    pub alert_message: String,
    /// Weight of the newest sample in the FPS estimate
    pub fps_smoothing: f64,
    /// Frame records buffered per event subscriber
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detect_interval: 3,
            frame_send_interval: 2,
            jpeg_quality: 75,
            inference_timeout_ms: 5000,
            capture_retry_ms: 100,
            geofence_refresh_secs: 10,
            alert_flag_refresh_secs: 5,
            alert_cooldown_secs: 120,
            alert_message: "🚨 Your dog has left the safe zone!".to_string(),
            fps_smoothing: 0.1,
            event_capacity: 64,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> TrackerResult<()> {
        if self.detect_interval == 0 {
            return Err(TrackerError::invalid_config("pipeline.detect_interval must be >= 1"));
        }
        if self.frame_send_interval == 0 {
            return Err(TrackerError::invalid_config("pipeline.frame_send_interval must be >= 1"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(TrackerError::invalid_config(format!(
                "pipeline.jpeg_quality must be in 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if !(self.fps_smoothing > 0.0 && self.fps_smoothing <= 1.0) {
            return Err(TrackerError::invalid_config("pipeline.fps_smoothing must be in (0, 1]"));
        }
        if self.event_capacity == 0 {
            return Err(TrackerError::invalid_config("pipeline.event_capacity must be >= 1"));
        }
        Ok(())
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn capture_retry(&self) -> Duration {
        Duration::from_millis(self.capture_retry_ms)
    }

    pub fn geofence_refresh(&self) -> Duration {
        Duration::from_secs(self.geofence_refresh_secs)
    }

    pub fn alert_flag_refresh(&self) -> Duration {
        Duration::from_secs(self.alert_flag_refresh_secs)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.alert_cooldown(), Duration::from_secs(120));
        assert_eq!(config.capture_retry(), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let config = PipelineConfig {
            detect_interval: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(TrackerError::InvalidConfig(_))));

        let config = PipelineConfig {
            jpeg_quality: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
