//! # Sight CV - Vision Module
//!
//! Turns raw per-frame detections into stable tracked objects.
//! Features:
//! - Class allow-list and confidence pre-filter
//! - Greedy per-class IoU association with EMA smoothing
//! - Miss-tolerant track aging and confidence decay
//! - Output gating on hits and box area
//! - Overlay rendering and JPEG encoding of annotated frames
//! - Seams for the vision model and the video source
//!
//! ## Association
//!
//! Every detection frame:
//! 1. Filters the model output
//! 2. Matches detections to same-class tracks in descending IoU order
//! 3. Blends matched geometry, opens new tracks, ages the rest
//! 4. Exposes only tracks that pass the output gate

pub mod codec;
pub mod config;
pub mod detector;
pub mod error;
pub mod renderer;
pub mod source;
pub mod tracker;

pub use codec::{encode_base64, encode_jpeg};
pub use config::{CvConfig, DetectionFilterConfig, RenderingConfig, TrackingConfig};
pub use detector::{DetectionFilter, HttpDetector, ObjectDetector};
pub use error::{CvError, CvResult};
pub use renderer::OverlayRenderer;
pub use source::{open_source, ImageDirSource, SourceConfig, SourceKind, SyntheticSource, VideoSource};
pub use tracker::{associate, is_surfaced, match_detections, IdAllocator, ObjectTracker};

#[cfg(feature = "opencv")]
pub use source::CameraSource;

use parking_lot::Mutex;
use sight_core::{Detection, Track};
use std::sync::Arc;
use tracing::{debug, info};

/// Coordinates filtering, association and rendering for the pipeline
pub struct CvEngine {
    config: CvConfig,
    filter: DetectionFilter,
    tracker: Arc<Mutex<ObjectTracker>>,
    renderer: OverlayRenderer,
}

impl CvEngine {
    /// Create a new CV engine with default configuration
    pub fn new() -> CvResult<Self> {
        Self::with_config(CvConfig::default())
    }

    /// Create a new CV engine with custom configuration
    pub fn with_config(config: CvConfig) -> CvResult<Self> {
        config.validate()?;
        info!("🎯 Initializing CV Engine with config: {:?}", config.tracking);

        let filter = DetectionFilter::new(&config.filter);
        let tracker = ObjectTracker::new(&config.tracking);
        let renderer = OverlayRenderer::new(&config.rendering)?;

        Ok(Self {
            config,
            filter,
            tracker: Arc::new(Mutex::new(tracker)),
            renderer,
        })
    }

    /// Filter one frame of model output, run association and return the
    /// surfaced tracks
    pub fn associate(&self, detections: Vec<Detection>) -> Vec<Track> {
        let detections = self.filter.apply(detections);
        debug!("Associating {} detections", detections.len());
        self.tracker.lock().update(&detections)
    }

    /// Tracks currently passing the output gate
    pub fn surfaced(&self) -> Vec<Track> {
        self.tracker.lock().surfaced()
    }

    pub fn total_tracks(&self) -> usize {
        self.tracker.lock().total_count()
    }

    pub fn surfaced_count(&self) -> usize {
        self.tracker.lock().surfaced_count()
    }

    pub fn renderer(&self) -> &OverlayRenderer {
        &self.renderer
    }

    pub fn config(&self) -> &CvConfig {
        &self.config
    }
}

// ============================================================================
// TESTS
// ============================================================================
