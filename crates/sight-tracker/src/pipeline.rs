//! Processing task: one frame at a time through detection, association,
//! containment, alerting and output
//!
//! Per frame:
//! 1. Advance the cadence and pick up a user switch
//! 2. Refresh the cached zone state when its timers are due
//! 3. On detection frames, run the model and associate the result
//! 4. Evaluate the surfaced tracks against the safe zone
//! 5. Dispatch an alert if anything is outside
//! 6. Build the frame record, attaching an annotated JPEG on send frames
//!
//! A failed or slow model call counts as an empty detection list, so tracks
//! keep aging instead of freezing.

use crate::alert::{AlertDispatcher, DispatchOutcome};
use crate::buffer::{FrameBuffer, FrameSnapshot};
use crate::cadence::{Cadence, FrameTick};
use crate::fps::FpsMeter;
use crate::hub::OutputHub;
use crate::status::{PipelineStatus, StatusHandle, UserBinding};
use crate::zone::{GeofencePolicy, ZoneCache};
use crate::{PipelineConfig, TrackerResult};
use chrono::Utc;
use image::RgbImage;
use parking_lot::RwLock;
use sight_core::{Clock, Detection, FrameRecord, Track, TrackView, UserId};
use sight_cv::{encode_base64, encode_jpeg, CvEngine, CvError, ObjectDetector};
use sight_store::{AlertRelay, ZoneStore};
use sight_telemetry::MetricsCollector;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Collaborators the processing task is wired to
pub struct PipelineParts {
    pub engine: Arc<CvEngine>,
    pub detector: Arc<dyn ObjectDetector>,
    pub store: Arc<dyn ZoneStore>,
    pub relay: Arc<dyn AlertRelay>,
    pub hub: Arc<OutputHub>,
    pub metrics: Arc<MetricsCollector>,
    pub clock: Arc<dyn Clock>,
}

/// What happened to one frame
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub tick: FrameTick,
    pub views: Vec<TrackView>,
    pub alert: DispatchOutcome,
    /// A JPEG was produced and published for this frame
    pub encoded: bool,
}

pub struct ProcessingTask {
    config: PipelineConfig,
    engine: Arc<CvEngine>,
    detector: Arc<dyn ObjectDetector>,
    store: Arc<dyn ZoneStore>,
    hub: Arc<OutputHub>,
    metrics: Arc<MetricsCollector>,
    clock: Arc<dyn Clock>,
    dispatcher: AlertDispatcher,
    cadence: Cadence,
    zone: ZoneCache,
    fps: FpsMeter,
    surfaced: Vec<Track>,
    status: StatusHandle,
    users: UserBinding,
    user_rx: watch::Receiver<Option<UserId>>,
}

impl ProcessingTask {
    pub fn new(config: PipelineConfig, parts: PipelineParts) -> TrackerResult<Self> {
        config.validate()?;

        let (users, user_rx) = UserBinding::new();
        let status = Arc::new(RwLock::new(PipelineStatus {
            model_loaded: true,
            detector: parts.detector.name().to_string(),
            ..Default::default()
        }));

        Ok(Self {
            dispatcher: AlertDispatcher::new(
                parts.relay,
                config.alert_cooldown(),
                config.alert_message.clone(),
            ),
            cadence: Cadence::new(config.detect_interval, config.frame_send_interval),
            zone: ZoneCache::new(config.geofence_refresh(), config.alert_flag_refresh()),
            fps: FpsMeter::new(config.fps_smoothing),
            surfaced: Vec::new(),
            engine: parts.engine,
            detector: parts.detector,
            store: parts.store,
            hub: parts.hub,
            metrics: parts.metrics,
            clock: parts.clock,
            status,
            users,
            user_rx,
            config,
        })
    }

    /// Handle for switching the active user from outside the task
    pub fn users(&self) -> UserBinding {
        self.users.clone()
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Run one frame through the pipeline and publish its record
    pub async fn process_frame(&mut self, frame: FrameSnapshot) -> TrackerResult<FrameOutcome> {
        let started = Instant::now();
        let tick = self.cadence.advance();
        let now = self.clock.now();

        self.sync_user();
        self.zone.refresh(self.store.as_ref(), now, &self.metrics).await;
        let fps = self.fps.tick(now);

        let image = frame.image;
        let (width, height) = image.dimensions();

        if tick.run_detection {
            let detections = match self.detect(&image).await {
                Ok(detections) => detections,
                Err(e) => {
                    warn!("⚠️ Detection failed on frame {}: {}", tick.index, e);
                    self.metrics.record_inference_failure();
                    Vec::new()
                }
            };
            self.surfaced = self.engine.associate(detections);
        }

        let views = GeofencePolicy::evaluate(&self.surfaced, self.zone.geofence(), width, height);
        let outside = views.iter().filter(|v| v.outside_zone).count();

        let alert = self
            .dispatcher
            .dispatch(self.zone.user(), self.zone.alert_enabled(), outside > 0, now)
            .await;
        if let Some(label) = alert.label() {
            self.metrics.record_alert(label);
        }

        let mut record = FrameRecord::from_views(tick.index, Utc::now(), &views, fps, (width, height));
        let mut encoded = false;
        if tick.encode {
            // A frame that cannot be drawn still publishes its record
            match self.render(image, &views).await {
                Ok(jpeg) => {
                    record = record.with_image(encode_base64(&jpeg));
                    self.hub.publish_jpeg(jpeg);
                    encoded = true;
                }
                Err(e) => {
                    warn!("⚠️ Could not encode frame {}: {}", tick.index, e);
                    self.metrics.record_frame_error();
                }
            }
        }
        self.hub.publish_record(record);

        self.update_status(tick.index, fps, views.len());
        self.metrics.set_tracks(self.engine.total_tracks(), views.len(), outside);
        self.metrics.record_frame(started.elapsed().as_secs_f64(), fps);

        debug!(
            "Frame {}: {} surfaced, {} outside, alert {:?}",
            tick.index,
            views.len(),
            outside,
            alert
        );

        Ok(FrameOutcome {
            tick,
            views,
            alert,
            encoded,
        })
    }

    /// Process the newest buffered frame each time one arrives, until
    /// cancelled. Returns the number of frames processed.
    pub async fn run(mut self, buffer: Arc<FrameBuffer>, cancel: CancellationToken) -> u64 {
        info!("🧠 Processing started with detector {}", self.detector.name());
        let mut seen = 0;
        let mut processed = 0;

        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                frame = buffer.wait_for_newer(seen) => frame,
            };
            seen = frame.seq;

            match self.process_frame(frame).await {
                Ok(_) => processed += 1,
                Err(e) => {
                    warn!("⚠️ Error processing frame {}: {}", self.cadence.current(), e);
                    self.metrics.record_frame_error();
                }
            }
        }

        info!("🧠 Processing stopped after {} frames", processed);
        processed
    }

    /// Take a pending user switch, if any
    fn sync_user(&mut self) {
        if self.user_rx.has_changed().unwrap_or(false) {
            let user = self.user_rx.borrow_and_update().clone();
            self.zone.bind(user);
        }
    }

    async fn detect(&self, image: &RgbImage) -> TrackerResult<Vec<Detection>> {
        let timeout = self.config.inference_timeout();
        let started = Instant::now();

        let detections = tokio::time::timeout(timeout, self.detector.infer(image))
            .await
            .map_err(|_| CvError::InferenceTimeout(timeout.as_millis() as u64))??;

        self.metrics
            .record_inference(started.elapsed().as_secs_f64(), detections.len() as u64);
        Ok(detections)
    }

    /// Annotate and encode off the async runtime
    async fn render(&self, image: RgbImage, views: &[TrackView]) -> TrackerResult<Vec<u8>> {
        let renderer = self.engine.renderer().clone();
        let geofence = self.zone.geofence().cloned();
        let views = views.to_vec();
        let quality = self.config.jpeg_quality;

        let jpeg = tokio::task::spawn_blocking(move || {
            let mut image = image;
            renderer.annotate(&mut image, &views, geofence.as_ref());
            encode_jpeg(&image, quality)
        })
        .await??;
        Ok(jpeg)
    }

    fn update_status(&self, frame_index: u64, fps: f64, surfaced: usize) {
        let mut status = self.status.write();
        status.frame_index = frame_index;
        status.fps = fps;
        status.active_tracks = self.engine.total_tracks();
        status.surfaced_tracks = surfaced;
        status.safe_zone_defined = self.zone.geofence().is_some();
        status.alert_enabled = self.zone.alert_enabled();
        status.user_id = self.zone.user().map(|u| u.as_str().to_string());
        status.last_alert_at = self.dispatcher.last_sent_at();
    }
}

pub fn spawn_processing(
    task: ProcessingTask,
    buffer: Arc<FrameBuffer>,
    cancel: CancellationToken,
) -> JoinHandle<u64> {
    tokio::spawn(task.run(buffer, cancel))
}
