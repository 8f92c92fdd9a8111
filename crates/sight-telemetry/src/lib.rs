//! # Sight Telemetry - Metrics
//!
//! Prometheus metrics for the DogSight pipeline.
//! Provides real-time metrics for:
//! - Capture and processing throughput
//! - Model inference runs and failures
//! - Live and surfaced tracks
//! - Alert outcomes and store lookups
//! - Stream and event subscribers

use prometheus::{
    Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use tracing::info;

/// Metrics collector for the detection pipeline
pub struct MetricsCollector {
    registry: Registry,

    // Capture
    frames_captured: IntCounter,
    capture_misses: IntCounter,

    // Processing
    frames_processed: IntCounter,
    frame_errors: IntCounter,
    processing_time: Histogram,
    fps: Gauge,

    // Inference
    inference_runs: IntCounter,
    inference_failures: IntCounter,
    inference_time: Histogram,
    detections_total: IntCounter,

    // Tracks
    tracks_live: IntGauge,
    tracks_surfaced: IntGauge,
    tracks_outside: IntGauge,

    // Alerts and lookups
    alerts_total: IntCounterVec,
    store_fetch_failures: IntCounterVec,

    // Serving
    stream_clients: IntGauge,
    event_clients: IntGauge,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let frames_captured = IntCounter::new("dogsight_frames_captured_total", "Frames read from the video source")?;
        registry.register(Box::new(frames_captured.clone()))?;

        let capture_misses = IntCounter::new(
            "dogsight_capture_misses_total",
            "Reads where the video source had no frame",
        )?;
        registry.register(Box::new(capture_misses.clone()))?;

        let frames_processed = IntCounter::new("dogsight_frames_processed_total", "Frames run through the pipeline")?;
        registry.register(Box::new(frames_processed.clone()))?;

        let frame_errors = IntCounter::new(
            "dogsight_frame_errors_total",
            "Frames with a failed processing or encoding step",
        )?;
        registry.register(Box::new(frame_errors.clone()))?;

        let processing_time = Histogram::with_opts(
            HistogramOpts::new("dogsight_processing_seconds", "Per-frame processing time")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(processing_time.clone()))?;

        let fps = Gauge::new("dogsight_fps", "Smoothed processing frame rate")?;
        registry.register(Box::new(fps.clone()))?;

        let inference_runs = IntCounter::new("dogsight_inference_runs_total", "Vision model invocations")?;
        registry.register(Box::new(inference_runs.clone()))?;

        let inference_failures = IntCounter::new(
            "dogsight_inference_failures_total",
            "Vision model invocations that failed or timed out",
        )?;
        registry.register(Box::new(inference_failures.clone()))?;

        let inference_time = Histogram::with_opts(
            HistogramOpts::new("dogsight_inference_seconds", "Vision model latency")
                .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(inference_time.clone()))?;

        let detections_total = IntCounter::new(
            "dogsight_detections_total",
            "Detections returned by the vision model",
        )?;
        registry.register(Box::new(detections_total.clone()))?;

        let tracks_live = IntGauge::new("dogsight_tracks_live", "Tracks in the store")?;
        registry.register(Box::new(tracks_live.clone()))?;

        let tracks_surfaced = IntGauge::new("dogsight_tracks_surfaced", "Tracks passing the output gate")?;
        registry.register(Box::new(tracks_surfaced.clone()))?;

        let tracks_outside = IntGauge::new("dogsight_tracks_outside_zone", "Surfaced tracks outside the safe zone")?;
        registry.register(Box::new(tracks_outside.clone()))?;

        let alerts_total = IntCounterVec::new(
            Opts::new("dogsight_alerts_total", "Alert attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(alerts_total.clone()))?;

        let store_fetch_failures = IntCounterVec::new(
            Opts::new("dogsight_store_fetch_failures_total", "Failed document store lookups"),
            &["lookup"],
        )?;
        registry.register(Box::new(store_fetch_failures.clone()))?;

        let stream_clients = IntGauge::new("dogsight_stream_clients", "Connected MJPEG viewers")?;
        registry.register(Box::new(stream_clients.clone()))?;

        let event_clients = IntGauge::new("dogsight_event_clients", "Connected event subscribers")?;
        registry.register(Box::new(event_clients.clone()))?;

        info!("📊 Metrics collector initialized");

        Ok(Self {
            registry,
            frames_captured,
            capture_misses,
            frames_processed,
            frame_errors,
            processing_time,
            fps,
            inference_runs,
            inference_failures,
            inference_time,
            detections_total,
            tracks_live,
            tracks_surfaced,
            tracks_outside,
            alerts_total,
            store_fetch_failures,
            stream_clients,
            event_clients,
        })
    }

    /// Get Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    // ========================================================================
    // CAPTURE METRICS
    // ========================================================================

    pub fn record_capture(&self) {
        self.frames_captured.inc();
    }

    pub fn record_capture_miss(&self) {
        self.capture_misses.inc();
    }

    // ========================================================================
    // PIPELINE METRICS
    // ========================================================================

    /// Record a processed frame
    pub fn record_frame(&self, processing_time_secs: f64, fps: f64) {
        self.frames_processed.inc();
        self.processing_time.observe(processing_time_secs);
        self.fps.set(fps);
    }

    pub fn record_frame_error(&self) {
        self.frame_errors.inc();
    }

    /// Record a model invocation and how many detections it fed the tracker
    pub fn record_inference(&self, duration_secs: f64, detections: u64) {
        self.inference_runs.inc();
        self.inference_time.observe(duration_secs);
        self.detections_total.inc_by(detections);
    }

    pub fn record_inference_failure(&self) {
        self.inference_runs.inc();
        self.inference_failures.inc();
    }

    pub fn set_tracks(&self, live: usize, surfaced: usize, outside: usize) {
        self.tracks_live.set(live as i64);
        self.tracks_surfaced.set(surfaced as i64);
        self.tracks_outside.set(outside as i64);
    }

    // ========================================================================
    // ALERT & STORE METRICS
    // ========================================================================

    /// Record an alert attempt: `sent`, `suppressed` or `failed`
    pub fn record_alert(&self, outcome: &str) {
        self.alerts_total.with_label_values(&[outcome]).inc();
    }

    /// Record a failed lookup: `geofence` or `alert_flag`
    pub fn record_store_failure(&self, lookup: &str) {
        self.store_fetch_failures.with_label_values(&[lookup]).inc();
    }

    // ========================================================================
    // SERVING METRICS
    // ========================================================================

    pub fn set_stream_clients(&self, count: usize) {
        self.stream_clients.set(count as i64);
    }

    pub fn set_event_clients(&self, count: usize) {
        self.event_clients.set(count as i64);
    }

    // Readbacks for the health report and tests

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.get()
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.get()
    }

    pub fn frame_errors(&self) -> u64 {
        self.frame_errors.get()
    }

    pub fn inference_failures(&self) -> u64 {
        self.inference_failures.get()
    }

    pub fn alerts(&self, outcome: &str) -> u64 {
        self.alerts_total.with_label_values(&[outcome]).get()
    }

    pub fn store_failures(&self, lookup: &str) -> u64 {
        self.store_fetch_failures.with_label_values(&[lookup]).get()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = MetricsCollector::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_metrics_export() {
        let metrics = MetricsCollector::new().unwrap();

        metrics.record_frame(0.012, 14.5);
        metrics.set_tracks(3, 1, 1);
        metrics.record_alert("sent");
        metrics.record_store_failure("geofence");

        let export = metrics.export().unwrap();
        assert!(export.contains("dogsight_frames_processed_total 1"));
        assert!(export.contains("dogsight_tracks_live 3"));
        assert!(export.contains("dogsight_alerts_total{outcome=\"sent\"} 1"));
        assert!(export.contains("dogsight_store_fetch_failures_total{lookup=\"geofence\"} 1"));
    }

    #[test]
    fn test_inference_counters() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_inference(0.05, 2);
        metrics.record_inference_failure();

        assert_eq!(metrics.inference_failures(), 1);
        let export = metrics.export().unwrap();
        assert!(export.contains("dogsight_inference_runs_total 2"));
        assert!(export.contains("dogsight_detections_total 2"));
    }

    #[test]
    fn test_collectors_are_independent() {
        let a = MetricsCollector::new().unwrap();
        let b = MetricsCollector::new().unwrap();
        a.record_capture();
        assert_eq!(a.frames_captured(), 1);
        assert_eq!(b.frames_captured(), 0);
        assert_eq!(a.alerts("failed"), 0);
    }
}
