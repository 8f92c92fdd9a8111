//! # Sight Tracker - Pipeline Orchestration
//!
//! Runs the DogSight frame pipeline as two cooperating tasks.
//! A capture task fills a latest-wins buffer; a processing task drains it.
//!
//! ## Features
//! - Detection and encoding cadences on a process-lifetime frame counter
//! - Per-user safe zone and alert flag caching with independent refresh
//! - Geofence containment of surfaced tracks
//! - Cooldown-gated alert dispatch
//! - Fan-out of frame records and annotated JPEGs to serving clients

pub mod alert;
pub mod buffer;
pub mod cadence;
pub mod capture;
pub mod config;
pub mod error;
pub mod fps;
pub mod hub;
pub mod pipeline;
pub mod status;
pub mod zone;

pub use alert::{AlertDispatcher, AlertGate, DispatchOutcome};
pub use buffer::{FrameBuffer, FrameSnapshot};
pub use cadence::{Cadence, FrameTick};
pub use capture::{run_capture, spawn_capture, CaptureStats};
pub use config::PipelineConfig;
pub use error::{TrackerError, TrackerResult};
pub use fps::FpsMeter;
pub use hub::{ClientInfo, ClientKind, JpegFrame, OutputHub};
pub use pipeline::{spawn_processing, FrameOutcome, PipelineParts, ProcessingTask};
pub use status::{PipelineStatus, StatusHandle, UserBinding};
pub use zone::{GeofencePolicy, RefreshTimer, ZoneCache};
