//! # DogSight Detection Server
//!
//! Main entry point. Wires the video source, the remote vision model, the
//! zone store and the alert relay into the capture and processing tasks,
//! then serves the live output over HTTP until Ctrl+C or SIGTERM.

mod config;
mod error;
mod handlers;
mod routes;
mod state;

use crate::config::AppConfig;
use crate::routes::create_router;
use crate::state::AppState;

use sight_core::{SystemClock, UserId};
use sight_cv::{open_source, CvEngine, CvResult, HttpDetector, VideoSource};
use sight_store::{build_relay, build_store, AlertRelay, ZoneStore};
use sight_telemetry::MetricsCollector;
use sight_tracker::{
    spawn_capture, spawn_processing, FrameBuffer, OutputHub, PipelineParts, ProcessingTask,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Process exit statuses for fatal startup failures
const EXIT_CONFIG: u8 = 2;
const EXIT_SOURCE: u8 = 3;
const EXIT_MODEL: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_logging();

    info!("🐕 Starting DogSight detection server v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Load configuration
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Configuration error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    info!("Configuration loaded");
    info!("   Bind address: {}", config.server.bind);
    info!("   Detector: {}", config.detector.endpoint);
    info!("   Source: {:?}", config.source.kind);
    info!(
        "   Cadence: detect every {} frames, send every {} frames",
        config.pipeline.detect_interval, config.pipeline.frame_send_interval
    );

    let collaborators = match Collaborators::connect(&config).await {
        Ok(collaborators) => collaborators,
        Err((code, e)) => {
            error!("❌ {:#}", e);
            return ExitCode::from(code);
        }
    };

    match run(config, collaborators).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Server error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// External collaborators opened at startup
struct Collaborators {
    source: Box<dyn VideoSource>,
    detector: HttpDetector,
    store: Arc<dyn ZoneStore>,
    relay: Arc<dyn AlertRelay>,
}

impl Collaborators {
    /// Open everything the pipeline depends on. Failures carry the exit
    /// status they map to.
    async fn connect(config: &AppConfig) -> Result<Self, (u8, anyhow::Error)> {
        let store = build_store(&config.store).map_err(|e| {
            (EXIT_CONFIG, anyhow::Error::new(e).context("Zone store configuration error"))
        })?;
        let relay = build_relay(&config.relay).map_err(|e| {
            (EXIT_CONFIG, anyhow::Error::new(e).context("Alert relay configuration error"))
        })?;

        let source = open_source(&config.source)
            .map_err(|e| (EXIT_SOURCE, anyhow::Error::new(e).context("Could not open video source")))?;

        let detector = connect_detector(config)
            .await
            .map_err(|e| (EXIT_MODEL, anyhow::Error::new(e).context("Vision model unavailable")))?;
        info!("🧠 Vision model ready at {}", detector.endpoint());

        Ok(Self {
            source,
            detector,
            store,
            relay,
        })
    }
}

async fn run(config: AppConfig, collaborators: Collaborators) -> anyhow::Result<()> {
    let Collaborators {
        source,
        detector,
        store,
        relay,
    } = collaborators;

    let engine = Arc::new(CvEngine::with_config(config.cv_config())?);
    let metrics = Arc::new(MetricsCollector::new()?);
    let hub = Arc::new(OutputHub::new(config.pipeline.event_capacity));
    let buffer = Arc::new(FrameBuffer::new());
    let shutdown = CancellationToken::new();

    let task = ProcessingTask::new(
        config.pipeline.clone(),
        PipelineParts {
            engine,
            detector: Arc::new(detector),
            store,
            relay,
            hub: hub.clone(),
            metrics: metrics.clone(),
            clock: Arc::new(SystemClock),
        },
    )?;
    let users = task.users();
    if let Some(uid) = &config.user_id {
        users.set(Some(UserId::new(uid.trim())));
    }
    let status = task.status();

    // Background tasks
    let capture = spawn_capture(
        source,
        buffer.clone(),
        config.pipeline.capture_retry(),
        shutdown.clone(),
        metrics.clone(),
    );
    let processing = spawn_processing(task, buffer.clone(), shutdown.clone());

    let bind = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config),
        hub,
        buffer,
        status,
        users,
        metrics,
        shutdown: shutdown.clone(),
    };
    let app = create_router(state);

    let listener = TcpListener::bind(&bind).await?;
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("🚀 Server listening on http://{}", bind);
    info!("   MJPEG stream at http://{}/stream", bind);
    info!("   Event stream at ws://{}/events", bind);
    info!("   Metrics at http://{}/metrics", bind);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_token.cancel();
        })
        .await?;

    // The server can also stop on its own; the tasks follow it down
    shutdown.cancel();
    let captured = capture.await?;
    let processed = processing.await?;

    info!(
        "🛑 Shutdown complete: {} frames captured, {} processed",
        captured.frames, processed
    );
    Ok(())
}

/// Build the HTTP detector and check the model server answers
async fn connect_detector(config: &AppConfig) -> CvResult<HttpDetector> {
    let detector = HttpDetector::new(
        config.detector.endpoint.as_str(),
        config.detector_timeout(),
        config.pipeline.jpeg_quality,
    )?;
    detector.probe().await?;
    Ok(detector)
}

/// Initialize logging with tracing
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sight_api=debug,sight_tracker=debug"));

    let json = std::env::var("SIGHT_LOG_JSON")
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    }
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }
}
