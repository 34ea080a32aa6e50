//! QC camera server: live MJPEG preview plus exclusive full-resolution capture

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::Result;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use qccam::instance::{ensure_single_instance, PidFile};
use qccam::{capture, server, CameraContext, Config, CONFIG_PATH_ENV, SERVER_NAME};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("qccam=debug,tower_http=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("{} launching...", SERVER_NAME);

    // Load configuration
    let config_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    if let Err(e) = ensure_single_instance(config.server.port) {
        error!("{}", e);
        return Err(e.into());
    }
    let pid_file = PidFile::create(&config.server.pid_file)?;

    // Device probing loads vendor libraries and opens V4L2 nodes
    let camera_config = config.camera.clone();
    let device = tokio::task::spawn_blocking(move || capture::open_best_device(&camera_config))
        .await?;
    if device.is_none() {
        warn!("Serving in no_camera state");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let ctx = Arc::new(CameraContext::new(config, device));
    let app = server::create_router(ctx.clone());

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    let stream_ctx = ctx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open MJPEG responses only complete once streaming stops
            if let Err(e) = tokio::task::spawn_blocking(move || stream_ctx.stop_streaming()).await {
                error!("Stopping stream failed: {}", e);
            }
        })
        .await?;

    tokio::task::spawn_blocking(move || ctx.shutdown()).await?;
    drop(pid_file);

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
