//! certgated - certification gateway daemon
//!
//! Loads settings from `CERTGATE_CONFIG`, keeps authority tokens fresh in the
//! background and serves the health surface until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use certgate_core::{EventBus, GatewayEvent, GatewaySettings};
use certgate_gateway::{CertificationGateway, HealthServer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CONFIG_ENV: &str = "CERTGATE_CONFIG";
const LOG_PREFIX: &str = "certgate";

/// Platform data directory, e.g. ~/.local/share/certgate on Linux
fn get_app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("certgate")
}

fn get_logs_dir() -> PathBuf {
    get_app_data_dir().join("logs")
}

/// Initialize tracing with console and file logging
///
/// - Console: colored, compact format
/// - File: daily rotation in the app data `logs/` directory
fn init_tracing() -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let logs_dir = get_logs_dir();
    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
    }

    // Creates files like: certgate.2026-01-22.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(&logs_dir)
        .context("failed to create log file appender")?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    // Crate names use underscores in tracing targets
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,certgate_core=debug,certgate_gateway=debug,certgated=debug")
    });

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _guard = init_tracing()?;

    let config_path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .with_context(|| format!("{} is not set", CONFIG_ENV))?;
    info!(path = %config_path.display(), "[Daemon] Loading settings");
    let settings = GatewaySettings::load(&config_path)
        .await
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let health_settings = settings.health.clone();

    let gateway = Arc::new(
        CertificationGateway::builder(settings)
            .with_events(bus.sender())
            .build()?,
    );

    let cancel = CancellationToken::new();
    let refresh = gateway.spawn_token_refresh(cancel.child_token());

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let server = HealthServer::from_settings(Arc::clone(&gateway), &health_settings)?;
    let server_cancel = cancel.child_token();
    let server = tokio::spawn(server.serve(server_cancel));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("[Daemon] Ctrl-C received, shutting down");

    gateway.shutdown();
    cancel.cancel();

    if let Err(e) = refresh.await {
        warn!(error = %e, "[Daemon] Token refresh task ended abnormally");
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "[Daemon] Health server failed"),
        Err(e) => error!(error = %e, "[Daemon] Health server task panicked"),
    }

    info!("[Daemon] Stopped");
    Ok(())
}

fn log_event(event: &GatewayEvent) {
    match event {
        GatewayEvent::CircuitOpened { .. } | GatewayEvent::TokenRefreshFailed { .. } => {
            warn!(event = ?event, "[Daemon] Gateway event")
        }
        _ => debug!(event = ?event, "[Daemon] Gateway event"),
    }
}
