//! Health server
//!
//! Read-only HTTP surface over [`CertificationGateway::get_system_health`].
//! The certification operations themselves are a library API and are not
//! exposed here.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use certgate_core::{HealthServerSettings, OverallStatus, SystemHealth};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::services::CertificationGateway;

/// Build the health router
pub fn health_router(gateway: Arc<CertificationGateway>) -> Router {
    Router::new()
        .route("/health", get(system_health))
        .route("/health/live", get(live))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn system_health(
    State(gateway): State<Arc<CertificationGateway>>,
) -> (StatusCode, Json<SystemHealth>) {
    let health = gateway.get_system_health();
    debug!(score = health.health_score, "[Health] Snapshot served");
    let status = match health.overall_status {
        OverallStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        OverallStatus::Healthy | OverallStatus::Degraded => StatusCode::OK,
    };
    (status, Json(health))
}

async fn live() -> &'static str {
    "ok"
}

pub struct HealthServer {
    gateway: Arc<CertificationGateway>,
    addr: SocketAddr,
}

impl HealthServer {
    pub fn new(gateway: Arc<CertificationGateway>, addr: SocketAddr) -> Self {
        Self { gateway, addr }
    }

    pub fn from_settings(
        gateway: Arc<CertificationGateway>,
        settings: &HealthServerSettings,
    ) -> anyhow::Result<Self> {
        let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
        Ok(Self::new(gateway, addr))
    }

    /// Serve until `cancel` fires
    pub async fn serve(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        self.serve_on(listener, cancel).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(
        self,
        listener: tokio::net::TcpListener,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "[Health] Listening");
        axum::serve(listener, health_router(self.gateway))
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        info!("[Health] Stopped");
        Ok(())
    }
}
