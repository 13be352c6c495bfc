//! API Server

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
    security::RateLimiter,
};
use crate::config::ApiConfig;
use crate::service::WageringService;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Router with the full middleware stack
pub fn build_app(state: Arc<AppState>, config: &ApiConfig) -> axum::Router {
    create_router(state)
        // Request ID middleware (first for tracing)
        .layer(axum::middleware::from_fn(request_id_middleware))
        // CORS layer (before timeout to handle preflight)
        .layer(create_cors_layer(config.allowed_origins.clone()))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        // Tracing layer (last for complete request tracing)
        .layer(TraceLayer::new_for_http())
}

pub struct ApiServer {
    config: ApiConfig,
    service: Arc<WageringService>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, service: Arc<WageringService>) -> Self {
        Self { config, service }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.socket_addr()?;
        let state = Arc::new(AppState::new(
            self.service.clone(),
            self.config.trust_forwarded_for,
        ));
        let cleanup = RateLimiter::start_cleanup_task(state.limiter.clone());
        let app = build_app(state, &self.config);

        if self.config.allowed_origins.iter().any(|o| o == "*") {
            warn!("CORS allows any origin");
        }
        if !self.service.limits().accept_reported_wins {
            info!("client-reported wins disabled, only server spins settle rounds");
        }
        info!(
            listen = %addr,
            games = self.service.catalog().len(),
            timeout_secs = self.config.request_timeout_secs,
            "wagering API listening"
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        cleanup.abort();
        info!("API server stopped gracefully");
        Ok(())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
