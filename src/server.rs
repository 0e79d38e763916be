use crate::client_id::ClientIdResolver;
use crate::config::Config;
use crate::config_validator::ConfigValidator;
use crate::error::{Error, Result};
use crate::generation::GeminiClient;
use crate::handlers::{consume, generate_reply, health_check, supported_tones, usage};
use crate::health::HealthChecker;
use crate::middleware::logging_middleware;
use crate::orchestrator::ReplyService;
use crate::usage_tracker::UsageTracker;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: ReplyService,
    pub health: Arc<HealthChecker>,
}

impl AppState {
    pub fn new(service: ReplyService) -> Self {
        let health = Arc::new(HealthChecker::new(service.clone()));
        Self { service, health }
    }
}

pub fn create_app(state: AppState) -> Router {
    let email = Router::new()
        .route("/generate-reply", post(generate_reply))
        .route("/usage", get(usage))
        .route("/supported-tones", get(supported_tones))
        .route("/health", get(health_check));

    let rate_limit = Router::new()
        .route("/check", get(usage))
        .route("/consume", post(consume))
        .route("/status", get(usage));

    Router::new()
        .nest("/api/email", email)
        .nest("/api/rate-limit", rate_limit)
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(state.clone(), logging_middleware)),
        )
        .with_state(state)
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
    tracker: Arc<UsageTracker>,
    cleanup_interval: Duration,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        let tracker = Arc::new(UsageTracker::new(config.quota_policy()));
        let generator = Arc::new(GeminiClient::new(config.provider_settings())?);
        let service = ReplyService::new(ClientIdResolver::new(), tracker.clone(), generator);

        Ok(Self {
            app: create_app(AppState::new(service)),
            bind_addr: config.bind_addr,
            tracker,
            cleanup_interval: config.cleanup_interval(),
        })
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind {}: {}", self.bind_addr, e)))?;

        tracing::info!("Reply service starting on {}", self.bind_addr);
        tracing::info!("Health check available at /health");

        let cleanup = tokio::spawn(cleanup_loop(self.tracker.clone(), self.cleanup_interval));

        // Run server with graceful shutdown
        let served = axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        cleanup.abort();
        served.map_err(|e| Error::Internal(format!("Server error: {}", e)))
    }
}

/// Periodically evicts usage records past retention.
pub async fn cleanup_loop(tracker: Arc<UsageTracker>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        let removed = tracker.cleanup();
        tracing::debug!(removed, remaining = tracker.tracked_identifiers(), "Usage cleanup finished");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
