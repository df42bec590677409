//! Fleet Pulse users server
//!
//! Serves the users API over HTTP on top of PostgreSQL.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use fleet_pulse_users::auth::{AccessTokenCodec, AuthService, InviteTokenCodec, PasswordHasher};
use fleet_pulse_users::config::Config;
use fleet_pulse_users::db::{self, PgStore};
use fleet_pulse_users::routes;
use fleet_pulse_users::state::AppState;
use fleet_pulse_users::users::{LogInviteDelivery, UserService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting users service");

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;
    let store = PgStore::new(pool);

    let auth = &config.auth;
    let hasher = PasswordHasher::new(auth.password_hash_cost);
    let access_tokens = Arc::new(AccessTokenCodec::new(&auth.jwt_secret));
    let invites = Arc::new(InviteTokenCodec::new(
        &auth.invite_secret,
        auth.invite_token_ttl(),
    ));

    let auth_service = Arc::new(AuthService::new(
        store.clone(),
        hasher,
        access_tokens,
        auth.access_token_ttl(),
        auth.refresh_token_ttl(),
    ));
    let user_service = Arc::new(UserService::new(
        store.clone(),
        hasher,
        invites,
        Arc::new(LogInviteDelivery),
    ));

    let app_state = AppState::new(auth_service, user_service, store);

    let app = routes::build_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
