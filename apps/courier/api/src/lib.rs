//! Courier API
//!
//! HTTP front end for outbound mail. Handlers queue documents; delivery
//! happens after the response has been written.
//!
//! ## Endpoints
//!
//! - `POST /api/notifications`: queue one HTML notification, answers `202`
//! - `GET /health`: liveness
//! - `GET /ready`: transport health

pub mod config;
pub mod handlers;
pub mod post_response;
pub mod state;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use config::CourierConfig;
use core_config::{tracing::init_tracing, Environment, FromEnv};
use domain_mail::{transport_from_env, Mailer};
use eyre::{Result, WrapErr};
use state::AppState;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/notifications", post(handlers::create_notification))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            post_response::deferred_delivery,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the courier API
///
/// 1. Sets up structured logging (JSON for production, pretty otherwise)
/// 2. Loads the listen address and mail settings from the environment
/// 3. Builds the transport selected by `MAIL_TRANSPORT`
/// 4. Serves until SIGTERM or Ctrl+C
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    init_tracing(&environment);

    let CourierConfig { listen, mail: settings } =
        CourierConfig::from_env().wrap_err("Failed to load courier configuration")?;
    let transport = transport_from_env().wrap_err("Failed to configure mail transport")?;

    info!(
        transport = transport.name(),
        site = %settings.site_name,
        from = %settings.from_address,
        "Mail delivery configured"
    );

    let state = AppState::new(Mailer::new(settings, transport));

    let listener = TcpListener::bind(listen)
        .await
        .wrap_err_with(|| format!("Failed to bind to {}", listen))?;
    info!(address = %listen, "Courier API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Server failed")?;

    info!("Courier API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal, shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM signal, shutting down gracefully"),
    }
}
