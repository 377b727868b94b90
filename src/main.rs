//! # Meeting Minutes Backend - Main Application Entry Point
//!
//! HTTP server that turns uploaded meeting recordings into structured minutes
//! using the Gemini generative-language API.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **credentials**: Resolves the API key (secrets store first, then the request)
//! - **gemini**: REST client for the remote API behind the `GenerativeService` trait
//! - **selector**: Picks the model that writes the minutes
//! - **workflow**: Save, upload, poll, generate, clean up
//! - **state**: Shared application state and metrics
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request logging and metrics collection
//! - **handlers**: HTTP request handlers for API endpoints
//! - **error**: Error types and their HTTP responses
//!
//! ## Startup:
//! When a key is configured and auto-detection is on, the model is detected once
//! before the server binds. A listing failure or an empty model set stops the
//! process with an error instead of serving requests that can only fail.

mod config;
mod credentials;
mod error;
mod gemini;
mod handlers;
mod health;
mod middleware;
mod selector;
mod state;
mod workflow;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use credentials::{resolve_credential, SecretsStore};
use state::AppState;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting meeting-minutes-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let secrets = SecretsStore::load().context("Failed to load secrets")?;
    let app_state = AppState::new(config.clone(), secrets);
    select_startup_model(&app_state).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    setup_signal_handlers(app_state.shutdown.clone());

    info!("Starting HTTP server on {}", bind_addr);

    let server_state = app_state.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(server_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/models", web::get().to(handlers::list_models))
                    .route("/summaries", web::post().to(handlers::create_summary)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = app_state.shutdown.cancelled() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Logs go to stdout; `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeting_minutes_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Pick the model for the configured key before serving, and fail hard if none works.
async fn select_startup_model(state: &AppState) -> Result<()> {
    let config = state.get_config();

    if !config.models.auto_detect {
        info!(model = %config.models.default_model, "Model pinned by configuration");
        state.cache_model(config.models.default_model.clone());
        return Ok(());
    }

    if !state.secrets.has_api_key() {
        warn!("No API key configured; models will be detected per request with the submitted key");
        return Ok(());
    }

    let credential = resolve_credential(&state.secrets, None)?;
    let service = state
        .build_client(&credential)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let model = selector::detect_model(service.as_ref(), &config.models.priority)
        .await
        .context("Model detection failed at startup")?;

    state.cache_model(model);
    Ok(())
}

/// Cancel `shutdown` on SIGTERM or SIGINT. Running workflows watch the same token.
fn setup_signal_handlers(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            error!("Failed to install signal handlers: {}", e);
            return;
        }
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok(())
}
