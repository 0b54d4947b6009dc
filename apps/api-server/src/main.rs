//! # Agora API Server
//!
//! The main entry point for the Actix-web HTTP server. Every request passes
//! through the adaptive rate limiter before reaching a handler.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

mod config;
mod handlers;
mod middleware;
mod state;
mod telemetry;

#[cfg(test)]
mod test_support;

use config::AppConfig;
use middleware::rate_limit::RateLimitMiddleware;
use state::AppState;
use telemetry::{TelemetryConfig, init_telemetry};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();

    // Malformed rules are fatal
    let state = AppState::new(&config).await?;
    let policy = state.rate_limit_policy();

    tracing::info!(
        host = %config.host,
        port = config.port,
        rate_limit_enabled = policy.enabled,
        adaptive = policy.adaptive,
        "Starting Agora API Server"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(RateLimitMiddleware::new(policy.clone()))
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
