//! Health check endpoint.

use std::time::Duration;

use actix_web::{HttpResponse, web};
use agora_shared::dto::{HealthResponse, StoreStatus};

use crate::state::AppState;

const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check endpoint - reports counter store reachability.
///
/// GET /health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let store = match &state.limiter {
        None => StoreStatus::NotConfigured,
        Some(limiter) => match tokio::time::timeout(PING_TIMEOUT, limiter.ping()).await {
            Ok(Ok(())) => StoreStatus::Healthy,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Counter store health check failed");
                StoreStatus::Unhealthy
            }
            Err(_) => {
                tracing::warn!("Counter store health check timed out");
                StoreStatus::Unhealthy
            }
        },
    };

    let response = HealthResponse {
        status: if store == StoreStatus::Unhealthy {
            "degraded".to_string()
        } else {
            "healthy".to_string()
        },
        store,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    if store == StoreStatus::Unhealthy {
        HttpResponse::ServiceUnavailable().json(response)
    } else {
        HttpResponse::Ok().json(response)
    }
}
