//! Limiter inspection for operators.

use actix_web::{HttpResponse, web};
use agora_core::domain::Identifier;
use agora_core::limiter::apply_reputation;
use agora_shared::dto::{RateLimitStatusQuery, RateLimitStatusResponse};

use crate::middleware::auth::Identity;
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// Window usage and behavior score of one identifier on one endpoint. Does
/// not count as a request against that window.
///
/// GET /api/v1/admin/ratelimit?identifier=ip:203.0.113.9&path=/api/v1/posts
pub async fn rate_limit_status(
    state: web::Data<AppState>,
    identity: Identity,
    query: web::Query<RateLimitStatusQuery>,
) -> AppResult<HttpResponse> {
    identity.require_role("admin")?;

    let query = query.into_inner();
    if !(query.identifier.starts_with("user:") || query.identifier.starts_with("ip:")) {
        return Err(AppError::BadRequest(
            "identifier must look like user:<id> or ip:<address>".to_string(),
        ));
    }
    if !query.path.starts_with('/') {
        return Err(AppError::BadRequest("path must start with '/'".to_string()));
    }

    let limiter = state
        .limiter
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("No counter store configured".to_string()))?;

    let identifier = Identifier::from(query.identifier.as_str());
    let resolved = state.limits.resolve(&query.path);

    let behavior_score = limiter.score(&identifier).await?;
    let limit = if state.adaptive {
        apply_reputation(resolved.limit, behavior_score)
    } else {
        resolved.limit
    };
    let usage = limiter
        .usage(&identifier, &resolved.endpoint_key, limit)
        .await?;

    tracing::debug!(
        admin = %identity.subject,
        identifier = %identifier,
        endpoint = %resolved.endpoint_key,
        "Rate limit status inspected"
    );

    Ok(HttpResponse::Ok().json(RateLimitStatusResponse {
        identifier: query.identifier,
        endpoint: resolved.endpoint_key,
        limit: limit.requests,
        window_secs: limit.window.as_secs(),
        burst: limit.burst,
        count: usage.count,
        remaining: usage.remaining(),
        reset_in_secs: usage.reset_in.as_secs() + u64::from(usage.reset_in.subsec_nanos() > 0),
        behavior_score,
    }))
}
