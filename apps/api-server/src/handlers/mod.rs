//! HTTP handlers and route configuration.

mod admin;
mod health;

use actix_web::web;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api/v1/admin")
                .route("/ratelimit", web::get().to(admin::rate_limit_status)),
        );
}
