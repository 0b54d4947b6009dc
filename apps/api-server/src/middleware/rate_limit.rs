//! Rate limiting middleware.
//!
//! Resolves the endpoint rule and the client identifier, asks the limiter for
//! a decision, and either rejects with 429 or forwards the request. Every
//! limited response carries the `X-RateLimit-*` headers.

use actix_web::{
    Error, HttpRequest, ResponseError,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderMap, HeaderName, HeaderValue},
};
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use agora_core::AdaptiveRateLimiter;
use agora_core::domain::{
    ClientInfo, EndpointLimit, EndpointLimits, Identifier, RateLimitDecision,
};
use agora_core::ports::TokenService;

use super::auth::principal;
use super::error::AppError;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";
const STATUS_HEADER: &str = "x-ratelimit-status";

/// Everything the middleware needs to decide on a request.
#[derive(Clone)]
pub struct RateLimitPolicy {
    /// `None` runs every request as a degraded decision.
    pub limiter: Option<AdaptiveRateLimiter>,
    pub limits: Arc<EndpointLimits>,
    pub tokens: Arc<dyn TokenService>,
    pub enabled: bool,
    pub adaptive: bool,
}

/// A decision together with the subject and endpoint it was made for.
#[derive(Debug, Clone)]
pub struct Admission {
    pub identifier: Identifier,
    pub endpoint_key: String,
    /// Configured limit before any reputation adjustment.
    pub nominal: EndpointLimit,
    pub decision: RateLimitDecision,
}

impl RateLimitPolicy {
    /// Rate-limit subject of `req`: the token principal, else the client address.
    pub fn identify(&self, req: &HttpRequest) -> Identifier {
        let principal = principal(req, self.tokens.as_ref());
        let peer = req.peer_addr().map(|addr| addr.to_string());

        Identifier::resolve(&ClientInfo {
            principal: principal.as_deref(),
            forwarded_for: header_str(req, "x-forwarded-for"),
            real_ip: header_str(req, "x-real-ip"),
            peer_addr: peer.as_deref(),
        })
    }

    /// Decide on `req` and, in adaptive mode, feed the outcome back into the
    /// subject's behavior score. Never fails.
    pub async fn decide(&self, req: &HttpRequest) -> Admission {
        let resolved = self.limits.resolve(req.path());
        let identifier = self.identify(req);

        let decision = match &self.limiter {
            Some(limiter) if self.adaptive => {
                limiter
                    .check_adaptive(&identifier, &resolved.endpoint_key, resolved.limit)
                    .await
            }
            Some(limiter) => {
                limiter
                    .check(&identifier, &resolved.endpoint_key, resolved.limit)
                    .await
            }
            None => RateLimitDecision::fail_open(resolved.limit),
        };

        if self.adaptive && !decision.degraded {
            if let Some(limiter) = &self.limiter {
                limiter.record_outcome(&identifier, decision.allowed).await;
            }
        }

        Admission {
            identifier,
            endpoint_key: resolved.endpoint_key,
            nominal: resolved.limit,
            decision,
        }
    }
}

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Write the `X-RateLimit-*` headers for `decision`. Limit and remaining are
/// reported against the configured `nominal` limit; a degraded decision
/// reports the full nominal quota and window. `now` is epoch seconds.
pub fn apply_headers(
    headers: &mut HeaderMap,
    decision: &RateLimitDecision,
    nominal: EndpointLimit,
    now: i64,
) {
    let (remaining, reset_in) = if decision.degraded {
        (nominal.requests, nominal.window)
    } else if !decision.allowed {
        (0, decision.reset_in)
    } else {
        (
            nominal.requests.saturating_sub(decision.current_count),
            decision.reset_in,
        )
    };
    let reset_at = now.saturating_add(i64::try_from(ceil_secs(reset_in)).unwrap_or(i64::MAX));

    headers.insert(
        HeaderName::from_static(LIMIT_HEADER),
        HeaderValue::from(nominal.requests),
    );
    headers.insert(
        HeaderName::from_static(REMAINING_HEADER),
        HeaderValue::from(remaining),
    );
    headers.insert(
        HeaderName::from_static(RESET_HEADER),
        HeaderValue::from(reset_at),
    );
    if decision.degraded {
        headers.insert(
            HeaderName::from_static(STATUS_HEADER),
            HeaderValue::from_static("degraded"),
        );
    }
}

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    policy: RateLimitPolicy,
}

impl RateLimitMiddleware {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self { policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            policy: self.policy.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    policy: RateLimitPolicy,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let policy = self.policy.clone();

        Box::pin(async move {
            if !policy.enabled {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let admission = policy.decide(req.request()).await;
            let decision = admission.decision;
            let now = chrono::Utc::now().timestamp();

            if !decision.allowed {
                tracing::debug!(
                    identifier = %admission.identifier,
                    endpoint = %admission.endpoint_key,
                    limit = decision.limit.requests,
                    "Rejecting rate-limited request"
                );

                let mut response = AppError::RateLimited {
                    retry_after: decision.retry_after_secs(),
                }
                .error_response();
                apply_headers(response.headers_mut(), &decision, admission.nominal, now);

                let (http_req, _payload) = req.into_parts();
                return Ok(ServiceResponse::new(http_req, response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            apply_headers(res.headers_mut(), &decision, admission.nominal, now);
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{failing_limiter, memory_limiter, state};
    use actix_web::http::{StatusCode, header};
    use actix_web::{App, HttpResponse, test, web};

    fn policy(limiter: Option<AdaptiveRateLimiter>) -> RateLimitPolicy {
        state(limiter).rate_limit_policy()
    }

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    fn like(ip: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/v1/posts/42/like")
            .insert_header(("X-Forwarded-For", ip))
    }

    macro_rules! app {
        ($policy:expr) => {
            test::init_service(
                App::new()
                    .wrap(RateLimitMiddleware::new($policy))
                    .route("/api/v1/posts/{id}/like", web::post().to(ok))
                    .route("/api/v1/feed", web::get().to(ok)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_limits_then_rejects_with_429() {
        let app = app!(policy(Some(memory_limiter())));

        let res = test::call_service(&app, like("203.0.113.9").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(LIMIT_HEADER).unwrap(), "2");
        assert_eq!(res.headers().get(REMAINING_HEADER).unwrap(), "1");
        assert!(res.headers().get(RESET_HEADER).is_some());
        assert!(res.headers().get(STATUS_HEADER).is_none());

        let res = test::call_service(&app, like("203.0.113.9").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(REMAINING_HEADER).unwrap(), "0");

        let res = test::call_service(&app, like("203.0.113.9").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get(REMAINING_HEADER).unwrap(), "0");
        let retry_after: u64 = res
            .headers()
            .get(header::RETRY_AFTER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after >= 1);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["status"], 429);
        assert!(body["retry_after"].as_u64().unwrap() >= 1);
    }

    #[actix_web::test]
    async fn test_clients_and_endpoints_are_independent() {
        let app = app!(policy(Some(memory_limiter())));

        for _ in 0..2 {
            test::call_service(&app, like("198.51.100.1").to_request()).await;
        }
        let res = test::call_service(&app, like("198.51.100.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

        let res = test::call_service(&app, like("198.51.100.2").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        // Unmatched paths fall back to the default limit.
        let req = test::TestRequest::get()
            .uri("/api/v1/feed")
            .insert_header(("X-Forwarded-For", "198.51.100.1"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(LIMIT_HEADER).unwrap(), "100");
    }

    #[actix_web::test]
    async fn test_authenticated_principal_survives_address_rotation() {
        let policy = policy(Some(memory_limiter()));
        let token = policy.tokens.issue_token("77", vec![]).unwrap();
        let app = app!(policy);

        for ip in ["192.0.2.1", "192.0.2.2", "192.0.2.3"] {
            let req = like(ip)
                .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
                .to_request();
            let res = test::call_service(&app, req).await;
            if ip == "192.0.2.3" {
                assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
            } else {
                assert_eq!(res.status(), StatusCode::OK);
            }
        }
    }

    #[actix_web::test]
    async fn test_store_failure_fails_open_with_degraded_headers() {
        let app = app!(policy(Some(failing_limiter())));

        for _ in 0..5 {
            let res = test::call_service(&app, like("203.0.113.1").to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(res.headers().get(STATUS_HEADER).unwrap(), "degraded");
            assert_eq!(res.headers().get(LIMIT_HEADER).unwrap(), "2");
            assert_eq!(res.headers().get(REMAINING_HEADER).unwrap(), "2");
        }
    }

    #[actix_web::test]
    async fn test_missing_store_is_degraded() {
        let app = app!(policy(None));

        let res = test::call_service(&app, like("203.0.113.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(STATUS_HEADER).unwrap(), "degraded");
    }

    #[actix_web::test]
    async fn test_disabled_passes_through() {
        let mut policy = policy(Some(memory_limiter()));
        policy.enabled = false;
        let app = app!(policy);

        for _ in 0..5 {
            let res = test::call_service(&app, like("203.0.113.1").to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().get(LIMIT_HEADER).is_none());
        }
    }

    #[actix_web::test]
    async fn test_adaptive_mode_records_outcomes() {
        let limiter = memory_limiter();
        let policy = policy(Some(limiter.clone()));
        let id = Identifier::ip("203.0.113.50");
        let req = like("203.0.113.50").to_http_request();

        policy.decide(&req).await;
        policy.decide(&req).await;
        assert_eq!(limiter.score(&id).await.unwrap(), 102);

        let admission = policy.decide(&req).await;
        assert!(!admission.decision.allowed);
        assert_eq!(admission.endpoint_key, "/api/v1/posts/{id}/like");
        assert_eq!(limiter.score(&id).await.unwrap(), 100);
    }

    #[actix_web::test]
    async fn test_non_adaptive_mode_leaves_score_alone() {
        let limiter = memory_limiter();
        let mut policy = policy(Some(limiter.clone()));
        policy.adaptive = false;
        let req = like("203.0.113.60").to_http_request();

        for _ in 0..3 {
            policy.decide(&req).await;
        }
        assert_eq!(
            limiter.score(&Identifier::ip("203.0.113.60")).await.unwrap(),
            100
        );
    }

    #[actix_web::test]
    async fn test_identify_falls_back_to_peer_address() {
        let policy = policy(None);
        let req = test::TestRequest::get()
            .peer_addr("10.1.2.3:55000".parse().unwrap())
            .to_http_request();
        assert_eq!(policy.identify(&req).as_str(), "ip:10.1.2.3");

        let req = test::TestRequest::get()
            .insert_header(("X-Real-IP", "10.9.9.9"))
            .peer_addr("10.1.2.3:55000".parse().unwrap())
            .to_http_request();
        assert_eq!(policy.identify(&req).as_str(), "ip:10.9.9.9");

        let req = test::TestRequest::get().to_http_request();
        assert_eq!(policy.identify(&req).as_str(), "ip:unknown");
    }

    #[actix_web::test]
    async fn test_degraded_reset_uses_nominal_window() {
        let nominal = EndpointLimit::new(10, Duration::from_secs(60), 0);
        let decision = RateLimitDecision::fail_open(nominal);
        let mut headers = HeaderMap::new();
        apply_headers(&mut headers, &decision, nominal, 1_000);

        assert_eq!(headers.get(RESET_HEADER).unwrap(), "1060");
        assert_eq!(headers.get(REMAINING_HEADER).unwrap(), "10");
        assert_eq!(headers.get(STATUS_HEADER).unwrap(), "degraded");
    }

    #[actix_web::test]
    async fn test_rejection_reports_nothing_remaining() {
        let nominal = EndpointLimit::new(10, Duration::from_secs(60), 0);
        let decision = RateLimitDecision {
            allowed: false,
            current_count: 5,
            reset_in: Duration::from_millis(30_500),
            limit: EndpointLimit::new(5, Duration::from_secs(120), 0),
            degraded: false,
        };
        let mut headers = HeaderMap::new();
        apply_headers(&mut headers, &decision, nominal, 1_000);

        assert_eq!(headers.get(LIMIT_HEADER).unwrap(), "10");
        assert_eq!(headers.get(REMAINING_HEADER).unwrap(), "0");
        assert_eq!(headers.get(RESET_HEADER).unwrap(), "1031");
        assert!(headers.get(STATUS_HEADER).is_none());
    }

    #[actix_web::test]
    async fn test_trusted_client_headers_report_configured_limit() {
        let limiter = memory_limiter();
        let id = Identifier::ip("203.0.113.77");
        for _ in 0..60 {
            limiter.record_outcome(&id, true).await;
        }
        assert_eq!(limiter.score(&id).await.unwrap(), 160);
        let app = app!(policy(Some(limiter)));

        let res = test::call_service(&app, like("203.0.113.77").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(LIMIT_HEADER).unwrap(), "2");
        assert_eq!(res.headers().get(REMAINING_HEADER).unwrap(), "1");

        test::call_service(&app, like("203.0.113.77").to_request()).await;

        // The raised quota admits a third request; remaining stays floored.
        let res = test::call_service(&app, like("203.0.113.77").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(LIMIT_HEADER).unwrap(), "2");
        assert_eq!(res.headers().get(REMAINING_HEADER).unwrap(), "0");
    }
}
