//! Authentication extractors.
//!
//! The rate limiter only needs the principal id out of a bearer token; the
//! admin routes additionally need a role check.

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, web};
use std::future::{Ready, ready};

use agora_core::ports::{AuthError, TokenClaims, TokenService};

use super::error::AppError;
use crate::state::AppState;

/// Authenticated principal extractor.
///
/// Use this in handlers to require authentication:
/// ```ignore
/// async fn protected_route(identity: Identity) -> impl Responder {
///     format!("Hello, {}!", identity.subject)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Identity {
    /// Check if the principal has a specific role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn require_role(&self, role: &str) -> Result<(), AppError> {
        if self.has_role(role) {
            Ok(())
        } else {
            tracing::debug!(subject = %self.subject, role, "Missing required role");
            Err(AuthError::InsufficientPermissions.into())
        }
    }
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject: claims.subject,
            roles: claims.roles,
        }
    }
}

/// The raw token of a `Bearer <token>` authorization header.
pub fn bearer_token(req: &HttpRequest) -> Result<&str, AuthError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuth)?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AuthError::InvalidToken("Invalid authorization header".to_string()))?;

    auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidToken("Expected Bearer token".to_string()))
}

/// Validate the request's bearer token.
pub fn authenticate(req: &HttpRequest, tokens: &dyn TokenService) -> Result<TokenClaims, AuthError> {
    tokens.validate_token(bearer_token(req)?)
}

/// Principal id of a request carrying a valid token, if any. Invalid tokens
/// are treated as anonymous.
pub fn principal(req: &HttpRequest, tokens: &dyn TokenService) -> Option<String> {
    match authenticate(req, tokens) {
        Ok(claims) => Some(claims.subject),
        Err(AuthError::MissingAuth) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unusable bearer token");
            None
        }
    }
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            tracing::error!("AppState not found in app data");
            return ready(Err(AppError::Internal(
                "Server configuration error".to_string(),
            )));
        };

        ready(
            authenticate(req, state.tokens.as_ref())
                .map(Identity::from)
                .map_err(AppError::from),
        )
    }
}
