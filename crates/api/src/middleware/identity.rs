//! Caller identity extraction.
//!
//! Authentication itself is the gateway's job (an external
//! collaborator): by the time a request reaches this service, a
//! trusted `x-user-id` header carries the authenticated principal, if
//! any. This extractor also captures the forwarded client IP so the
//! rate limiter has a bucket for anonymous callers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;
use tuneforge_core::error::CoreError;
use tuneforge_core::rate_limit::UNKNOWN_IDENTIFIER;
use tuneforge_core::sanitize::sanitize_user_id;
use tuneforge_core::types::UserId;

use crate::error::AppError;

/// Header set by the auth gateway for authenticated requests.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Standard forwarded-client header.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// The caller's identity, as far as the gateway could establish it.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    /// Authenticated principal, when the gateway provided one that
    /// parses as a UUID.
    pub user_id: Option<UserId>,
    /// First hop of `x-forwarded-for`, when present.
    pub client_ip: Option<String>,
}

impl RequestIdentity {
    /// The authenticated user, or a 401.
    pub fn require_user(&self) -> Result<UserId, AppError> {
        self.user_id.ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Authentication required".to_string(),
            ))
        })
    }

    /// Rate-limit bucket for this caller: authenticated id, else
    /// forwarded IP, else the shared `"unknown"` bucket (anonymous,
    /// IP-less callers are throttled together — a documented
    /// limitation).
    pub fn rate_limit_identifier(&self) -> String {
        if let Some(user_id) = self.user_id {
            return format!("user:{user_id}");
        }
        if let Some(ip) = &self.client_ip {
            return format!("ip:{ip}");
        }
        UNKNOWN_IDENTIFIER.to_string()
    }
}

impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(sanitize_user_id);

        let client_ip = parts
            .headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| raw.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());

        Ok(RequestIdentity { user_id, client_ip })
    }
}
