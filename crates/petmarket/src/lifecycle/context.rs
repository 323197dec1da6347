use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use super::audit::RequestOrigin;
use super::domain::UserId;
use super::error::LifecycleError;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Identity and network origin of the caller, read from request headers.
///
/// Authentication happens upstream; this only trusts the actor header that
/// the gateway forwards. The role is resolved from the store per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: UserId,
    pub origin: RequestOrigin,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, LifecycleError> {
        let actor = header_value(headers, ACTOR_HEADER)
            .map(UserId::new)
            .ok_or(LifecycleError::Unauthenticated)?;

        // First hop of x-forwarded-for is the client.
        let ip_address = header_value(headers, "x-forwarded-for")
            .and_then(|value| value.split(',').next().map(|hop| hop.trim().to_string()))
            .filter(|hop| !hop.is_empty())
            .or_else(|| header_value(headers, "x-real-ip"));
        let client = header_value(headers, "user-agent");

        Ok(Self {
            actor,
            origin: RequestOrigin { ip_address, client },
        })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[axum::async_trait]
impl<St> FromRequestParts<St> for RequestContext
where
    St: Send + Sync,
{
    type Rejection = LifecycleError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
