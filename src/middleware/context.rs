use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::error;

use crate::auth::SubjectId;
use crate::entitlements::Entitlements;
use crate::error::ApiError;
use crate::plans::PlanRecord;

/// Per-request state produced by the gate chain for handlers to read
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub subject: SubjectId,
    /// Plan record as read during this request
    pub plan: PlanRecord,
    pub entitlements: Entitlements,
}

/// Extractor for `RequestContext` - fails if the entitlement gate did not run
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| {
                error!("RequestContext missing - route is not behind the entitlement gate");
                ApiError::internal_server_error("Request context not available")
            })
    }
}

/// Extractor for the authenticated subject - fails closed if the auth gate did not run
#[async_trait]
impl<S> FromRequestParts<S> for SubjectId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SubjectId>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
    }
}
