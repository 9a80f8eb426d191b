use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use super::context::RequestContext;
use crate::app::AppState;
use crate::auth::SubjectId;
use crate::entitlements;
use crate::error::ApiError;

/// Entitlement gate: loads the caller's plan and attaches a `RequestContext`.
///
/// Must run after `authenticate`. A storage failure ends the request with a 500
/// rather than continuing on a guessed plan.
pub async fn attach_entitlements(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let subject = request
        .extensions()
        .get::<SubjectId>()
        .cloned()
        .ok_or_else(|| {
            error!("Entitlement gate reached without an authenticated subject");
            ApiError::unauthorized("Unauthorized")
        })?;

    let plan = state.plans.get_plan(&subject).await.map_err(|e| {
        error!("Failed to load plan for '{}': {}", subject, e);
        ApiError::internal_server_error("Failed to get user plan")
    })?;

    let entitlements = entitlements::resolve(&plan.plan);
    debug!("Subject '{}' on plan '{}'", subject, plan.plan);

    request.extensions_mut().insert(RequestContext {
        subject,
        plan,
        entitlements,
    });

    Ok(next.run(request).await)
}
