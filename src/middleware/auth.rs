use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::app::AppState;
use crate::auth::AuthError;
use crate::error::ApiError;

/// Authentication gate: verifies the bearer token and attaches the `SubjectId`.
///
/// Any failure ends the request with a 401; nothing downstream runs.
pub async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers).map_err(|err| {
        debug!("Rejected request without usable credentials: {}", err);
        ApiError::from_auth(&err, state.expose_auth_detail)
    })?;

    let verified = state.verifier.verify(token).await.map_err(|err| {
        warn!("Token verification failed: {}", err);
        ApiError::from_auth(&err, state.expose_auth_detail)
    })?;

    debug!("Authenticated subject '{}'", verified.subject);
    request.extensions_mut().insert(verified.subject);

    Ok(next.run(request).await)
}

/// Extract the token from an `Authorization: Bearer <token>` header
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorizationHeader)?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthorizationHeader)?;

    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::InvalidAuthorizationHeader);
    }

    Ok(token)
}
