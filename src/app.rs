use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::TokenVerifier;
use crate::handlers::{plan, system};
use crate::plans::PlanStore;

/// Shared state for handlers and both gates
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub plans: PlanStore,
    pub expose_auth_detail: bool,
}

impl AppState {
    pub fn new(verifier: Arc<TokenVerifier>, plans: PlanStore, expose_auth_detail: bool) -> Self {
        Self {
            verifier,
            plans,
            expose_auth_detail,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(system::root))
        .route("/health", get(system::health))
        // Protected API
        .nest("/api/v1", protected_routes(state.clone()))
        .fallback(system::not_found)
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn protected_routes(state: AppState) -> Router<AppState> {
    let routes = Router::new().route(
        "/me/plan",
        get(plan::get_me_plan).post(plan::post_me_plan),
    );

    with_gates(routes, state)
}

/// Put routes behind authentication, then entitlement resolution.
///
/// Layers wrap outside-in, so `authenticate` is added last to run first.
pub fn with_gates(routes: Router<AppState>, state: AppState) -> Router<AppState> {
    routes
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::attach_entitlements,
        ))
        .layer(middleware::from_fn_with_state(
            state,
            crate::middleware::authenticate,
        ))
}
