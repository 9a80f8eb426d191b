use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::entitlements::{self, Entitlements};
use crate::error::ApiError;
use crate::middleware::RequestContext;

#[derive(Debug, Serialize, Deserialize)]
pub struct PlanResponse {
    pub plan: String,
    pub entitlements: Entitlements,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub plan: String,
}

/// GET /api/v1/me/plan - Current plan and the entitlements it grants
///
/// Answers from the plan the entitlement gate loaded for this request.
pub async fn get_me_plan(ctx: RequestContext) -> Json<PlanResponse> {
    Json(PlanResponse {
        plan: ctx.plan.plan,
        entitlements: ctx.entitlements,
    })
}

/// POST /api/v1/me/plan - Switch the caller to another plan
///
/// ```json
/// { "plan": "premium" }
/// ```
pub async fn post_me_plan(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<UpdatePlanRequest>, JsonRejection>,
) -> Result<Json<PlanResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let record = state.plans.set_plan(&ctx.subject, &request.plan).await?;

    Ok(Json(PlanResponse {
        entitlements: entitlements::resolve(&record.plan),
        plan: record.plan,
    }))
}
