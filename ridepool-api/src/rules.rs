use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    routing::{delete, get, post},
    Router,
};
use ridepool_core::command::{GenerateForRule, RuleDraft, RuleInput};
use ridepool_core::Rule;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::body::{optional_json, JsonBody};
use crate::error::AppError;
use crate::middleware::Authenticated;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct RuleSaved {
    ok: bool,
    rule_id: String,
    created: u32,
    skipped: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateRequest {
    horizon_days: Option<f64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/rules", get(list_rules).post(save_rule))
        .route("/v1/rules/{rule_id}", delete(delete_rule))
        .route("/v1/rules/{rule_id}/generate", post(generate))
}

async fn save_rule(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    JsonBody(draft): JsonBody<RuleDraft>,
) -> Result<Json<RuleSaved>, AppError> {
    let input = RuleInput::try_from(draft)?;
    let outcome = state.rules.create_or_update(&caller, input).await?;

    Ok(Json(RuleSaved {
        ok: true,
        rule_id: outcome.rule_id,
        created: outcome.created,
        skipped: outcome.skipped,
    }))
}

async fn list_rules(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
) -> Result<Json<Vec<Rule>>, AppError> {
    Ok(Json(state.rules.list(&caller).await?))
}

async fn delete_rule(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(rule_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.rules.delete(&caller, &rule_id).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn generate(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(rule_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let req: GenerateRequest = optional_json(&body)?;
    let command = GenerateForRule::new(&rule_id, req.horizon_days, state.limits.max_horizon_days)?;
    let outcome = state.rules.generate_for_rule_id(&caller, command).await?;
    Ok(Json(json!({
        "ok": true,
        "created": outcome.created,
        "skipped": outcome.skipped,
    })))
}
