use axum::{
    extract::{Json, State},
    routing::{post, put},
    Router,
};
use axum_extra::headers::UserAgent;
use axum_extra::TypedHeader;
use ridepool_core::CoreError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::body::JsonBody;
use crate::error::AppError;
use crate::middleware::Authenticated;
use crate::state::AppState;

const MAX_DISPLAY_NAME_LEN: usize = 80;

#[derive(Debug, Default, Deserialize)]
struct ProfileRequest {
    display_name: Option<String>,
    photo_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceRequest {
    token: Option<String>,
    user_agent: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/me/profile", put(upsert_profile))
        .route("/v1/me/devices", post(register_device))
}

async fn upsert_profile(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    JsonBody(req): JsonBody<ProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| CoreError::invalid("Missing display_name"))?;
    if display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(CoreError::invalid(format!(
            "display_name must be at most {} characters",
            MAX_DISPLAY_NAME_LEN
        ))
        .into());
    }
    let photo_url = req.photo_url.as_deref().map(str::trim).filter(|u| !u.is_empty());

    state
        .profiles
        .upsert_profile(&caller.uid, display_name, photo_url)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

async fn register_device(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    user_agent: Option<TypedHeader<UserAgent>>,
    JsonBody(req): JsonBody<DeviceRequest>,
) -> Result<Json<Value>, AppError> {
    let token = req
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CoreError::invalid("Missing token"))?;
    let user_agent = req
        .user_agent
        .or_else(|| user_agent.map(|TypedHeader(ua)| ua.as_str().to_string()));

    state
        .profiles
        .register_device_token(&caller.uid, token, user_agent.as_deref())
        .await?;
    tracing::debug!(uid = %caller.uid, "Device token registered");
    Ok(Json(json!({ "ok": true })))
}
