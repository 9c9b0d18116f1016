use axum::{
    extract::{Json, Path, State},
    routing::put,
    Router,
};
use ridepool_core::command::RouteRef;
use ridepool_core::RouteAlert;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::middleware::Authenticated;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/v1/alerts/{origin_id}/{destination_id}",
        put(follow_route).delete(unfollow_route),
    )
}

async fn follow_route(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path((origin_id, destination_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let route = RouteRef::new(&origin_id, &destination_id)?;
    let alert = RouteAlert {
        uid: caller.uid,
        origin_id: route.origin_id,
        destination_id: route.destination_id,
        active: true,
        created_at: state.clock.now(),
    };
    state.alerts.follow(&alert).await?;
    tracing::info!(uid = %alert.uid, route = %alert.key(), "Route followed");
    Ok(Json(json!({ "ok": true })))
}

/// Idempotent: unfollowing a route that was never followed still succeeds.
async fn unfollow_route(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path((origin_id, destination_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let route = RouteRef::new(&origin_id, &destination_id)?;
    let removed = state
        .alerts
        .unfollow(&caller.uid, &route.origin_id, &route.destination_id)
        .await?;
    Ok(Json(json!({ "ok": true, "removed": removed })))
}
