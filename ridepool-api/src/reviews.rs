use axum::{
    extract::{Json, Path, State},
    routing::post,
    Router,
};
use ridepool_core::command::SubmitReview;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::body::JsonBody;
use crate::error::AppError;
use crate::middleware::Authenticated;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct ReviewRequest {
    rating: Option<f64>,
    comment: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/trips/{trip_id}/reviews", post(submit_review))
}

async fn submit_review(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(trip_id): Path<String>,
    JsonBody(req): JsonBody<ReviewRequest>,
) -> Result<Json<Value>, AppError> {
    let command = SubmitReview::new(&trip_id, req.rating, req.comment)?;
    let result = state.reviews.submit(&caller, command).await?;
    Ok(Json(json!({
        "ok": true,
        "rating_average": result.rating_average,
        "rating_count": result.rating_count,
    })))
}
