use axum::{
    extract::{Json, Path, Query, State},
    routing::get,
    Router,
};
use ridepool_core::command::{parse_date, PublishTrip, RouteRef, TripDraft};
use ridepool_core::Trip;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::body::JsonBody;
use crate::error::AppError;
use crate::middleware::Authenticated;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct SearchParams {
    origin_id: Option<String>,
    destination_id: Option<String>,
    date: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips", get(search_trips).post(publish_trip))
        .route("/v1/trips/{trip_id}", get(get_trip).delete(delete_trip))
}

async fn search_trips(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Trip>>, AppError> {
    let route = RouteRef::new(
        params.origin_id.as_deref().unwrap_or_default(),
        params.destination_id.as_deref().unwrap_or_default(),
    )?;
    let date = parse_date(params.date.as_deref().unwrap_or_default(), "date")?;

    let trips = state.trips.search(&route, date).await?;
    tracing::debug!(
        origin = %route.origin_id,
        destination = %route.destination_id,
        %date,
        results = trips.len(),
        "Trip search"
    );
    Ok(Json(trips))
}

async fn publish_trip(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    JsonBody(draft): JsonBody<TripDraft>,
) -> Result<Json<Trip>, AppError> {
    let command = PublishTrip::try_from(draft)?;
    let trip = state.trips.publish(&caller, command).await?;
    Ok(Json(trip))
}

async fn get_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.trips.get(&trip_id).await?))
}

async fn delete_trip(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(trip_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.trips.delete(&caller, &trip_id).await?;
    Ok(Json(json!({ "ok": true })))
}
