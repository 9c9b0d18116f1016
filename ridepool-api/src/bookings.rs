use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    routing::{post, put},
    Router,
};
use ridepool_core::command::{AttachReceipt, BookingRef, ReceiptDraft, ReserveSeats};
use ridepool_core::{Booking, CoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::body::{optional_json, JsonBody};
use crate::error::AppError;
use crate::middleware::Authenticated;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct ReserveRequest {
    seats: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ReserveResponse {
    ok: bool,
    booking_id: String,
    seats: i32,
    seats_available: i32,
}

#[derive(Debug, Default, Deserialize)]
struct PickedUpRequest {
    picked_up: Option<bool>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{trip_id}/bookings", post(reserve).get(list_bookings))
        .route("/v1/trips/{trip_id}/bookings/{booking_id}/cancel", post(cancel))
        .route(
            "/v1/trips/{trip_id}/bookings/{booking_id}/driver-cancel",
            post(cancel_as_driver),
        )
        .route("/v1/trips/{trip_id}/bookings/{booking_id}/picked-up", put(set_picked_up))
        .route("/v1/trips/{trip_id}/bookings/{booking_id}/receipts", post(attach_receipt))
}

async fn reserve(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(trip_id): Path<String>,
    body: Bytes,
) -> Result<Json<ReserveResponse>, AppError> {
    let req: ReserveRequest = optional_json(&body)?;
    let command = ReserveSeats::new(&trip_id, req.seats)?;
    let reservation = state.bookings.reserve(&caller, command).await?;

    Ok(Json(ReserveResponse {
        ok: true,
        booking_id: reservation.booking_id,
        seats: reservation.seats,
        seats_available: reservation.seats_available,
    }))
}

async fn cancel(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path((trip_id, booking_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let booking = BookingRef::new(&trip_id, &booking_id)?;
    state.bookings.cancel(&caller, booking).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn cancel_as_driver(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path((trip_id, booking_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let booking = BookingRef::new(&trip_id, &booking_id)?;
    state.bookings.cancel_as_driver(&caller, booking).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn set_picked_up(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path((trip_id, booking_id)): Path<(String, String)>,
    JsonBody(req): JsonBody<PickedUpRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = BookingRef::new(&trip_id, &booking_id)?;
    let picked_up = req
        .picked_up
        .ok_or_else(|| CoreError::invalid("Missing picked_up"))?;
    state.bookings.set_picked_up(&caller, booking, picked_up).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn attach_receipt(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path((trip_id, booking_id)): Path<(String, String)>,
    JsonBody(draft): JsonBody<ReceiptDraft>,
) -> Result<Json<Value>, AppError> {
    let command = AttachReceipt::new(BookingRef::new(&trip_id, &booking_id)?, draft)?;
    let receipt_id = state.bookings.attach_receipt(&caller, command).await?;
    Ok(Json(json!({ "ok": true, "receipt_id": receipt_id })))
}

async fn list_bookings(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(trip_id): Path<String>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state.bookings.list_bookings(&caller, &trip_id).await?;
    Ok(Json(bookings))
}
