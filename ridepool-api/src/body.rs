use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use ridepool_core::CoreError;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON body for routes where every field is optional; an empty body means defaults.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| CoreError::invalid(format!("Invalid request body: {}", e)).into())
}

/// `Json` replacement whose rejections use the error body of every other
/// failure. Missing fields are left to the command validators.
pub(crate) struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| CoreError::invalid(format!("Invalid request body: {}", e.body_text())))?;
        optional_json(&body).map(JsonBody)
    }
}
