use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ridepool_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        AppError::Core(CoreError::Unauthenticated(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Core(err) => match err {
                CoreError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
                CoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
                CoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                CoreError::AlreadyExists(_) => StatusCode::CONFLICT,
                CoreError::Storage(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Core(err) => err.code(),
            AppError::Anyhow(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match &self {
            AppError::Core(err) if err.is_client_error() => err.to_string(),
            other => {
                tracing::error!("Internal Server Error: {}", other);
                "Internal Server Error".to_string()
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CoreError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (CoreError::invalid("x"), StatusCode::BAD_REQUEST),
            (CoreError::not_found("x"), StatusCode::NOT_FOUND),
            (CoreError::precondition("x"), StatusCode::PRECONDITION_FAILED),
            (CoreError::denied("x"), StatusCode::FORBIDDEN),
            (CoreError::AlreadyExists("x".into()), StatusCode::CONFLICT),
            (CoreError::storage("pool timed out"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_storage_details_are_hidden() {
        let response = AppError::from(CoreError::storage("password authentication failed")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["code"], "internal");
    }
}
