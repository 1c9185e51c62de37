//! Axum error boundary: every handler returns `Result<T, ApiError>`, and `ApiError`
//! renders a `dfm_core::DfmError` as the JSON body + status code the HTTP surface
//! promises.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dfm_core::DfmError;
use serde_json::json;

/// Thin wrapper so `DfmError` (defined in `dfm-core`, which knows nothing about
/// axum) can implement `IntoResponse` here instead.
pub struct ApiError(pub DfmError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl From<DfmError> for ApiError {
    fn from(e: DfmError) -> Self {
        ApiError(e)
    }
}

impl From<dfm_redis::Error> for ApiError {
    fn from(e: dfm_redis::Error) -> Self {
        ApiError(e.into())
    }
}

impl From<dfm_core::Error> for ApiError {
    fn from(e: dfm_core::Error) -> Self {
        ApiError(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn data_error_renders_as_400() {
        let response = ApiError(DfmError::data("bad field", None)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn resource_error_renders_as_503() {
        let response = ApiError(DfmError::resource("redis down")).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
