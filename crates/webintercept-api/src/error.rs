//! Error → HTTP status mapping for the operator surface

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use webintercept_core::Error;

/// Wrapper turning core errors into operator-visible responses
pub struct ApiError(pub Error);

/// Handler result alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidConfig { .. }
            | Error::InvalidHostname { .. }
            | Error::Conflict { .. }
            | Error::Protocol { .. } => StatusCode::BAD_REQUEST,
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        let cases = [
            (Error::not_found("x"), StatusCode::NOT_FOUND),
            (Error::invalid_config("x"), StatusCode::BAD_REQUEST),
            (Error::conflict("x"), StatusCode::BAD_REQUEST),
            (Error::upstream("x"), StatusCode::BAD_GATEWAY),
            (Error::timeout("x"), StatusCode::GATEWAY_TIMEOUT),
            (Error::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
