//! Request/response shapes and error-to-status mapping for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::RegicacheError;

/// A JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// A human-readable error message.
    pub error: String,
}

/// Wraps `RegicacheError` so it can be returned directly from a handler, mapped to the
/// status codes named in spec.md 6.
pub struct ApiError(pub RegicacheError);

impl From<RegicacheError> for ApiError {
    fn from(e: RegicacheError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RegicacheError::SyncBusy => StatusCode::CONFLICT,
            RegicacheError::RegistryUnavailable(_) => StatusCode::BAD_GATEWAY,
            RegicacheError::InvalidInterval(_) => StatusCode::BAD_REQUEST,
            RegicacheError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

/// Query parameters for `GET /repositories`.
#[derive(Debug, Deserialize)]
pub struct ListRepositoriesQuery {
    /// 1-based page number, defaulting to 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Page size, defaulting to 20.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Optional case-sensitive substring match against repository name.
    pub search: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

/// Request body for `PUT /sync/interval`.
#[derive(Debug, Deserialize)]
pub struct UpdateIntervalRequest {
    /// The new interval in minutes; must be one of 5, 15, 30, 60.
    pub minutes: u64,
}

/// Response body for `GET /sync/last`.
#[derive(Debug, Serialize)]
pub struct LastSyncResponse {
    /// Unix seconds of the last sync attempt, or `None` if no sync has ever run.
    pub last_sync_time: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_for(error: RegicacheError) -> StatusCode {
        ApiError(error).into_response().status()
    }

    #[test]
    fn maps_domain_errors_to_the_documented_status_codes() {
        assert_eq!(status_for(RegicacheError::SyncBusy), StatusCode::CONFLICT);
        assert_eq!(
            status_for(RegicacheError::RegistryUnavailable("down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_for(RegicacheError::InvalidInterval(7)), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(RegicacheError::NotFound("acme/api".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(RegicacheError::Config("bad".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
