//! Error responses for the API.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use curator_core::{
    AllocationError, ArchiveError, InvalidWorkerId, ReviewError, StoreError,
};

/// Seconds a client should wait before retrying a failed fetch.
const FETCH_RETRY_AFTER_SECS: u64 = 30;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid worker name: {0}")]
    InvalidWorker(#[from] InvalidWorkerId),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, bool) {
        match self {
            Self::InvalidWorker(_) => (StatusCode::BAD_REQUEST, "INVALID_WORKER", false),
            Self::Review(e) => review_parts(e),
            Self::Allocation(e) => allocation_parts(e),
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", false),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", false),
        }
    }
}

fn allocation_parts(error: &AllocationError) -> (StatusCode, &'static str, bool) {
    match error {
        AllocationError::Fetch { .. } => (StatusCode::SERVICE_UNAVAILABLE, "FETCH_FAILED", true),
        AllocationError::InitialFetch { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "INITIAL_FETCH_FAILED", true)
        }
        AllocationError::NoMoreData { .. } => (StatusCode::NOT_FOUND, "NO_MORE_DATA", false),
        AllocationError::AttemptInFlight { .. } => {
            (StatusCode::CONFLICT, "ALLOCATION_IN_PROGRESS", true)
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "ALLOCATION_FAILED", false),
    }
}

fn review_parts(error: &ReviewError) -> (StatusCode, &'static str, bool) {
    match error {
        ReviewError::NoCurrentFile => (StatusCode::CONFLICT, "NO_CURRENT_FILE", false),
        ReviewError::FileNotFound { .. } => (StatusCode::NOT_FOUND, "FILE_NOT_FOUND", false),
        ReviewError::RowOutOfRange { .. } | ReviewError::RowCountMismatch { .. } => {
            (StatusCode::BAD_REQUEST, "INVALID_EDIT", false)
        }
        ReviewError::Allocation(e) => allocation_parts(e),
        ReviewError::Archive(ArchiveError::DestinationExists { .. }) => {
            (StatusCode::CONFLICT, "ALREADY_ARCHIVED", false)
        }
        ReviewError::Archive(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ARCHIVE_FAILED", false),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "REVIEW_ERROR", false),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, retryable) = self.parts();
        let message = self.to_string();

        if status.is_server_error() {
            if matches!(
                &self,
                ApiError::Allocation(e) | ApiError::Review(ReviewError::Allocation(e)) if e.is_fatal()
            ) {
                error!(code, error = %message, "Allocation bookkeeping needs attention");
            } else {
                warn!(code, error = %message, "Request failed");
            }
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
                "retryable": retryable,
            }
        }));

        if retryable && status == StatusCode::SERVICE_UNAVAILABLE {
            let retry_after = [(header::RETRY_AFTER, FETCH_RETRY_AFTER_SECS.to_string())];
            (status, retry_after, body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_core::{BatchNumber, FetchError, WorkerId};

    #[test]
    fn test_fetch_failure_is_retryable_503() {
        let error = ApiError::from(AllocationError::Fetch {
            batch: BatchNumber(2),
            source: FetchError::unavailable("down"),
        });
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }

    #[test]
    fn test_in_flight_is_conflict() {
        let error = ApiError::from(AllocationError::AttemptInFlight {
            worker: WorkerId::new("ada").unwrap(),
        });
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_nested_allocation_error_keeps_mapping() {
        let error = ApiError::from(ReviewError::Allocation(AllocationError::NoMoreData {
            batch: BatchNumber(40),
        }));
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_edit_errors_are_bad_requests() {
        let error = ApiError::from(ReviewError::RowOutOfRange { row: 9, rows: 3 });
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_uniqueness_violation_is_500() {
        let error = ApiError::from(AllocationError::UniquenessViolation {
            batch: BatchNumber(1),
            worker: WorkerId::new("ada").unwrap(),
            holder: Some(WorkerId::new("bo").unwrap()),
        });
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
