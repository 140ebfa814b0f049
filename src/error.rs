//! HTTP error bodies and the mapping from domain errors.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::SessionError;
use crate::reservation::ReservationError;
use crate::store::StoreError;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    #[schema(example = "Slot is already reserved")]
    pub error: String,
    #[schema(example = "SLOT_ALREADY_RESERVED")]
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn bad_request(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(error, code)))
    }

    pub fn unauthorized(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::UNAUTHORIZED, Json(Self::new(error, code)))
    }

    pub fn forbidden(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::FORBIDDEN, Json(Self::new(error, code)))
    }

    pub fn not_found(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::NOT_FOUND, Json(Self::new(error, code)))
    }

    pub fn conflict(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::CONFLICT, Json(Self::new(error, code)))
    }

    pub fn internal(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(error, code)),
        )
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// Infrastructure failures never leak driver details to the client.
pub fn storage_error(err: &StoreError) -> (StatusCode, Json<ApiError>) {
    error!(error = %err, "Storage failure");
    match err {
        StoreError::Unavailable { .. } => {
            ApiError::internal("Database connection error", "DB_CONNECTION_ERROR")
        }
        _ => ApiError::internal("Database error", "DB_ERROR"),
    }
}

impl From<ReservationError> for (StatusCode, Json<ApiError>) {
    fn from(err: ReservationError) -> Self {
        let code = err.code();
        match &err {
            ReservationError::SlotNotFound => ApiError::not_found("Slot not found", code),
            ReservationError::AlreadyReserved | ReservationError::RaceLost => {
                ApiError::conflict("Slot is already reserved", code)
            }
            ReservationError::InvalidWindow
            | ReservationError::QuotaExceeded { .. }
            | ReservationError::MixedDay
            | ReservationError::NonContiguous
            | ReservationError::TooLate => ApiError::bad_request(err.to_string(), code),
            ReservationError::NotOwner => ApiError::forbidden(err.to_string(), code),
            ReservationError::Storage(store) => storage_error(store),
        }
    }
}

impl From<SessionError> for (StatusCode, Json<ApiError>) {
    fn from(err: SessionError) -> Self {
        match &err {
            SessionError::InvalidToken => {
                ApiError::unauthorized("Invalid or expired token", "INVALID_TOKEN")
            }
            SessionError::Signing(message) => {
                error!(error = %message, "Token generation failed");
                ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
            }
            SessionError::Storage(store) => storage_error(store),
        }
    }
}
