use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use ridepool_engine::{EngineError, StoreError};

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    Engine(EngineError),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Engine(EngineError::Store(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Engine(err) => engine_response(err),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

fn engine_response(err: EngineError) -> (StatusCode, String) {
    match &err {
        EngineError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        EngineError::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string()),
        EngineError::InsufficientSeats { .. }
        | EngineError::ReferenceAlreadyUsed
        | EngineError::AlreadyTerminal { .. } => (StatusCode::CONFLICT, err.to_string()),
        EngineError::InvalidReference(_)
        | EngineError::DepartureNotReached
        | EngineError::InvalidSeatCount => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        EngineError::InvariantViolation { .. } | EngineError::Store(_) => {
            tracing::error!("Internal Server Error: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            )
        }
    }
}
