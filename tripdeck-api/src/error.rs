use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tripdeck_core::{CoreError, ValidationErrors};

use crate::state::AppState;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(ValidationErrors),
    NotFoundError(String),
    InternalServerError(String),
}

/// The suppressed cause of a 500, carried on the response for
/// [`expose_error_details`].
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(errors) => AppError::ValidationError(errors),
            CoreError::NotFound(id) => AppError::NotFoundError(format!("Booking not found: {}", id)),
            CoreError::Forbidden(msg) => AppError::AuthorizationError(msg),
            CoreError::Persistence(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body, detail) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg }), None),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg }), None),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg }), None),
            // Booking validation failures are published as 500s with field detail.
            AppError::ValidationError(errors) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Validation failed", "validationErrors": errors }),
                None,
            ),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                    Some(ErrorDetail(msg)),
                )
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(detail);
        }
        response
    }
}

/// In development, re-renders 500 responses with the suppressed cause.
pub async fn expose_error_details(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;
    if !state.expose_error_details {
        return response;
    }
    match response.extensions().get::<ErrorDetail>().cloned() {
        Some(ErrorDetail(detail)) => (
            response.status(),
            Json(json!({ "error": "Internal Server Error", "details": detail })),
        )
            .into_response(),
        None => response,
    }
}
