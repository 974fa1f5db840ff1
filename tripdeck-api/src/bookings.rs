use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use tripdeck_booking::{normalize, normalize::normalize_all, store::ensure_access, NormalizedBooking};
use tripdeck_core::{identity::Identity, pii::Masked, CoreError};

use crate::error::AppError;
use crate::middleware::{admin_auth_middleware, session_auth_middleware};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct OwnerDeleteQuery {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let session = middleware::from_fn_with_state(state.clone(), session_auth_middleware);
    let admin = middleware::from_fn_with_state(state.clone(), admin_auth_middleware);

    Router::new()
        .route(
            "/bookings",
            get(list_bookings).post(create_booking).delete(delete_own_booking),
        )
        .route(
            "/bookings/{id}",
            get(get_booking)
                .route_layer(session.clone())
                .merge(put(update_booking).delete(delete_booking).route_layer(admin)),
        )
        .route(
            "/bookings/{id}/cancel",
            post(cancel_booking).route_layer(session),
        )
}

async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Vec<NormalizedBooking>>, AppError> {
    let documents = state.bookings.find_by_user(query.email.trim()).await?;
    info!("Listed {} bookings for {}", documents.len(), Masked(&query.email));
    Ok(Json(normalize_all(&documents)))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let created = state.bookings.create(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Owner self-service delete; the email in the query acts as the identity.
async fn delete_own_booking(
    State(state): State<AppState>,
    Query(query): Query<OwnerDeleteQuery>,
) -> Result<Json<Value>, AppError> {
    let identity = Identity::from_email(query.email.trim());
    state.bookings.delete(&query.id, &identity).await?;
    Ok(Json(json!({ "success": true })))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<NormalizedBooking>, AppError> {
    let document = state.bookings.find(&id).await?;
    ensure_access(&document, &identity)?;
    Ok(Json(normalize(&document)))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let request: CancelRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CancelRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::from(CoreError::invalid("body", e.to_string())))?
    };

    let document = state.bookings.find(&id).await?;
    ensure_access(&document, &identity)?;

    let cancelled = state
        .bookings
        .cancel(&id, &identity.actor(), request.reason.as_deref())
        .await?;
    Ok(Json(cancelled))
}

async fn update_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(delta): Json<Value>,
) -> Result<Json<Value>, AppError> {
    info!("Admin {} updating booking {}", identity.actor(), id);
    let updated = state.bookings.update(&id, delta).await?;
    Ok(Json(updated))
}

async fn delete_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.bookings.delete(&id, &identity).await?;
    Ok(Json(json!({ "success": true })))
}
