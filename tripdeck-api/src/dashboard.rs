use axum::{
    extract::{Query, State},
    middleware,
    routing::get,
    Extension, Json, Router,
};
use tripdeck_booking::Dashboard;
use tripdeck_core::identity::Identity;

use crate::bookings::EmailQuery;
use crate::error::AppError;
use crate::middleware::session_auth_middleware;
use crate::state::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/dashboard",
        get(get_dashboard).route_layer(middleware::from_fn_with_state(
            state.clone(),
            session_auth_middleware,
        )),
    )
}

/// Trips, stats and the activity feed for the signed-in user. Asking for
/// anyone else's email is refused, administrators included.
async fn get_dashboard(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Dashboard>, AppError> {
    let dashboard = state.dashboard.load(&identity, &query.email).await?;
    Ok(Json(dashboard))
}
