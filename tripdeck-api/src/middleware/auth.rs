use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tripdeck_core::identity::{Identity, Role};

use crate::error::AppError;
use crate::state::AppState;

/// Claims carried by the session provider's HS256 tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub role: String,
    pub exp: usize,
}

impl From<SessionClaims> for Identity {
    fn from(claims: SessionClaims) -> Self {
        Identity::new(claims.sub, claims.email, Role::from_claim(&claims.role))
    }
}

fn authenticate(state: &AppState, req: &Request) -> Result<Identity, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = state.auth.leeway_seconds;

    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!("Rejected session token: {}", e);
        AppError::AuthenticationError("Invalid or expired session".to_string())
    })?;

    Ok(token_data.claims.into())
}

/// Requires a valid session and injects its [`Identity`].
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = authenticate(&state, &req)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Requires a valid session whose role is ADMIN or SUPER_ADMIN.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = authenticate(&state, &req)?;
    if !identity.is_admin() {
        return Err(AppError::AuthorizationError(
            "Administrator role required".to_string(),
        ));
    }
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
