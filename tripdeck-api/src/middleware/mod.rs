pub mod auth;

pub use auth::{admin_auth_middleware, session_auth_middleware, SessionClaims};
