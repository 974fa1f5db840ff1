use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Maps a session role claim onto a role. `ADMIN` and `SUPER_ADMIN` grant
    /// administrator privilege, anything else is a regular user.
    pub fn from_claim(claim: &str) -> Self {
        match claim.to_ascii_uppercase().as_str() {
            "ADMIN" | "SUPER_ADMIN" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// The caller of an operation, as vouched for by the session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: Some(user_id.into()),
            email: Some(email.into()),
            role,
        }
    }

    /// An identity known only by the email it claims, e.g. from a query string.
    pub fn from_email(email: impl Into<String>) -> Self {
        Self {
            user_id: None,
            email: Some(email.into()),
            role: Role::User,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Best identifier for audit entries: the user id, else the email.
    pub fn actor(&self) -> String {
        self.user_id
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    /// True when `email` names the same account, ignoring ASCII case.
    pub fn has_email(&self, email: &str) -> bool {
        self.email
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(email.trim()))
    }
}
