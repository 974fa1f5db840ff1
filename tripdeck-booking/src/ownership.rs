use serde_json::Value;
use tripdeck_core::identity::Identity;

/// Where writers have put the owner's email.
const EMAIL_PATHS: &[&str] = &["/email", "/userEmail", "/user/email"];
/// Where writers have put a reference to the owning user.
const USER_REF_PATHS: &[&str] = &["/userId", "/user", "/user/id"];

pub fn owner_emails(doc: &Value) -> impl Iterator<Item = &str> {
    EMAIL_PATHS
        .iter()
        .filter_map(move |path| doc.pointer(path).and_then(Value::as_str))
        .filter(|email| !email.trim().is_empty())
}

pub fn owner_refs(doc: &Value) -> impl Iterator<Item = &str> {
    USER_REF_PATHS
        .iter()
        .filter_map(move |path| doc.pointer(path).and_then(Value::as_str))
        .filter(|id| !id.is_empty())
}

pub fn has_owner(doc: &Value) -> bool {
    owner_emails(doc).next().is_some() || owner_refs(doc).next().is_some()
}

/// True when `identifier`, an email or a user id, owns the document.
pub fn matches_identifier(doc: &Value, identifier: &str) -> bool {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return false;
    }
    owner_emails(doc).any(|email| email.trim().eq_ignore_ascii_case(identifier))
        || owner_refs(doc).any(|id| id == identifier)
}

pub fn is_owned_by(doc: &Value, identity: &Identity) -> bool {
    identity
        .email
        .as_deref()
        .is_some_and(|email| matches_identifier(doc, email))
        || identity
            .user_id
            .as_deref()
            .is_some_and(|id| owner_refs(doc).any(|owner| owner == id))
}
