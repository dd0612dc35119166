//! models/identity_model.rs
//! Normalización canónica de identidades (email, teléfono, usuario de Instagram).
//! La forma normalizada es la llave del ledger.

use serde::{Deserialize, Serialize};

use crate::error::{OutreachError, OutreachResult};

pub const PHONE_MIN_DIGITS: usize = 8;
pub const PHONE_MAX_DIGITS: usize = 15;
const HANDLE_MAX_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityKind {
    Email,
    Phone,
    Handle,
}

impl IdentityKind {
    pub fn normalize(self, raw: &str) -> OutreachResult<String> {
        match self {
            IdentityKind::Email => normalize_email(raw),
            IdentityKind::Phone => normalize_phone(raw),
            IdentityKind::Handle => normalize_handle(raw),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IdentityKind::Email => "Email",
            IdentityKind::Phone => "Phone",
            IdentityKind::Handle => "Username",
        }
    }
}

/// Quita espacios, guiones, '+' y paréntesis; el resto debe ser 8-15 dígitos.
pub fn normalize_phone(raw: &str) -> OutreachResult<String> {
    if raw.trim().is_empty() {
        return Err(OutreachError::invalid_identity(
            raw,
            "phone number cannot be empty",
        ));
    }

    let normalized: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '+' | '(' | ')'))
        .collect();

    if !normalized.chars().all(|c| c.is_ascii_digit()) {
        return Err(OutreachError::invalid_identity(
            raw,
            "invalid phone number format",
        ));
    }
    if !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&normalized.len()) {
        return Err(OutreachError::invalid_identity(
            raw,
            format!(
                "phone number length must be {}-{} digits, got {}",
                PHONE_MIN_DIGITS,
                PHONE_MAX_DIGITS,
                normalized.len()
            ),
        ));
    }
    Ok(normalized)
}

pub fn normalize_email(raw: &str) -> OutreachResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(OutreachError::invalid_identity(raw, "email cannot be empty"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(OutreachError::invalid_identity(
            raw,
            "email contains whitespace",
        ));
    }

    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => {
            return Err(OutreachError::invalid_identity(
                raw,
                "email must contain exactly one '@'",
            ))
        }
    };

    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2 && labels.iter().all(|label| !label.is_empty());
    if local.is_empty() || !domain_ok {
        return Err(OutreachError::invalid_identity(
            raw,
            "email must have a local part and a dotted domain",
        ));
    }
    Ok(email)
}

pub fn normalize_handle(raw: &str) -> OutreachResult<String> {
    let handle = raw.trim().trim_start_matches('@').to_lowercase();
    if handle.is_empty() || handle.len() > HANDLE_MAX_LEN {
        return Err(OutreachError::invalid_identity(
            raw,
            format!("username must be 1-{} characters", HANDLE_MAX_LEN),
        ));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_')
    {
        return Err(OutreachError::invalid_identity(
            raw,
            "username may only contain letters, digits, '.' and '_'",
        ));
    }
    Ok(handle)
}
