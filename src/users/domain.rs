// Registration input and its validation rules. Pure; no storage access.
use serde::Deserialize;

use crate::db::models::Role;
use crate::error::{AppError, AppResult};

pub const MAX_NAME_CHARS: usize = 50;
pub const MIN_PASSWORD_CHARS: usize = 8;

/// Untrusted registration payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

/// A registration that passed validation. The password is still plaintext
/// here; hashing happens in the identity store.
#[derive(Debug, Clone)]
pub struct ValidRegistration {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
    pub role: Role,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Registration {
    pub fn validate(&self) -> AppResult<ValidRegistration> {
        let fields = [
            ("name", present(&self.name)),
            ("email", present(&self.email)),
            ("phoneNumber", present(&self.phone_number)),
            // Passwords are not trimmed, but must not be blank
            ("password", present(&self.password)),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let name = present(&self.name).unwrap_or_default().to_string();
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(AppError::Validation(format!(
                "Name cannot exceed {MAX_NAME_CHARS} characters"
            )));
        }

        let email = present(&self.email).unwrap_or_default().to_lowercase();
        if !is_valid_email(&email) {
            return Err(AppError::Validation("Invalid email format".into()));
        }

        let phone_number = present(&self.phone_number).unwrap_or_default().to_string();
        if !is_valid_phone(&phone_number) {
            return Err(AppError::Validation("Invalid phone number format".into()));
        }

        let password = self.password.clone().unwrap_or_default();
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AppError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }

        let role = match present(&self.role) {
            Some(raw) => raw.parse::<Role>().map_err(AppError::Validation)?,
            None => Role::User,
        };

        Ok(ValidRegistration {
            name,
            email,
            phone_number,
            password,
            role,
        })
    }
}

/// `local@domain.tld` with no whitespace and exactly one `@`.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Optional `+`, an optional parenthesised 1–4 digit group, then at least
/// nine digits or separators (space, `-`, `.`, `/`).
pub fn is_valid_phone(phone: &str) -> bool {
    let rest = phone.strip_prefix('+').unwrap_or(phone);
    let rest = rest.strip_prefix('(').unwrap_or(rest);
    let separator_or_digit =
        |c: char| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '-' | '.' | '/');

    if let Some(close) = rest.find(')') {
        let (group, tail) = (&rest[..close], &rest[close + 1..]);
        return (1..=4).contains(&group.len())
            && group.chars().all(|c| c.is_ascii_digit())
            && tail.chars().count() >= 9
            && tail.chars().all(separator_or_digit);
    }

    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => {}
        _ => return false,
    }
    let tail: Vec<char> = chars.collect();
    tail.len() >= 9 && tail.into_iter().all(separator_or_digit)
}
