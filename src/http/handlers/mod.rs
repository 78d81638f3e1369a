pub mod admin;
pub mod attendance;
pub mod auth;
pub mod marks;
pub mod reports;
pub mod staff;
pub mod students;
pub mod submissions;

use crate::error::Error;

/// Trims a required request field, rejecting absent or blank values.
pub(crate) fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, Error> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Validation(format!("{name} is required"))),
    }
}

/// Trims an optional field, treating blank as absent.
pub(crate) fn clean(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}
