//! Input normalisation. Each helper trims, checks, and returns the value
//! to store, or a [`ApiError::Validation`] naming the field.

use civitas_types::models::{canonical_category, canonical_route};

use crate::error::{ApiError, ApiResult};

const MIN_NAME: usize = 2;
const MIN_PHONE: usize = 7;
const MIN_PASSWORD: usize = 6;

pub fn name(value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.chars().count() < MIN_NAME {
        return Err(ApiError::Validation(format!(
            "name must be at least {} characters",
            MIN_NAME
        )));
    }
    Ok(value.to_string())
}

pub fn phone(value: &str) -> ApiResult<String> {
    let value = value.trim();
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')');
    if value.chars().count() < MIN_PHONE || !value.chars().all(allowed) {
        return Err(ApiError::Validation(format!(
            "phone number must be at least {} characters of digits, spaces, '+', '-' or parentheses",
            MIN_PHONE
        )));
    }
    Ok(value.to_string())
}

/// Passwords are taken verbatim; only the length is checked.
pub fn password(value: &str) -> ApiResult<()> {
    if value.chars().count() < MIN_PASSWORD {
        return Err(ApiError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD
        )));
    }
    Ok(())
}

/// `local@domain.tld`, lowercased.
pub fn email(value: &str) -> ApiResult<String> {
    let value = value.trim().to_lowercase();
    let well_formed = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .rsplit_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    };
    if !well_formed || value.chars().any(char::is_whitespace) {
        return Err(ApiError::Validation("email address is not valid".into()));
    }
    Ok(value)
}

/// Missing or blank input reads as "no email".
pub fn optional_email(value: Option<&str>) -> ApiResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => email(value).map(Some),
    }
}

/// Trimmed text; blank becomes `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn required(field: &str, value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

pub fn route(value: &str) -> ApiResult<&'static str> {
    canonical_route(value)
        .ok_or_else(|| ApiError::Validation(format!("unknown department '{}'", value.trim())))
}

pub fn category(value: &str) -> ApiResult<&'static str> {
    canonical_category(value)
        .ok_or_else(|| ApiError::Validation(format!("unknown category '{}'", value.trim())))
}
