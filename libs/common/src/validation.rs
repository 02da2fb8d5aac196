//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::error::AccountError;

/// Fail with `BadRequest` if any field is empty after trimming
pub fn require_fields(fields: &[&str]) -> Result<(), AccountError> {
    if fields.iter().any(|field| field.trim().is_empty()) {
        return Err(AccountError::bad_request("All fields are required"));
    }
    Ok(())
}

/// Validate username
pub fn validate_username(username: &str) -> Result<(), AccountError> {
    if username.is_empty() {
        return Err(AccountError::bad_request("Username is required"));
    }

    if username.len() < 3 {
        return Err(AccountError::bad_request(
            "Username must be at least 3 characters long",
        ));
    }

    if username.len() > 32 {
        return Err(AccountError::bad_request(
            "Username must be at most 32 characters long",
        ));
    }

    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("Failed to compile username regex"));

    if !regex.is_match(username) {
        return Err(AccountError::bad_request(
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), AccountError> {
    if email.is_empty() {
        return Err(AccountError::bad_request("Email is required"));
    }

    if email.len() > 254 {
        return Err(AccountError::bad_request(
            "Email must be at most 254 characters long",
        ));
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err(AccountError::bad_request("Invalid email format"));
    }

    Ok(())
}
