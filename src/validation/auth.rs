use crate::error::{AppError, Result};

/// Longest username the `users` table accepts.
pub const MAX_USERNAME_LEN: usize = 50;

/// Validates a username.
///
/// Only consulted by the hardened credential policy.
pub fn validate_username(username: &str) -> Result<()> {
    if username.chars().count() < 3 {
        return Err(AppError::Validation(
            "Username must be at least 3 characters long".to_string(),
        ));
    }

    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }

    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Validation(
            "Username can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates a password.
pub fn validate_password(password: &str) -> Result<()> {
    let length = password.chars().count();
    if length < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    if length > 128 {
        return Err(AppError::Validation(
            "Password must be at most 128 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validates a first or last name.
pub fn validate_name(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }

    if value.chars().count() > 200 {
        return Err(AppError::Validation(format!(
            "{} must be at most 200 characters",
            field
        )));
    }

    Ok(())
}
