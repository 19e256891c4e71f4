//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted room or member display name, in characters.
pub const MAX_NAME_LENGTH: usize = 64;
/// Longest accepted external identifier, in characters.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validates that a display string carries at least one visible character.
///
/// # Examples
///
/// ```ignore
/// validate_not_blank("Sprint 12") // Ok
/// validate_not_blank("   ")       // Err
/// ```
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must contain at least one non-whitespace character".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a room or member display name: not blank and at most [`MAX_NAME_LENGTH`] characters.
pub fn validate_display_name(value: &str) -> Result<(), ValidationError> {
    validate_not_blank(value)?;

    let length = value.chars().count();
    if length > MAX_NAME_LENGTH {
        let mut err = ValidationError::new("name_length");
        err.message = Some(
            format!("Name must be at most {MAX_NAME_LENGTH} characters (got {length})").into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates an identifier supplied by a client, such as a user id.
pub fn validate_identifier(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        let mut err = ValidationError::new("identifier_empty");
        err.message = Some("Identifier must not be empty".into());
        return Err(err);
    }

    let length = value.chars().count();
    if length > MAX_IDENTIFIER_LENGTH {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!("Identifier must be at most {MAX_IDENTIFIER_LENGTH} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}
