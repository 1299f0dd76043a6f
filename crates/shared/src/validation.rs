//! Common validation utilities.

use validator::ValidationError;

/// Maximum length of a student identifier.
pub const MAX_STUDENT_ID_LENGTH: usize = 64;

/// Minimum and maximum number of digits in a kiosk passcode.
const PASSCODE_MIN_DIGITS: usize = 4;
const PASSCODE_MAX_DIGITS: usize = 12;

/// Validates that a student identifier is usable as a QR payload and lookup key.
/// - Must not be blank
/// - Must not exceed 64 characters
/// - Must not contain control characters (line breaks break QR scanners' keyboard wedge mode)
pub fn validate_student_id(student_id: &str) -> Result<(), ValidationError> {
    let trimmed = student_id.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("student_id_blank");
        err.message = Some("Student ID cannot be blank".into());
        return Err(err);
    }

    if trimmed.chars().count() > MAX_STUDENT_ID_LENGTH {
        let mut err = ValidationError::new("student_id_length");
        err.message = Some("Student ID must be at most 64 characters".into());
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("student_id_characters");
        err.message = Some("Student ID cannot contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a value is not empty after trimming whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value cannot be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates that a kiosk passcode consists of 4 to 12 ASCII digits.
pub fn validate_passcode(passcode: &str) -> Result<(), ValidationError> {
    let len = passcode.len();
    if (PASSCODE_MIN_DIGITS..=PASSCODE_MAX_DIGITS).contains(&len)
        && passcode.chars().all(|c| c.is_ascii_digit())
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("passcode_format");
        err.message = Some("Passcode must be 4-12 digits".into());
        Err(err)
    }
}

/// Normalizes an email address for lookups (trimmed, lowercase).
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
