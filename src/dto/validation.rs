//! Validation helpers for DTOs.

use validator::ValidationError;

/// Rejects empty or whitespace-only strings.
///
/// # Examples
///
/// ```ignore
/// validate_not_blank("https://youtu.be/aaaaaaaaaaa") // Ok
/// validate_not_blank("   ")                          // Err
/// ```
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("value must not be blank".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("x").is_ok());
        assert!(validate_not_blank(" https://youtu.be/aaaaaaaaaaa ").is_ok());
        assert!(validate_not_blank("").is_err());
        assert!(validate_not_blank(" \t\n").is_err());
    }
}
