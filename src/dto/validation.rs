//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a chat color is a `#rrggbb` hex triplet.
///
/// # Examples
///
/// ```ignore
/// validate_color("#9146ff") // Ok
/// validate_color("#9146FF") // Ok
/// validate_color("9146ff")  // Err - missing '#'
/// validate_color("#914")    // Err - too short
/// ```
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    let Some(hex) = color.strip_prefix('#') else {
        let mut err = ValidationError::new("color_prefix");
        err.message = Some("Color must start with '#'".into());
        return Err(err);
    };

    if hex.len() != 6 {
        let mut err = ValidationError::new("color_length");
        err.message = Some(
            format!(
                "Color must have exactly 6 hexadecimal digits (got {})",
                hex.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut err = ValidationError::new("color_format");
        err.message = Some("Color must contain only hexadecimal digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_color_valid() {
        assert!(validate_color("#9146ff").is_ok());
        assert!(validate_color("#FF4500").is_ok());
        assert!(validate_color("#000000").is_ok());
    }

    #[test]
    fn test_validate_color_invalid_length() {
        assert!(validate_color("#fff").is_err());
        assert!(validate_color("#9146ff0").is_err());
        assert!(validate_color("#").is_err());
    }

    #[test]
    fn test_validate_color_invalid_format() {
        assert!(validate_color("9146ff").is_err()); // missing prefix
        assert!(validate_color("#9146fg").is_err()); // invalid hex
        assert!(validate_color("#91 6ff").is_err()); // space
    }
}
