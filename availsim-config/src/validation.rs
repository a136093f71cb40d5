//! Custom validation functions shared by the configuration sections.

use validator::ValidationError;

/// Validate that a given value is a power of two.
pub fn validate_power_of_two(value: usize) -> Result<(), ValidationError> {
    if value.is_power_of_two() {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_power_of_two"))
    }
}

/// Validate a plain tracing level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powers_of_two() {
        assert!(validate_power_of_two(1024).is_ok());
        assert!(validate_power_of_two(1000).is_err());
    }

    #[test]
    fn log_levels_are_case_insensitive() {
        assert!(validate_log_level("WARN").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }
}
