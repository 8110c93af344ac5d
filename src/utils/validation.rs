use crate::utils::error::{LagError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(LagError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(LagError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(LagError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

/// Non-negative and finite; regularization strengths and tolerances.
pub fn validate_non_negative(field_name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(LagError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value must be a finite, non-negative number".to_string(),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LagError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// Dataset names end up in directory names.
pub fn validate_identifier(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;
    if value.contains('/') || value.contains('\\') || value == "." || value == ".." {
        return Err(LagError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value must not contain path separators".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(LagError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("lag", 5, 1).is_ok());
        assert!(validate_positive_number("lag", 0, 1).is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative("lam_ridge", 0.0).is_ok());
        assert!(validate_non_negative("lam_ridge", 1e-3).is_ok());
        assert!(validate_non_negative("lam_ridge", -0.5).is_err());
        assert!(validate_non_negative("lam_ridge", f64::NAN).is_err());
        assert!(validate_non_negative("lam_ridge", f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("dataset", "hematopoiesis").is_ok());
        assert!(validate_identifier("dataset", "").is_err());
        assert!(validate_identifier("dataset", "../etc").is_err());
        assert!(validate_identifier("dataset", "..").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("learning_rate", 1e-4, 0.0, 1.0).is_ok());
        assert!(validate_range("learning_rate", 2.0, 0.0, 1.0).is_err());
    }
}
