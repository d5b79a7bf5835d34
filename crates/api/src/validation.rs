//! Validation of `WebGame` fields.
//!
//! Every error here describes input that cannot converge until the record
//! itself changes.

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use thiserror::Error;

/// Maximum length of a label value.
pub const MAX_LABEL_VALUE_LENGTH: usize = 63;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },

    #[error("field '{field}' is not a valid label value ({reason}): {value:?}")]
    InvalidLabelValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("field '{field}' is not a valid {rule} name ({reason}): {value:?}")]
    InvalidName {
        field: &'static str,
        rule: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("field '{field}' must not contain {found:?}")]
    ForbiddenCharacter { field: &'static str, found: char },

    #[error("invalid server port: {reason}")]
    InvalidPort { reason: String },

    #[error("replicas must not be negative, got {0}")]
    NegativeReplicas(i32),
}

impl ValidationError {
    fn invalid_label(field: &'static str, value: &str, reason: &'static str) -> Self {
        Self::InvalidLabelValue {
            field,
            value: value.to_string(),
            reason,
        }
    }

    fn invalid_name(
        field: &'static str,
        rule: &'static str,
        value: &str,
        reason: &'static str,
    ) -> Self {
        Self::InvalidName {
            field,
            rule,
            value: value.to_string(),
            reason,
        }
    }

    fn invalid_port(reason: impl Into<String>) -> Self {
        Self::InvalidPort {
            reason: reason.into(),
        }
    }
}

/// Validate a value that ends up in a label.
///
/// # Errors
/// Fails for empty values, values over 63 characters, and values that do not
/// start and end with an alphanumeric character or contain anything other
/// than alphanumerics, `-`, `_` and `.`.
pub fn validate_label_value(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }

    if value.len() > MAX_LABEL_VALUE_LENGTH {
        return Err(ValidationError::invalid_label(field, value, "longer than 63 characters"));
    }

    let edges_ok = value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !edges_ok {
        return Err(ValidationError::invalid_label(
            field,
            value,
            "must start and end with an alphanumeric character",
        ));
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if !value.chars().all(allowed) {
        return Err(ValidationError::invalid_label(
            field,
            value,
            "only alphanumerics, '-', '_' and '.' are allowed",
        ));
    }

    Ok(())
}

/// Validate a DNS-1123 label, as required for container names.
///
/// # Errors
/// Fails unless the value is 1 to 63 characters of lowercase alphanumerics
/// and `-`, starting and ending with an alphanumeric.
pub fn validate_dns1123_label(field: &'static str, value: &str) -> Result<(), ValidationError> {
    check_dns_label(field, "DNS-1123", value)
}

/// Validate a DNS-1035 label, as required for Service names.
///
/// # Errors
/// Fails for everything [`validate_dns1123_label`] rejects and for values
/// that do not start with a letter.
pub fn validate_dns1035_label(field: &'static str, value: &str) -> Result<(), ValidationError> {
    check_dns_label(field, "DNS-1035", value)?;
    if value.starts_with(|c: char| c.is_ascii_lowercase()) {
        Ok(())
    } else {
        Err(ValidationError::invalid_name(
            field,
            "DNS-1035",
            value,
            "must start with a lowercase letter",
        ))
    }
}

fn check_dns_label(field: &'static str, rule: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    if value.len() > MAX_LABEL_VALUE_LENGTH {
        return Err(ValidationError::invalid_name(field, rule, value, "longer than 63 characters"));
    }
    if !value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(ValidationError::invalid_name(
            field,
            rule,
            value,
            "only lowercase alphanumerics and '-' are allowed",
        ));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(ValidationError::invalid_name(
            field,
            rule,
            value,
            "must start and end with an alphanumeric character",
        ));
    }
    Ok(())
}

/// Validate a container image reference.
///
/// # Errors
/// Fails for empty images and images containing whitespace.
pub fn validate_image(image: &str) -> Result<(), ValidationError> {
    if image.is_empty() {
        return Err(ValidationError::EmptyField { field: "image" });
    }
    reject_whitespace("image", image)
}

/// Validate the externally visible domain.
///
/// # Errors
/// Fails for empty domains and domains containing whitespace or `/`.
pub fn validate_domain(domain: &str) -> Result<(), ValidationError> {
    if domain.is_empty() {
        return Err(ValidationError::EmptyField { field: "domain" });
    }
    reject_whitespace("domain", domain)?;
    if domain.contains('/') {
        return Err(ValidationError::ForbiddenCharacter {
            field: "domain",
            found: '/',
        });
    }
    Ok(())
}

/// Validate the index page.
///
/// # Errors
/// Fails when the page contains whitespace.
pub fn validate_index_page(index_page: &str) -> Result<(), ValidationError> {
    reject_whitespace("indexPage", index_page)
}

/// Resolve the serving port to a number.
///
/// The string form is accepted only when it holds a number; the workload
/// needs a concrete container port.
///
/// # Errors
/// Fails for ports outside `1..=65535` and non-numeric named ports.
pub fn parse_port(port: &IntOrString) -> Result<i32, ValidationError> {
    let number = match port {
        IntOrString::Int(n) => *n,
        IntOrString::String(s) => s.trim().parse::<i32>().map_err(|_| {
            ValidationError::invalid_port(format!("named port {s:?} has no numeric value"))
        })?,
    };

    if (1..=65535).contains(&number) {
        Ok(number)
    } else {
        Err(ValidationError::invalid_port(format!(
            "{number} is outside 1..=65535"
        )))
    }
}

fn reject_whitespace(field: &'static str, value: &str) -> Result<(), ValidationError> {
    match value.chars().find(|c| c.is_whitespace()) {
        Some(found) => Err(ValidationError::ForbiddenCharacter { field, found }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_value_rules() {
        assert!(validate_label_value("gameType", "2048").is_ok());
        assert!(validate_label_value("gameType", "tetris.v2_beta-1").is_ok());
        assert_eq!(
            validate_label_value("gameType", ""),
            Err(ValidationError::EmptyField { field: "gameType" })
        );
        assert!(validate_label_value("gameType", "-2048").is_err());
        assert!(validate_label_value("gameType", "2048.").is_err());
        assert!(validate_label_value("gameType", "20/48").is_err());
        assert!(validate_label_value("gameType", &"a".repeat(64)).is_err());
        assert!(validate_label_value("gameType", &"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_dns1123_label_rules() {
        assert!(validate_dns1123_label("gameType", "2048").is_ok());
        assert!(validate_dns1123_label("gameType", "tetris-v2").is_ok());
        assert!(matches!(
            validate_dns1123_label("gameType", "Tetris_v2.beta"),
            Err(ValidationError::InvalidName { rule: "DNS-1123", .. })
        ));
        assert!(validate_dns1123_label("gameType", "tetris-").is_err());
        assert!(validate_dns1123_label("gameType", &"a".repeat(64)).is_err());
        assert_eq!(
            validate_dns1123_label("gameType", ""),
            Err(ValidationError::EmptyField { field: "gameType" })
        );
    }

    #[test]
    fn test_dns1035_label_rules() {
        assert!(validate_dns1035_label("metadata.name", "sample").is_ok());
        assert!(validate_dns1035_label("metadata.name", "game-2048").is_ok());
        assert!(matches!(
            validate_dns1035_label("metadata.name", "2048"),
            Err(ValidationError::InvalidName { rule: "DNS-1035", .. })
        ));
        assert!(validate_dns1035_label("metadata.name", "Sample").is_err());
        assert!(validate_dns1035_label("metadata.name", "my.game").is_err());
    }

    #[test]
    fn test_image_rules() {
        assert!(validate_image("games/2048:latest").is_ok());
        assert!(validate_image("").is_err());
        assert_eq!(
            validate_image("games/2048 latest"),
            Err(ValidationError::ForbiddenCharacter {
                field: "image",
                found: ' '
            })
        );
    }

    #[test]
    fn test_domain_rules() {
        assert!(validate_domain("localhost").is_ok());
        assert!(validate_domain("games.example.com").is_ok());
        assert!(validate_domain("example.com/games").is_err());
        assert!(validate_domain("").is_err());
    }

    #[test]
    fn test_port_parsing() {
        assert_eq!(parse_port(&IntOrString::Int(80)), Ok(80));
        assert_eq!(parse_port(&IntOrString::String("443".into())), Ok(443));
        assert!(parse_port(&IntOrString::Int(0)).is_err());
        assert!(parse_port(&IntOrString::Int(70000)).is_err());
        assert!(parse_port(&IntOrString::String("http".into())).is_err());
    }
}
