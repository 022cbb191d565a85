//! Validation for names accepted from serialized data.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum IdentifierValidationError {
    #[error("`{0}` is not a valid identifier")]
    Invalid(String),
}

/// A regex that matches only valid template and declaration identifiers.
static IDENTIFIER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("regex should be valid"));

/// Returns an error if the given name is not a valid identifier.
pub fn validate_identifier(identifier: &str) -> Result<(), IdentifierValidationError> {
    if IDENTIFIER_REGEX.is_match(identifier) {
        Ok(())
    } else {
        Err(IdentifierValidationError::Invalid(identifier.to_string()))
    }
}
