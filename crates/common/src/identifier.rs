//! Identifier allow-list for graph labels, relationship types, aliases and property keys
//!
//! Anything that ends up structurally inside graph query text must pass [`validate_identifier`]
//! first: ASCII letters, digits and underscore, not starting with a digit, at most
//! [`MAX_IDENTIFIER_LEN`] characters. Rejections never echo the offending value.

use crate::errors::{AppError, Result};
use std::fmt;

/// Maximum identifier length in characters
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// What an identifier is used for (reported in errors)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Label,
    RelationshipType,
    Alias,
    PropertyKey,
    Column,
    Parameter,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentifierKind::Label => "label",
            IdentifierKind::RelationshipType => "relationship type",
            IdentifierKind::Alias => "alias",
            IdentifierKind::PropertyKey => "property key",
            IdentifierKind::Column => "column",
            IdentifierKind::Parameter => "parameter",
        };
        f.write_str(s)
    }
}

/// Validate an identifier against the allow-list
pub fn validate_identifier(kind: IdentifierKind, value: &str) -> Result<()> {
    let reject = |reason: String| AppError::InvalidIdentifier {
        kind: kind.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(reject("identifier is empty".to_string()));
    }

    let len = value.chars().count();
    if len > MAX_IDENTIFIER_LEN {
        return Err(reject(format!(
            "length {} exceeds limit of {}",
            len, MAX_IDENTIFIER_LEN
        )));
    }

    for (position, c) in value.chars().enumerate() {
        let allowed = c.is_ascii_alphabetic()
            || c == '_'
            || (position > 0 && c.is_ascii_digit());
        if !allowed {
            return Err(reject(format!(
                "disallowed character at position {}",
                position
            )));
        }
    }

    Ok(())
}

/// Non-failing check, for callers that only need a yes/no answer
pub fn is_valid_identifier(value: &str) -> bool {
    validate_identifier(IdentifierKind::Label, value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_identifiers() {
        for ok in ["Person", "WORKS_IN", "_internal", "Dept2", "a"] {
            assert!(is_valid_identifier(ok), "{ok} should be accepted");
        }
    }

    #[test]
    fn test_rejects_injection_attempts() {
        let attempts = [
            "Person` {name: 'x'}) DETACH DELETE n //",
            "WORKS_IN]->() MATCH (n) DELETE n;",
            "Person; DROP TABLE graph_nodes",
            "Per son",
            "Person-Admin",
            "9Lives",
            "",
        ];
        for bad in attempts {
            assert!(!is_valid_identifier(bad));
        }
    }

    #[test]
    fn test_rejects_non_ascii_and_long() {
        assert!(!is_valid_identifier("Persön"));
        assert!(!is_valid_identifier(&"A".repeat(MAX_IDENTIFIER_LEN + 1)));
        assert!(is_valid_identifier(&"A".repeat(MAX_IDENTIFIER_LEN)));
    }

    #[test]
    fn test_error_redacts_value() {
        let secret = "Label'; MATCH (n) RETURN n.password";
        let err = validate_identifier(IdentifierKind::RelationshipType, secret).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("relationship type"));
        assert!(!message.contains("password"));
        assert!(err.is_validation());
    }
}
