// SPDX-License-Identifier: Apache-2.0

//! SQL text helpers
//!
//! Identifiers are emitted unquoted so the warehouse resolves them
//! case-insensitively (`order_header` and `ORDER_HEADER` name the same
//! table). Anything that would need quoting is rejected instead.

use crate::engine::error::{EngineError, EngineResult};

/// Checks that `name` is a plain identifier, optionally dotted
/// (`RAW_POS.ORDER_DETAIL`), and returns it unchanged
pub fn validate_identifier(name: &str) -> EngineResult<&str> {
    if name.is_empty() {
        return Err(EngineError::validation("identifier must not be empty"));
    }

    for part in name.split('.') {
        let mut chars = part.chars();
        let valid_start = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if !valid_start || !valid_rest {
            return Err(EngineError::validation(format!(
                "invalid identifier '{}'",
                name
            )));
        }
    }

    Ok(name)
}

/// Formats a string as a single-quoted SQL literal
pub fn quote_literal(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 2);
    escaped.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("''"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(ch),
        }
    }
    escaped.push('\'');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_dotted_identifiers() {
        assert!(validate_identifier("order_header").is_ok());
        assert!(validate_identifier("RAW_POS.ORDER_DETAIL").is_ok());
        assert!(validate_identifier("_tmp$1").is_ok());
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        for bad in ["", "1table", "a b", "x;drop", "a..b", "\"quoted\"", "RAW_POS."] {
            assert!(validate_identifier(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn literal_escaping() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("a\\b\nc"), "'a\\\\b\\nc'");
    }
}
