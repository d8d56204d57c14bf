//! Identifier validation and quoting.
//!
//! Identifiers cannot be bound as statement parameters, so every schema, table
//! and column name that reaches a statement goes through [`quote_ident`]. Names
//! are quoted verbatim: the case returned by the catalog is preserved exactly.

use crate::error::{MigrateError, Result};

/// Maximum identifier length accepted by the warehouse.
const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and identifiers
/// exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::InvalidIdentifier(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::InvalidIdentifier(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::InvalidIdentifier(format!(
            "SECURITY: Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote an identifier with double quotes, doubling embedded quotes.
///
/// ```ignore
/// assert_eq!(quote_ident("Orders")?, "\"Orders\"");
/// assert_eq!(quote_ident("a\"b")?, "\"a\"\"b\"");
/// ```
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a schema with its database: `"db"."schema"`.
pub fn qualify_schema(database: &str, schema: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(database)?, quote_ident(schema)?))
}

/// Qualify an object with database and schema: `"db"."schema"."name"`.
pub fn qualify(database: &str, schema: &str, name: &str) -> Result<String> {
    Ok(format!(
        "{}.{}.{}",
        quote_ident(database)?,
        quote_ident(schema)?,
        quote_ident(name)?
    ))
}

/// Quote a string literal with single quotes, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Normalize a column name the way unquoted identifiers resolve in the warehouse.
pub fn normalize_column(name: &str) -> String {
    name.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("ORDERS").is_ok());
        assert!(validate_identifier("line items").is_ok());
        assert!(validate_identifier("日本語").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_invalid_identifier_does_not_end_the_run() {
        let err = quote_ident("").unwrap_err();
        assert!(matches!(err, MigrateError::InvalidIdentifier(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_identifier(&long_name).is_err());
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
    }

    #[test]
    fn test_quote_ident_preserves_case() {
        assert_eq!(quote_ident("Orders").unwrap(), "\"Orders\"");
        assert_eq!(quote_ident("orders").unwrap(), "\"orders\"");
    }

    #[test]
    fn test_quote_ident_escapes_double_quote() {
        assert_eq!(quote_ident("table\"name").unwrap(), "\"table\"\"name\"");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(
            qualify("SALES", "Public", "Orders").unwrap(),
            "\"SALES\".\"Public\".\"Orders\""
        );
        assert_eq!(qualify_schema("SALES", "RAW").unwrap(), "\"SALES\".\"RAW\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("1 DAY"), "'1 DAY'");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }
}
