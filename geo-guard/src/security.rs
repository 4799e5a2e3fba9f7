//! Guards for the SQL this crate generates.
//!
//! Every statement the checks send to the store is assembled with `format!`.
//! View names, string literals taken from exception registries and regex
//! patterns pass through [`SqlSecurity`] before they are interpolated.

use crate::error::{GeoError, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// SQL identifier and literal validation utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates an identifier and wraps it in double quotes.
    ///
    /// ```rust
    /// use geo_guard::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("insee_communes").unwrap(), "\"insee_communes\"");
    /// assert!(SqlSecurity::escape_identifier("communes; DROP TABLE x").is_err());
    /// ```
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;
        Ok(format!("\"{identifier}\""))
    }

    /// Validates a SQL identifier without escaping it.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(GeoError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > 128 {
            return Err(GeoError::SecurityError(
                "SQL identifier too long (max 128 characters)".to_string(),
            ));
        }

        static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("Hard-coded regex pattern should be valid")
        });

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(GeoError::SecurityError(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers and underscores"
            )));
        }

        Self::check_dangerous_patterns(identifier)
    }

    /// Quotes a string literal, doubling embedded single quotes.
    ///
    /// ```rust
    /// use geo_guard::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::quote_literal("L'Haÿ-les-Roses").unwrap(), "'L''Haÿ-les-Roses'");
    /// ```
    pub fn quote_literal(value: &str) -> Result<String> {
        if value.contains('\0') {
            return Err(GeoError::SecurityError(
                "SQL literal cannot contain null bytes".to_string(),
            ));
        }
        Ok(format!("'{}'", value.replace('\'', "''")))
    }

    /// Renders an optional string as a quoted literal or `NULL`.
    pub fn quote_optional(value: Option<&str>) -> Result<String> {
        match value {
            Some(v) => Self::quote_literal(v),
            None => Ok("NULL".to_string()),
        }
    }

    /// Renders a date as a typed SQL literal or `NULL`.
    pub fn date_literal(date: Option<NaiveDate>) -> String {
        match date {
            Some(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
            None => "CAST(NULL AS DATE)".to_string(),
        }
    }

    /// Validates a regex pattern and escapes it for use inside a SQL literal.
    pub fn validate_regex_pattern(pattern: &str) -> Result<String> {
        if pattern.len() > 1000 {
            return Err(GeoError::SecurityError(
                "Regex pattern too long (max 1000 characters)".to_string(),
            ));
        }

        if pattern.contains('\0') {
            return Err(GeoError::SecurityError(
                "Regex pattern cannot contain null bytes".to_string(),
            ));
        }

        if let Err(e) = Regex::new(pattern) {
            return Err(GeoError::SecurityError(format!(
                "Invalid regex pattern: {e}"
            )));
        }

        for dangerous in ["(.*)*", "(.*)+", "(a+)+", "(a*)*"] {
            if pattern.contains(dangerous) {
                return Err(GeoError::SecurityError(
                    "Regex pattern might cause catastrophic backtracking".to_string(),
                ));
            }
        }

        Ok(pattern.replace('\'', "''"))
    }

    fn check_dangerous_patterns(identifier: &str) -> Result<()> {
        let lower = identifier.to_lowercase();
        let dangerous_patterns = [
            "xp_", "union", "select", "insert", "update", "delete", "drop", "create", "alter",
            "exec", "declare",
        ];

        for pattern in dangerous_patterns {
            if lower.contains(pattern) {
                return Err(GeoError::SecurityError(format!(
                    "SQL identifier contains dangerous pattern: '{pattern}'"
                )));
            }
        }

        Ok(())
    }
}
