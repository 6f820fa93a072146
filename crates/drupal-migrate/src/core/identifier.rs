//! Identifier validation and quoting for dynamically built SQL.
//!
//! Table and column names cannot be bound as parameters, so every identifier
//! that reaches a query string goes through [`quote`]. ID map table names are
//! derived from migration ids with [`map_table_name`] and
//! [`message_table_name`].

use crate::error::{MigrateError, Result};

/// Maximum identifier length.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, null bytes and overlong names.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a SQLite identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
pub fn quote(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a possibly qualified `alias.column` reference.
pub fn quote_qualified(name: &str) -> Result<String> {
    match name.split_once('.') {
        Some((alias, column)) => Ok(format!("{}.{}", quote(alias)?, quote(column)?)),
        None => quote(name),
    }
}

/// Reduce a migration id to a safe table-name suffix.
///
/// `d6_taxonomy_term:tags` becomes `d6_taxonomy_term_tags`. Long ids are
/// truncated and suffixed with a short hash so distinct ids stay distinct.
fn table_suffix(migration_id: &str) -> String {
    let cleaned: String = migration_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    const MAX_SUFFIX: usize = 48;
    if cleaned.len() <= MAX_SUFFIX {
        return cleaned;
    }
    use sha2::{Digest, Sha256};
    let digest = hex::encode(Sha256::digest(migration_id.as_bytes()));
    format!("{}_{}", &cleaned[..MAX_SUFFIX - 9], &digest[..8])
}

/// Name of the ID map table for a migration.
pub fn map_table_name(migration_id: &str) -> String {
    format!("migrate_map_{}", table_suffix(migration_id))
}

/// Name of the message table for a migration.
pub fn message_table_name(migration_id: &str) -> String {
    format!("migrate_message_{}", table_suffix(migration_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_double_quotes() {
        assert_eq!(quote("users").unwrap(), "\"users\"");
        assert_eq!(quote("table\"name").unwrap(), "\"table\"\"name\"");
        assert!(quote("").is_err());
        assert!(quote("bad\0name").is_err());
    }

    #[test]
    fn test_quote_qualified() {
        assert_eq!(quote_qualified("td.tid").unwrap(), "\"td\".\"tid\"");
        assert_eq!(quote_qualified("tid").unwrap(), "\"tid\"");
    }

    #[test]
    fn test_map_table_names_are_deterministic() {
        assert_eq!(map_table_name("d6_taxonomy_term:tags"), "migrate_map_d6_taxonomy_term_tags");
        assert_eq!(message_table_name("d6_node_type"), "migrate_message_d6_node_type");
        let long = "d6_field_instance_per_view_mode_with_a_really_long_derivative_name";
        assert_eq!(map_table_name(long), map_table_name(long));
        assert!(map_table_name(long).len() <= "migrate_map_".len() + 48);
        assert_ne!(map_table_name(long), map_table_name(&format!("{long}2")));
    }
}
