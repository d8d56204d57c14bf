//! Table definition export with environment-specific clauses removed.
//!
//! A definition is filtered line by line. Structural lines (the `CREATE ...
//! TABLE` header, `ALTER TABLE`, closing parentheses) are always kept. Other
//! lines containing a configured marker are replaced with a placeholder
//! comment, remaining non-empty lines are kept, and empty lines are dropped.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::SanitizerConfig;
use crate::core::{quote_literal, TableRef};
use crate::error::{MigrateError, Result};
use crate::session::{Session, SessionError};

/// Line filter for exported definitions.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    markers: Vec<String>,
    placeholder: String,
}

impl Sanitizer {
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            markers: config.markers.iter().map(|m| m.to_uppercase()).collect(),
            placeholder: config.placeholder.clone(),
        }
    }

    /// Filter a definition. The result ends with a newline.
    pub fn sanitize(&self, ddl: &str) -> String {
        let mut out = String::with_capacity(ddl.len());
        for line in ddl.lines() {
            if is_structural(line) {
                out.push_str(line);
            } else if line.trim().is_empty() {
                continue;
            } else if self.is_marked(line) {
                out.push_str(&self.placeholder);
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }
        out
    }

    fn is_marked(&self, line: &str) -> bool {
        let upper = line.to_uppercase();
        self.markers.iter().any(|m| upper.contains(m.as_str()))
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(&SanitizerConfig::default())
    }
}

fn is_structural(line: &str) -> bool {
    let trimmed = line.trim_start();
    let upper = trimmed.to_uppercase();
    trimmed.starts_with(')')
        || upper.contains("CREATE TABLE")
        || upper.contains("ALTER TABLE")
        || (upper.starts_with("CREATE ") && upper.contains(" TABLE "))
}

/// Fetch a table's definition, sanitize it and write it to `path`.
///
/// Returns whether an artifact was written. An object whose definition the
/// warehouse cannot produce, or an empty definition, writes nothing; only
/// connectivity and file errors are returned.
pub async fn export_definition(
    session: &dyn Session,
    table: &TableRef,
    sanitizer: &Sanitizer,
    path: &Path,
) -> Result<bool> {
    let sql = format!("SELECT GET_DDL('TABLE', {})", quote_literal(&table.qualified()?));

    let ddl = match session.execute(&sql).await {
        Ok(rs) => rs.scalar_text().unwrap_or_default(),
        Err(SessionError::Unsupported(message)) => {
            let err = MigrateError::DefinitionUnsupported {
                table: table.to_string(),
                message,
            };
            info!("{}", err);
            return Ok(false);
        }
        Err(e) => {
            let err = MigrateError::query(table.to_string(), e);
            if err.is_fatal() {
                return Err(err);
            }
            warn!("No definition written: {}", err);
            return Ok(false);
        }
    };

    if ddl.trim().is_empty() {
        debug!("Empty definition for {}, nothing written", table);
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, sanitizer.sanitize(&ddl))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;
    use tempfile::TempDir;

    #[test]
    fn test_one_marker_line_in_ten() {
        let ddl = "create or replace TABLE ORDERS (\n\
                   \tID NUMBER(38,0),\n\
                   \n\
                   \tCUSTOMER VARCHAR(100),\n\
                   \tAMOUNT NUMBER(10,2),\n\
                   \tCREATED_AT TIMESTAMP_NTZ(9),\n\
                   \tSTATUS VARCHAR(20),\n\
                   \n\
                   \tREGION VARCHAR(10)\n\
                   )\n\
                   stage_file_format = (TYPE = CSV)\n\
                   COMMENT = 'orders';";
        let out = Sanitizer::default().sanitize(ddl);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 10);
        let placeholders = lines
            .iter()
            .filter(|l| **l == "  -- (omitted account-specific clause)")
            .count();
        assert_eq!(placeholders, 1);
        assert_eq!(lines[0], "create or replace TABLE ORDERS (");
        assert_eq!(lines[1], "\tID NUMBER(38,0),");
        assert_eq!(lines[7], ")");
        assert_eq!(lines[9], "COMMENT = 'orders';");
        assert!(!out.contains("\n\n"));
    }

    #[test]
    fn test_structural_lines_win_over_markers() {
        let out = Sanitizer::default().sanitize("create or replace TABLE ACCOUNTS (\n\tID NUMBER\n) stage_copy_options = ()");
        assert_eq!(out, "create or replace TABLE ACCOUNTS (\n\tID NUMBER\n) stage_copy_options = ()\n");
    }

    #[test]
    fn test_markers_are_case_insensitive_and_configurable() {
        let config = SanitizerConfig {
            markers: vec!["region".into()],
            placeholder: "-- removed".into(),
        };
        let out = Sanitizer::new(&config).sanitize("\tREGION VARCHAR,\n\tstage_x INT");
        assert_eq!(out, "-- removed\n\tstage_x INT\n");
    }

    #[tokio::test]
    async fn test_export_definition_writes_sanitized_artifact() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("schema").join("T.sql");
        let session = MemorySession::new();
        session.add_table("LAB", "RAW", "T", &["A"], Vec::new());
        session.set_definition(
            "LAB",
            "RAW",
            "T",
            "create or replace TABLE T (\n\tA VARCHAR\n)\nwith storage_integration = INT1;",
        );

        let written = export_definition(&session, &TableRef::new("LAB", "RAW", "T"), &Sanitizer::default(), &path)
            .await
            .unwrap();
        assert!(written);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "create or replace TABLE T (\n\tA VARCHAR\n)\n  -- (omitted account-specific clause)\n"
        );
        assert_eq!(
            session.statements()[0],
            "SELECT GET_DDL('TABLE', '\"LAB\".\"RAW\".\"T\"')"
        );
    }

    #[tokio::test]
    async fn test_unsupported_definition_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("T.sql");
        let session = MemorySession::new();
        session.add_table("SHARED", "RAW", "T", &["A"], Vec::new());
        session.set_definition_unsupported("SHARED", "RAW", "T");

        let written = export_definition(&session, &TableRef::new("SHARED", "RAW", "T"), &Sanitizer::default(), &path)
            .await
            .unwrap();
        assert!(!written);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_definition_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("T.sql");
        let session = MemorySession::new();
        session.add_table("LAB", "RAW", "T", &["A"], Vec::new());
        session.set_definition("LAB", "RAW", "T", "  \n");

        let written = export_definition(&session, &TableRef::new("LAB", "RAW", "T"), &Sanitizer::default(), &path)
            .await
            .unwrap();
        assert!(!written);
        assert!(!path.exists());
    }
}
