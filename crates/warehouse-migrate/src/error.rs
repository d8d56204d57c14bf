//! Error types for the migration library.
//!
//! Errors are split by the unit of work they abort. Only [`MigrateError::is_fatal`]
//! errors stop a run; everything else is caught by the schema or table loop that
//! owns the unit and turned into a reported skip.

use thiserror::Error;

use crate::session::SessionError;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connectivity failures.
pub const EXIT_CONNECTIVITY_ERROR: u8 = 2;
/// Exit code for any other unrecoverable failure.
pub const EXIT_RUNTIME_ERROR: u8 = 3;
/// Exit code for artifact or config file I/O failures.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The warehouse could not be reached or rejected the credentials.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// A database or schema could not be listed.
    #[error("Cannot list {scope}: {message}")]
    CatalogAccess { scope: String, message: String },

    /// The warehouse cannot produce a definition for this object.
    #[error("Definition not available for {table}: {message}")]
    DefinitionUnsupported { table: String, message: String },

    /// A query against a table failed.
    #[error("Query failed for {table}: {message}")]
    QueryExecution { table: String, message: String },

    /// A table could not be created from its definition or fallback schema.
    #[error("Cannot create {table}: {message}")]
    StructureCreation { table: String, message: String },

    /// A name cannot be quoted as an identifier (empty, null byte, too long).
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A CSV artifact whose records do not line up with its header.
    #[error("Malformed artifact {path}: {message}")]
    MalformedArtifact { path: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MigrateError {
    /// Create a CatalogAccess error for the given scope (database or schema).
    pub fn catalog_access(scope: impl Into<String>, err: SessionError) -> Self {
        match err {
            SessionError::Connectivity(msg) => MigrateError::Connectivity(msg),
            other => MigrateError::CatalogAccess {
                scope: scope.into(),
                message: other.to_string(),
            },
        }
    }

    /// Create a QueryExecution error, escalating connectivity failures.
    pub fn query(table: impl Into<String>, err: SessionError) -> Self {
        match err {
            SessionError::Connectivity(msg) => MigrateError::Connectivity(msg),
            other => MigrateError::QueryExecution {
                table: table.into(),
                message: other.to_string(),
            },
        }
    }

    /// Create a StructureCreation error, escalating connectivity failures.
    pub fn structure(table: impl Into<String>, err: SessionError) -> Self {
        match err {
            SessionError::Connectivity(msg) => MigrateError::Connectivity(msg),
            other => MigrateError::StructureCreation {
                table: table.into(),
                message: other.to_string(),
            },
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MigrateError::Connectivity(_) | MigrateError::Config(_))
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::InvalidIdentifier(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connectivity(_) | MigrateError::Http(_) => EXIT_CONNECTIVITY_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            _ => EXIT_RUNTIME_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_escalates() {
        let err = MigrateError::query("DB.S.T", SessionError::Connectivity("reset".into()));
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), EXIT_CONNECTIVITY_ERROR);
    }

    #[test]
    fn test_table_errors_are_not_fatal() {
        let err = MigrateError::query("DB.S.T", SessionError::Execution("boom".into()));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("DB.S.T"));

        let err = MigrateError::structure("DB.S.T", SessionError::NotFound("nope".into()));
        assert!(matches!(err, MigrateError::StructureCreation { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_invalid_identifier_is_scoped_to_its_table() {
        let err = MigrateError::InvalidIdentifier("Identifier cannot be empty".into());
        assert!(!err.is_fatal());
        assert_eq!(err.exit_code(), EXIT_CONFIG_ERROR);

        let err = MigrateError::MalformedArtifact {
            path: "data/T.csv".into(),
            message: "line 2 has 3 fields".into(),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("data/T.csv"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }
}
