//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactLayout;
use crate::tasks::TaskDefinition;

/// Host suffix users often paste into the account field.
const ACCOUNT_HOST_SUFFIX: &str = ".snowflakecomputing.com";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Warehouse connection (the session provider's input).
    pub connection: ConnectionConfig,

    /// Export behavior.
    #[serde(default)]
    pub export: ExportConfig,

    /// Import behavior.
    #[serde(default)]
    pub import: ImportConfig,

    /// Definition sanitizer settings.
    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    /// Task capture and replay.
    #[serde(default)]
    pub tasks: TasksConfig,
}

/// Warehouse connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Account identifier, with or without the `.snowflakecomputing.com` suffix.
    pub account: String,

    /// Login name.
    pub user: String,

    /// Programmatic access token. Usually supplied on the command line or via
    /// the environment instead of the file.
    #[serde(default, skip_serializing)]
    pub token: String,

    /// Virtual warehouse used to run statements.
    pub warehouse: String,

    /// Role to assume (account default if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Default database.
    pub database: String,

    /// Default schema.
    pub schema: String,

    /// Statement timeout in seconds (default: 300).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Allow the bulk transfer primitive (default: true).
    #[serde(default = "default_true")]
    pub bulk_transfer: bool,
}

impl ConnectionConfig {
    /// Account identifier without the host suffix.
    pub fn account_identifier(&self) -> String {
        let account = self.account.trim();
        let account = account
            .strip_prefix("https://")
            .unwrap_or(account)
            .trim_end_matches('/');
        account
            .strip_suffix(ACCOUNT_HOST_SUFFIX)
            .unwrap_or(account)
            .to_string()
    }

    /// Base URL of the account's SQL API.
    pub fn base_url(&self) -> String {
        format!("https://{}{}", self.account_identifier(), ACCOUNT_HOST_SUFFIX)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("token", &"[REDACTED]")
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("timeout_secs", &self.timeout_secs)
            .field("bulk_transfer", &self.bulk_transfer)
            .finish()
    }
}

/// Export behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Database to export (default: connection database).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Schemas to export (default: connection schema).
    #[serde(default)]
    pub schemas: Vec<String>,

    /// Export every schema in the database.
    #[serde(default)]
    pub all_schemas: bool,

    /// Maximum rows per table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Artifact layout (default: flat for one schema, nested otherwise).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<ArtifactLayout>,

    /// Directory for CSV artifacts (default: "data").
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory for DDL artifacts (default: "schema").
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,

    /// Tables to include (glob patterns).
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude (glob patterns).
    #[serde(default)]
    pub exclude_tables: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            database: None,
            schemas: Vec::new(),
            all_schemas: false,
            limit: None,
            layout: None,
            data_dir: default_data_dir(),
            schema_dir: default_schema_dir(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }
}

/// Import behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Target database (default: connection database).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Target schema for flat artifacts (default: connection schema).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Directory holding CSV artifacts (default: "data").
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding DDL artifacts (default: "schema").
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,

    /// Truncate each table before loading it. Loading appends otherwise.
    #[serde(default)]
    pub truncate_before_load: bool,

    /// Tables to include (glob patterns).
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude (glob patterns).
    #[serde(default)]
    pub exclude_tables: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            database: None,
            schema: None,
            data_dir: default_data_dir(),
            schema_dir: default_schema_dir(),
            truncate_before_load: false,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }
}

/// Definition sanitizer configuration.
///
/// `markers` is a denylist of substrings, matched case-insensitively, that
/// identify environment-specific clauses. It is the extension point for new
/// clause kinds: anything not listed is written to the artifact verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Marker substrings (default: STAGE, ACCOUNT, STORAGE_INTEGRATION).
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,

    /// Comment line written in place of a marked line.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            placeholder: default_placeholder(),
        }
    }
}

/// Task capture and replay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Task DDL file (default: "tasks/tasks.sql").
    #[serde(default = "default_tasks_file")]
    pub file: PathBuf,

    /// Database to capture from and create in (default: connection database).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Schema for configured definitions (default: connection schema).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Definitions created when the task file holds no captured DDL.
    #[serde(default)]
    pub definitions: Vec<TaskDefinition>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            file: default_tasks_file(),
            database: None,
            schema: None,
            definitions: Vec::new(),
        }
    }
}

// Default value functions for serde
fn default_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("schema")
}

fn default_tasks_file() -> PathBuf {
    PathBuf::from("tasks").join("tasks.sql")
}

fn default_markers() -> Vec<String> {
    vec![
        "STAGE".to_string(),
        "ACCOUNT".to_string(),
        "STORAGE_INTEGRATION".to_string(),
    ]
}

fn default_placeholder() -> String {
    "  -- (omitted account-specific clause)".to_string()
}
