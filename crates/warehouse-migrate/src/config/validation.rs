//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let conn = &config.connection;
    for (field, value) in [
        ("connection.account", &conn.account),
        ("connection.user", &conn.user),
        ("connection.warehouse", &conn.warehouse),
        ("connection.database", &conn.database),
        ("connection.schema", &conn.schema),
    ] {
        if value.trim().is_empty() {
            return Err(MigrateError::Config(format!("{} is required", field)));
        }
    }
    if conn.timeout_secs == 0 {
        return Err(MigrateError::Config(
            "connection.timeout_secs must be at least 1".into(),
        ));
    }

    if let Some(0) = config.export.limit {
        return Err(MigrateError::Config(
            "export.limit must be at least 1 (omit it to export every row)".into(),
        ));
    }
    if config.export.all_schemas && !config.export.schemas.is_empty() {
        return Err(MigrateError::Config(
            "export.schemas and export.all_schemas are mutually exclusive".into(),
        ));
    }

    if config.sanitizer.markers.iter().any(|m| m.trim().is_empty()) {
        return Err(MigrateError::Config(
            "sanitizer.markers cannot contain empty entries".into(),
        ));
    }
    if !config.sanitizer.placeholder.trim_start().starts_with("--") {
        return Err(MigrateError::Config(
            "sanitizer.placeholder must be a SQL line comment (start with --)".into(),
        ));
    }

    for task in &config.tasks.definitions {
        if task.name.trim().is_empty() || task.schedule.trim().is_empty() {
            return Err(MigrateError::Config(
                "tasks.definitions entries need a name and a schedule".into(),
            ));
        }
        if task.statement.contains(';') {
            return Err(MigrateError::Config(format!(
                "task {} statement must be a single statement without ';'",
                task.name
            )));
        }
    }

    Ok(())
}
