//! Configuration loading and validation.

mod filter;
mod types;
mod validation;

pub use filter::TableFilter;
pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Database the export reads from.
    pub fn export_database(&self) -> &str {
        self.export
            .database
            .as_deref()
            .unwrap_or(&self.connection.database)
    }

    /// Database the import writes to.
    pub fn import_database(&self) -> &str {
        self.import
            .database
            .as_deref()
            .unwrap_or(&self.connection.database)
    }

    /// Schema flat artifacts are loaded into.
    pub fn import_schema(&self) -> &str {
        self.import
            .schema
            .as_deref()
            .unwrap_or(&self.connection.schema)
    }

    /// Database tasks are captured from and created in.
    pub fn tasks_database(&self) -> &str {
        self.tasks
            .database
            .as_deref()
            .unwrap_or(&self.connection.database)
    }

    /// Schema configured task definitions are created in.
    pub fn tasks_schema(&self) -> &str {
        self.tasks
            .schema
            .as_deref()
            .unwrap_or(&self.connection.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
connection:
  account: xy12345.eu-west-1.snowflakecomputing.com
  user: LOADER
  warehouse: COMPUTE_WH
  database: SALES
  schema: RAW
"#;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.connection.account_identifier(), "xy12345.eu-west-1");
        assert_eq!(
            config.connection.base_url(),
            "https://xy12345.eu-west-1.snowflakecomputing.com"
        );
        assert!(config.connection.bulk_transfer);
        assert_eq!(config.sanitizer.markers.len(), 3);
        assert_eq!(config.export.data_dir, Path::new("data"));
        assert_eq!(config.import_schema(), "RAW");
        assert_eq!(config.export_database(), "SALES");
        assert!(config.tasks.definitions.is_empty());
    }

    #[test]
    fn test_overrides() {
        let yaml = format!(
            "{}\nimport:\n  database: LAB\n  schema: STAGING\nexport:\n  all_schemas: true\n  limit: 1000\n  layout: nested\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.import_database(), "LAB");
        assert_eq!(config.import_schema(), "STAGING");
        assert_eq!(config.export.limit, Some(1000));
        assert_eq!(
            config.export.layout,
            Some(crate::artifacts::ArtifactLayout::Nested)
        );
    }

    #[test]
    fn test_task_definitions_parse() {
        let yaml = format!(
            "{}\ntasks:\n  definitions:\n    - name: LAB_HEARTBEAT\n      schedule: 60 MINUTE\n      statement: SELECT 1 AS heartbeat\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.tasks.definitions[0].name, "LAB_HEARTBEAT");
    }

    #[test]
    fn test_missing_connection_is_an_error() {
        assert!(Config::from_yaml("export:\n  limit: 5\n").is_err());
    }
}
