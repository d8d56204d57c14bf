//! Export runner: walk the catalog and write artifacts table by table.
//!
//! - [`table`]: rows to CSV
//! - [`definition`]: sanitized definitions to SQL files

pub mod definition;
pub mod table;

pub use definition::{export_definition, Sanitizer};
pub use table::export_table;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::artifacts::{ArtifactLayout, ArtifactStore};
use crate::catalog::{self, SchemaSelection};
use crate::config::{Config, SanitizerConfig, TableFilter};
use crate::core::TableRef;
use crate::error::Result;
use crate::report::{ExportEntry, ExportOutcome, ExportReport};
use crate::session::Session;

/// Inputs of an export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub database: String,
    pub schemas: SchemaSelection,
    pub limit: Option<u64>,
    /// Forced layout; derived from the schema count when unset.
    pub layout: Option<ArtifactLayout>,
    pub data_dir: PathBuf,
    pub schema_dir: PathBuf,
    pub filter: TableFilter,
    pub sanitizer: SanitizerConfig,
}

impl ExportOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        let export = &config.export;
        let schemas = if export.all_schemas {
            SchemaSelection::All
        } else if export.schemas.is_empty() {
            SchemaSelection::Named(vec![config.connection.schema.clone()])
        } else {
            SchemaSelection::Named(export.schemas.clone())
        };

        Ok(Self {
            database: config.export_database().to_string(),
            schemas,
            limit: export.limit,
            layout: export.layout,
            data_dir: export.data_dir.clone(),
            schema_dir: export.schema_dir.clone(),
            filter: TableFilter::new(&export.include_tables, &export.exclude_tables)?,
            sanitizer: config.sanitizer.clone(),
        })
    }
}

/// Runs one export over a session.
pub struct Exporter {
    session: Arc<dyn Session>,
    options: ExportOptions,
    sanitizer: Sanitizer,
}

impl Exporter {
    pub fn new(session: Arc<dyn Session>, options: ExportOptions) -> Self {
        let sanitizer = Sanitizer::new(&options.sanitizer);
        Self {
            session,
            options,
            sanitizer,
        }
    }

    /// Export every selected table.
    ///
    /// A table whose query or file write fails is reported as skipped and the
    /// run continues, as are all tables of a schema whose artifact directories
    /// cannot be created. Only connectivity loss or an unlistable database ends it.
    pub async fn run(&self) -> Result<ExportReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let opts = &self.options;
        let session = self.session.as_ref();

        info!("Starting export run {} from database {}", run_id, opts.database);
        let walk = catalog::walk(session, &opts.database, &opts.schemas, false).await?;

        let layout = opts
            .layout
            .unwrap_or_else(|| ArtifactLayout::for_schema_count(walk.schemas_found()));
        if layout == ArtifactLayout::Flat && walk.schemas.len() > 1 {
            warn!("Flat layout with {} schemas: same-named tables overwrite each other", walk.schemas.len());
        }
        let store = ArtifactStore::new(&opts.data_dir, &opts.schema_dir, layout);

        let tables: Vec<TableRef> = walk
            .tables()
            .filter(|t| opts.filter.matches(&t.table))
            .collect();
        info!(
            "Exporting {} table(s) from {} schema(s) to {} and {} ({} layout)",
            tables.len(),
            walk.schemas.len(),
            opts.data_dir.display(),
            opts.schema_dir.display(),
            layout
        );

        let mut unprepared: HashMap<&str, String> = HashMap::new();
        for schema in &walk.schemas {
            if let Err(e) = store.prepare(&schema.name) {
                warn!("Skipping schema {}: {}", schema.name, e);
                unprepared.insert(schema.name.as_str(), e.to_string());
            }
        }

        let mut entries = Vec::with_capacity(tables.len());
        for table in &tables {
            let outcome = if let Some(cause) = unprepared.get(table.schema.as_str()) {
                ExportOutcome::Skipped {
                    cause: cause.clone(),
                }
            } else {
                match self.export_one(&store, table).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!("Skipping {}: {}", table, e);
                        ExportOutcome::Skipped {
                            cause: e.to_string(),
                        }
                    }
                }
            };
            entries.push(ExportEntry {
                table: table.clone(),
                outcome,
            });
        }

        let completed_at = Utc::now();
        let report = ExportReport {
            run_id,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            database: opts.database.clone(),
            layout,
            schemas_found: walk.schemas_found(),
            schemas_skipped: walk.skipped,
            tables_found: tables.len(),
            entries,
        };

        info!(
            "Export finished: {} of {} tables, {} rows, {} skipped",
            report.tables_exported(),
            report.tables_found,
            report.rows_exported(),
            report.tables_skipped()
        );
        Ok(report)
    }

    async fn export_one(&self, store: &ArtifactStore, table: &TableRef) -> Result<ExportOutcome> {
        let session = self.session.as_ref();
        let csv_path = store.csv_path(table);
        let rows = export_table(session, table, self.options.limit, &csv_path).await?;
        info!("  {} -> {} rows", csv_path.display(), rows);

        let definition =
            export_definition(session, table, &self.sanitizer, &store.ddl_path(table)).await?;
        Ok(ExportOutcome::Exported { rows, definition })
    }
}
