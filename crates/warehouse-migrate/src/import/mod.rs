//! Import orchestrator: recreate tables from artifacts and load their rows.
//!
//! Per schema the database and schema are created if missing and the session
//! is bound to them. Per table the orchestrator walks a forward-only sequence
//! of [`TableStage`]s: resolve the artifact pair, ensure the table structure
//! (replayed definition or an all-`VARCHAR` fallback built from the CSV
//! header), load the rows, report. A table that fails stops where it failed
//! and the run moves on; losing the connection ends the run.

pub mod replay;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifacts::{self, ArtifactPair};
use crate::config::{Config, TableFilter};
use crate::core::{qualify_schema, quote_ident, Batch, TableRef};
use crate::error::{MigrateError, Result};
use crate::load::{read_batch, LoaderImpl};
use crate::report::{ImportEntry, ImportOutcome, ImportReport};
use crate::session::Session;

/// Progress of one table through an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStage {
    ArtifactsResolved,
    StructureEnsured,
    DataLoaded,
    Reported,
    Failed,
}

impl TableStage {
    /// Whether `next` is a legal transition from this stage.
    pub fn can_advance_to(self, next: TableStage) -> bool {
        use TableStage::*;
        matches!(
            (self, next),
            (ArtifactsResolved, StructureEnsured)
                | (ArtifactsResolved, Failed)
                | (StructureEnsured, DataLoaded)
                | (StructureEnsured, Failed)
                | (DataLoaded, Reported)
                | (Failed, Reported)
        )
    }
}

/// Stage tracker for one table.
#[derive(Debug)]
struct TableProgress<'a> {
    table: &'a TableRef,
    stage: TableStage,
}

impl<'a> TableProgress<'a> {
    fn new(table: &'a TableRef) -> Self {
        Self {
            table,
            stage: TableStage::ArtifactsResolved,
        }
    }

    fn advance(&mut self, next: TableStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.stage,
            next
        );
        debug!("{}: {:?} -> {:?}", self.table, self.stage, next);
        self.stage = next;
    }
}

/// Inputs of an import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub database: String,
    /// Target schema for flat artifacts.
    pub flat_schema: String,
    pub data_dir: PathBuf,
    pub schema_dir: PathBuf,
    pub truncate_before_load: bool,
    pub filter: TableFilter,
    /// Mark the report as a dry run.
    pub dry_run: bool,
}

impl ImportOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        let import = &config.import;
        Ok(Self {
            database: config.import_database().to_string(),
            flat_schema: config.import_schema().to_string(),
            data_dir: import.data_dir.clone(),
            schema_dir: import.schema_dir.clone(),
            truncate_before_load: import.truncate_before_load,
            filter: TableFilter::new(&import.include_tables, &import.exclude_tables)?,
            dry_run: false,
        })
    }
}

/// Runs one import over a session.
pub struct Importer {
    session: Arc<dyn Session>,
    loader: LoaderImpl,
    options: ImportOptions,
}

impl Importer {
    /// Create an importer; the load strategy is chosen here, once per run.
    pub fn new(session: Arc<dyn Session>, options: ImportOptions) -> Self {
        let loader = LoaderImpl::select(session.clone());
        Self {
            session,
            loader,
            options,
        }
    }

    pub async fn run(&self) -> Result<ImportReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let opts = &self.options;

        info!("Starting import run {} into database {}", run_id, opts.database);
        let mut discovery =
            artifacts::discover(&opts.data_dir, &opts.schema_dir, &opts.flat_schema)?;
        for schema in &mut discovery.schemas {
            schema.tables.retain(|pair| opts.filter.matches(&pair.table));
        }
        info!(
            "Found {} table(s) in {} schema(s) ({} layout, {} loader)",
            discovery.tables_found(),
            discovery.schemas_found(),
            discovery.layout,
            self.loader.name()
        );

        let mut entries = Vec::with_capacity(discovery.tables_found());
        let mut schemas_processed = 0;

        for schema in &discovery.schemas {
            if schema.tables.is_empty() {
                continue;
            }
            if let Err(e) = self.ensure_schema(&schema.schema).await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("Skipping schema {}: {}", schema.schema, e);
                for pair in &schema.tables {
                    entries.push(ImportEntry {
                        table: TableRef::new(&opts.database, &schema.schema, &pair.table),
                        outcome: ImportOutcome::Skipped {
                            cause: e.to_string(),
                        },
                    });
                }
                continue;
            }
            schemas_processed += 1;

            for pair in &schema.tables {
                let target = TableRef::new(&opts.database, &schema.schema, &pair.table);
                let outcome = self.import_table(&target, pair).await?;
                match &outcome {
                    ImportOutcome::Loaded { rows } => info!("  {}: {} rows loaded", target.short_name(), rows),
                    ImportOutcome::Failed { cause } => warn!("  {}: failed: {}", target.short_name(), cause),
                    ImportOutcome::Skipped { cause } => warn!("  {}: skipped: {}", target.short_name(), cause),
                }
                entries.push(ImportEntry {
                    table: target,
                    outcome,
                });
            }
        }

        let completed_at = Utc::now();
        let report = ImportReport {
            run_id,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            dry_run: opts.dry_run,
            layout: discovery.layout,
            loader: self.loader.name().to_string(),
            schemas_found: discovery.schemas_found(),
            schemas_processed,
            tables_found: discovery.tables_found(),
            entries,
        };

        info!(
            "Import {}: {} of {} tables, {} rows",
            report.status(),
            report.tables_loaded(),
            report.tables_found,
            report.rows_loaded()
        );
        Ok(report)
    }

    /// Create the target database and schema if missing and bind the session to them.
    async fn ensure_schema(&self, schema: &str) -> Result<()> {
        let database = &self.options.database;
        let scope = format!("{}.{}", database, schema);
        let statements = [
            format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(database)?),
            format!("CREATE SCHEMA IF NOT EXISTS {}", qualify_schema(database, schema)?),
        ];
        for sql in &statements {
            self.session
                .execute(sql)
                .await
                .map_err(|e| MigrateError::structure(&scope, e))?;
        }
        self.session
            .use_schema(database, schema)
            .await
            .map_err(|e| MigrateError::structure(&scope, e))
    }

    /// Import one table. Only run-ending errors are returned; everything else
    /// becomes the table's outcome.
    async fn import_table(&self, target: &TableRef, pair: &ArtifactPair) -> Result<ImportOutcome> {
        let mut progress = TableProgress::new(target);

        let batch = match read_batch(&pair.csv) {
            Ok(batch) if batch.columns().is_empty() => {
                return Ok(ImportOutcome::Skipped {
                    cause: format!("{} has no header", pair.csv.display()),
                })
            }
            Ok(batch) => batch,
            Err(e) => {
                return Ok(ImportOutcome::Skipped {
                    cause: e.to_string(),
                })
            }
        };

        if let Err(e) = self.ensure_table(target, pair, &batch).await {
            return fail(&mut progress, e);
        }
        progress.advance(TableStage::StructureEnsured);

        let rows = match self.load_table(target, &batch).await {
            Ok(rows) => rows,
            Err(e) => return fail(&mut progress, e),
        };
        progress.advance(TableStage::DataLoaded);
        progress.advance(TableStage::Reported);
        Ok(ImportOutcome::Loaded { rows })
    }

    async fn load_table(&self, target: &TableRef, batch: &Batch) -> Result<u64> {
        if self.options.truncate_before_load {
            let sql = format!("TRUNCATE TABLE IF EXISTS {}", target.qualified()?);
            self.session
                .execute(&sql)
                .await
                .map_err(|e| MigrateError::query(target.to_string(), e))?;
        }
        self.loader.load(target, batch).await
    }

    /// Replay the table's definition, or create the fallback table.
    async fn ensure_table(&self, target: &TableRef, pair: &ArtifactPair, batch: &Batch) -> Result<()> {
        match &pair.ddl {
            Some(path) => self.replay_definition(target, path).await,
            None => self.create_fallback(target, batch).await,
        }
    }

    async fn replay_definition(&self, target: &TableRef, path: &Path) -> Result<()> {
        debug!("Replaying {} for {}", path.display(), target);
        let ddl = fs::read_to_string(path)?;
        let ddl = replay::substitute(&ddl, &target.database, &target.schema)?;
        for stmt in replay::statements(&ddl) {
            self.session
                .execute(&stmt)
                .await
                .map_err(|e| MigrateError::structure(target.to_string(), e))?;
        }
        Ok(())
    }

    async fn create_fallback(&self, target: &TableRef, batch: &Batch) -> Result<()> {
        let sql = fallback_table_sql(target, batch.columns())?;
        debug!("Creating fallback table {}", target);
        self.session
            .execute(&sql)
            .await
            .map_err(|e| MigrateError::structure(target.to_string(), e))?;
        Ok(())
    }
}

/// `CREATE TABLE IF NOT EXISTS` with one unconstrained `VARCHAR` per column.
pub fn fallback_table_sql(target: &TableRef, columns: &[String]) -> Result<String> {
    let columns = columns
        .iter()
        .map(|c| Ok(format!("{} VARCHAR", quote_ident(c)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        target.qualified()?,
        columns.join(", ")
    ))
}

fn fail(progress: &mut TableProgress<'_>, err: MigrateError) -> Result<ImportOutcome> {
    if err.is_fatal() {
        return Err(err);
    }
    progress.advance(TableStage::Failed);
    progress.advance(TableStage::Reported);
    Ok(ImportOutcome::Failed {
        cause: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::session::{MemorySession, SessionError};
    use tempfile::TempDir;

    fn write(path: PathBuf, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn options(tmp: &TempDir) -> ImportOptions {
        ImportOptions {
            database: "LAB".into(),
            flat_schema: "PUBLIC".into(),
            data_dir: tmp.path().join("data"),
            schema_dir: tmp.path().join("schema"),
            truncate_before_load: false,
            filter: TableFilter::default(),
            dry_run: false,
        }
    }

    #[test]
    fn test_stage_transitions_are_forward_only() {
        use TableStage::*;
        assert!(ArtifactsResolved.can_advance_to(StructureEnsured));
        assert!(StructureEnsured.can_advance_to(Failed));
        assert!(DataLoaded.can_advance_to(Reported));
        assert!(!DataLoaded.can_advance_to(StructureEnsured));
        assert!(!Failed.can_advance_to(DataLoaded));
        assert!(!ArtifactsResolved.can_advance_to(DataLoaded));
    }

    #[test]
    fn test_fallback_sql() {
        let sql = fallback_table_sql(&TableRef::new("LAB", "RAW", "t"), &["ID".into(), "NOTE".into()]).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"LAB\".\"RAW\".\"t\" (\"ID\" VARCHAR, \"NOTE\" VARCHAR)"
        );
    }

    #[tokio::test]
    async fn test_second_run_makes_no_structural_changes() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("data").join("ORDERS.csv"), "id,amount\n1,9.5\n");
        let session = Arc::new(MemorySession::new());

        let importer = Importer::new(session.clone(), options(&tmp));
        let first = importer.run().await.unwrap();
        assert_eq!(first.tables_loaded(), 1);
        assert_eq!(session.mutation_count(), 3);

        session.reset_log();
        let second = importer.run().await.unwrap();
        assert_eq!(second.tables_loaded(), 1);
        assert_eq!(session.mutation_count(), 0);
        // Loading appends.
        assert_eq!(session.table_rows("LAB", "PUBLIC", "ORDERS").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_truncate_before_load_replaces_rows() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("data").join("ORDERS.csv"), "id\n1\n2\n");
        let session = Arc::new(MemorySession::new());
        let mut opts = options(&tmp);
        opts.truncate_before_load = true;

        let importer = Importer::new(session.clone(), opts);
        importer.run().await.unwrap();
        importer.run().await.unwrap();
        assert_eq!(session.table_rows("LAB", "PUBLIC", "ORDERS").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_definition_is_replayed_with_placeholders() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("data").join("ORDERS.csv"), "ID,NOTE\n1,first\n");
        write(
            tmp.path().join("schema").join("ORDERS.sql"),
            "create or replace TABLE ${database}.${schema}.ORDERS (\n\tID NUMBER(38,0),\n\tNOTE VARCHAR(100)\n)\n  -- (omitted account-specific clause)\n;\n",
        );
        let session = Arc::new(MemorySession::new());

        let report = Importer::new(session.clone(), options(&tmp)).run().await.unwrap();
        assert_eq!(report.entries[0].outcome, ImportOutcome::Loaded { rows: 1 });
        assert!(session
            .statements()
            .iter()
            .any(|s| s.starts_with("create or replace TABLE \"LAB\".\"PUBLIC\".ORDERS (")));
        assert_eq!(
            session.table_rows("LAB", "PUBLIC", "ORDERS").unwrap(),
            vec![vec![SqlValue::from("1"), SqlValue::from("first")]]
        );
    }

    #[tokio::test]
    async fn test_broken_definition_fails_table_and_continues() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("data").join("A.csv"), "X\n1\n");
        write(tmp.path().join("data").join("B.csv"), "X\n1\n");
        write(tmp.path().join("schema").join("A.sql"), "create TABLE A (X INT) BROKEN;");
        let session = Arc::new(MemorySession::new());
        session.fail_on("BROKEN", SessionError::Execution("syntax error".into()));

        let report = Importer::new(session.clone(), options(&tmp)).run().await.unwrap();
        assert!(matches!(report.entries[0].outcome, ImportOutcome::Failed { .. }));
        assert_eq!(report.entries[1].outcome, ImportOutcome::Loaded { rows: 1 });
        assert!(!session.has_table("LAB", "PUBLIC", "A"));
        assert_eq!(report.status(), "partial");
    }

    #[tokio::test]
    async fn test_blank_header_cell_fails_only_that_table() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("data").join("A_BAD.csv"), "X,,Z\n1,2,3\n");
        write(tmp.path().join("data").join("B_GOOD.csv"), "X\n1\n");
        write(tmp.path().join("data").join("C_BLANK.csv"), "X,   \n1,2\n");
        let session = Arc::new(MemorySession::new());

        let report = Importer::new(session.clone(), options(&tmp)).run().await.unwrap();
        match &report.entries[0].outcome {
            ImportOutcome::Failed { cause } => assert!(cause.contains("Identifier cannot be empty")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(report.entries[1].outcome, ImportOutcome::Loaded { rows: 1 });
        assert!(matches!(report.entries[2].outcome, ImportOutcome::Failed { .. }));
        assert!(session.has_table("LAB", "PUBLIC", "B_GOOD"));
        assert!(!session.has_table("LAB", "PUBLIC", "A_BAD"));
    }

    #[tokio::test]
    async fn test_overlong_column_name_fails_only_that_table() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path().join("data").join("A.csv"),
            &format!("{}\n1\n", "C".repeat(256)),
        );
        write(tmp.path().join("data").join("B.csv"), "X\n1\n");
        let session = Arc::new(MemorySession::new());

        let report = Importer::new(session, options(&tmp)).run().await.unwrap();
        assert!(matches!(report.entries[0].outcome, ImportOutcome::Failed { .. }));
        assert_eq!(report.entries[1].outcome, ImportOutcome::Loaded { rows: 1 });
    }

    #[tokio::test]
    async fn test_row_wider_than_header_skips_table() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("data").join("A.csv"), "A,B\n1,2,LOST\n");
        write(tmp.path().join("data").join("B.csv"), "X\n1\n");
        let session = Arc::new(MemorySession::new());

        let report = Importer::new(session.clone(), options(&tmp)).run().await.unwrap();
        match &report.entries[0].outcome {
            ImportOutcome::Skipped { cause } => assert!(cause.contains("3 fields")),
            other => panic!("expected skip, got {:?}", other),
        }
        assert!(!session.has_table("LAB", "PUBLIC", "A"));
        assert_eq!(report.entries[1].outcome, ImportOutcome::Loaded { rows: 1 });
    }

    #[tokio::test]
    async fn test_connectivity_loss_aborts_run() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("data").join("A.csv"), "X\n1\n");
        let session = Arc::new(MemorySession::new());
        session.fail_on("CREATE TABLE", SessionError::Connectivity("reset".into()));

        let err = Importer::new(session, options(&tmp)).run().await.unwrap_err();
        assert!(matches!(err, MigrateError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_multi_schema_mode_leaves_flat_schema_untouched() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("data").join("MART").join("FACT.csv"), "K\n1\n");
        let session = Arc::new(MemorySession::new());

        let report = Importer::new(session.clone(), options(&tmp)).run().await.unwrap();
        assert_eq!(report.layout, crate::artifacts::ArtifactLayout::Nested);
        assert!(session.has_table("LAB", "MART", "FACT"));
        assert!(!session.has_schema("LAB", "PUBLIC"));
    }

    #[tokio::test]
    async fn test_empty_table_loads_zero_without_inserts() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("data").join("EMPTY.csv"), "A,B\n");
        let session = Arc::new(MemorySession::new());

        let report = Importer::new(session.clone(), options(&tmp)).run().await.unwrap();
        assert_eq!(report.entries[0].outcome, ImportOutcome::Loaded { rows: 0 });
        assert!(session.has_table("LAB", "PUBLIC", "EMPTY"));
        assert!(!session.statements().iter().any(|s| s.starts_with("INSERT") || s.contains("bulk transfer")));
        assert_eq!(session.bulk_calls(), 0);
    }
}
