//! Run reports for export and import.
//!
//! Reports are built in memory for one invocation and printed at the end,
//! either as text (one line per table plus a summary) or as JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::artifacts::ArtifactLayout;
use crate::catalog::SkippedSchema;
use crate::core::TableRef;

/// What happened to one table during an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOutcome {
    /// Structure ensured and rows loaded.
    Loaded { rows: u64 },
    /// Structure creation or loading failed.
    Failed { cause: String },
    /// The artifacts could not be used.
    Skipped { cause: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportEntry {
    pub table: TableRef,
    #[serde(flatten)]
    pub outcome: ImportOutcome,
}

/// Result of an import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub dry_run: bool,
    pub layout: ArtifactLayout,
    pub loader: String,
    pub schemas_found: usize,
    pub schemas_processed: usize,
    pub tables_found: usize,
    pub entries: Vec<ImportEntry>,
}

impl ImportReport {
    pub fn tables_loaded(&self) -> usize {
        self.count(|o| matches!(o, ImportOutcome::Loaded { .. }))
    }

    pub fn tables_failed(&self) -> usize {
        self.count(|o| matches!(o, ImportOutcome::Failed { .. }))
    }

    pub fn tables_skipped(&self) -> usize {
        self.count(|o| matches!(o, ImportOutcome::Skipped { .. }))
    }

    pub fn rows_loaded(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e.outcome {
                ImportOutcome::Loaded { rows } => rows,
                _ => 0,
            })
            .sum()
    }

    /// `completed` when every found table loaded, `partial` otherwise.
    pub fn status(&self) -> &'static str {
        if self.tables_loaded() == self.tables_found {
            "completed"
        } else {
            "partial"
        }
    }

    fn count(&self, pred: impl Fn(&ImportOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let name = entry.table.short_name();
            match &entry.outcome {
                ImportOutcome::Loaded { rows } => writeln!(f, "  {}: {} rows loaded", name, rows)?,
                ImportOutcome::Failed { cause } => writeln!(f, "  {}: failed ({})", name, cause)?,
                ImportOutcome::Skipped { cause } => writeln!(f, "  {}: skipped ({})", name, cause)?,
            }
        }
        write!(
            f,
            "Done{}. Loaded {} of {} tables across {} of {} schemas ({} rows, {:.1}s)",
            if self.dry_run { " (dry run)" } else { "" },
            self.tables_loaded(),
            self.tables_found,
            self.schemas_processed,
            self.schemas_found,
            self.rows_loaded(),
            self.duration_seconds
        )
    }
}

/// What happened to one table during an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportOutcome {
    /// Rows written; `definition` tells whether a DDL artifact was written too.
    Exported { rows: u64, definition: bool },
    Skipped { cause: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportEntry {
    pub table: TableRef,
    #[serde(flatten)]
    pub outcome: ExportOutcome,
}

/// Result of an export run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub database: String,
    pub layout: ArtifactLayout,
    pub schemas_found: usize,
    pub schemas_skipped: Vec<SkippedSchema>,
    pub tables_found: usize,
    pub entries: Vec<ExportEntry>,
}

impl ExportReport {
    pub fn tables_exported(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, ExportOutcome::Exported { .. }))
            .count()
    }

    pub fn tables_skipped(&self) -> usize {
        self.entries.len() - self.tables_exported()
    }

    pub fn definitions_written(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e.outcome,
                    ExportOutcome::Exported {
                        definition: true,
                        ..
                    }
                )
            })
            .count()
    }

    pub fn rows_exported(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e.outcome {
                ExportOutcome::Exported { rows, .. } => rows,
                ExportOutcome::Skipped { .. } => 0,
            })
            .sum()
    }
}

impl fmt::Display for ExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let name = entry.table.short_name();
            match &entry.outcome {
                ExportOutcome::Exported { rows, definition } => writeln!(
                    f,
                    "  {}: {} rows{}",
                    name,
                    rows,
                    if *definition { "" } else { " (no definition)" }
                )?,
                ExportOutcome::Skipped { cause } => writeln!(f, "  {}: skipped ({})", name, cause)?,
            }
        }
        for schema in &self.schemas_skipped {
            writeln!(f, "  {}: schema skipped ({})", schema.schema, schema.cause)?;
        }
        write!(
            f,
            "Done. Exported {} of {} tables from {} ({} schema(s), {} definitions, {} rows, {} skipped)",
            self.tables_exported(),
            self.tables_found,
            self.database,
            self.schemas_found,
            self.definitions_written(),
            self.rows_exported(),
            self.tables_skipped()
        )
    }
}
