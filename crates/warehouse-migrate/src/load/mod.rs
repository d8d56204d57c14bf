//! Data loading strategies.
//!
//! Two strategies move a [`Batch`] into an existing table:
//!
//! - [`BulkLoader`]: one call to the session's bulk transfer primitive, never
//!   allowed to create the target
//! - [`RowLoader`]: one parameterized `INSERT` per row, in header order
//!
//! [`LoaderImpl::select`] picks one per run from the session's capability
//! probe. A bulk loader that hits `Unsupported` at call time finishes that
//! table with the row strategy.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{quote_ident, Batch, SqlValue, TableRef};
use crate::error::{MigrateError, Result};
use crate::session::{BulkOptions, Session, SessionError};

/// Read a CSV artifact into a batch. Empty fields become NULL.
///
/// A record with more fields than the header is rejected; a shorter one is
/// padded with NULL.
pub fn read_batch(path: &Path) -> Result<Batch> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let columns: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let width = columns.len();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.len() > width {
            return Err(MigrateError::MalformedArtifact {
                path: path.display().to_string(),
                message: format!(
                    "line {} has {} fields but the header has {}",
                    line,
                    record.len(),
                    width
                ),
            });
        }
        if record.len() < width {
            warn!(
                "{}: line {} has {} of {} fields, padding with NULL",
                path.display(),
                line,
                record.len(),
                width
            );
        }
        rows.push(record.iter().map(SqlValue::from_field).collect());
    }

    Ok(Batch::new(columns, rows))
}

/// `INSERT INTO <table> (<cols>) VALUES (?, ...)` in header order.
pub fn insert_statement(target: &TableRef, columns: &[String]) -> Result<String> {
    let quoted = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?;
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        target.qualified()?,
        quoted.join(", "),
        placeholders
    ))
}

/// Loads through the session's bulk transfer primitive.
pub struct BulkLoader {
    session: Arc<dyn Session>,
}

impl BulkLoader {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }

    /// Transfer the batch, leaving `Unsupported` for the caller to handle.
    async fn transfer(&self, target: &TableRef, batch: &Batch) -> std::result::Result<u64, SessionError> {
        let options = BulkOptions {
            auto_create_target: false,
        };
        self.session.bulk_transfer(target, batch, options).await
    }
}

/// Loads one row per statement.
pub struct RowLoader {
    session: Arc<dyn Session>,
}

impl RowLoader {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }

    pub async fn load(&self, target: &TableRef, batch: &Batch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let sql = insert_statement(target, batch.columns())?;
        for row in batch.rows() {
            self.session
                .execute_with(&sql, row)
                .await
                .map_err(|e| MigrateError::query(target.to_string(), e))?;
        }
        Ok(batch.len() as u64)
    }
}

/// Loader chosen for a run.
pub enum LoaderImpl {
    Bulk(BulkLoader),
    Row(RowLoader),
}

impl LoaderImpl {
    /// Pick the strategy from the session's capability probe.
    pub fn select(session: Arc<dyn Session>) -> Self {
        if session.supports_bulk_transfer() {
            debug!("Using bulk transfer loader");
            Self::Bulk(BulkLoader::new(session))
        } else {
            debug!("Bulk transfer unavailable, using row loader");
            Self::Row(RowLoader::new(session))
        }
    }

    /// Strategy name for logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bulk(_) => "bulk",
            Self::Row(_) => "row",
        }
    }

    /// Load a batch into an existing table and return the rows written.
    pub async fn load(&self, target: &TableRef, batch: &Batch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        match self {
            Self::Row(loader) => loader.load(target, batch).await,
            Self::Bulk(loader) => match loader.transfer(target, batch).await {
                Ok(rows) => Ok(rows),
                Err(SessionError::Unsupported(reason)) => {
                    warn!(
                        "Bulk transfer unsupported for {} ({}), inserting row by row",
                        target, reason
                    );
                    RowLoader::new(loader.session.clone()).load(target, batch).await
                }
                Err(e) => Err(MigrateError::query(target.to_string(), e)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;
    use std::fs;
    use tempfile::TempDir;

    fn target_session() -> Arc<MemorySession> {
        let session = MemorySession::new();
        session.add_table("LAB", "RAW", "T", &["B", "A"], Vec::new());
        Arc::new(session)
    }

    fn batch() -> Batch {
        Batch::new(
            vec!["b".into(), "a".into()],
            vec![
                vec![SqlValue::from("b1"), SqlValue::from("a1")],
                vec![SqlValue::from("b2"), SqlValue::Null],
            ],
        )
    }

    #[test]
    fn test_read_batch_turns_empty_fields_into_null() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("T.csv");
        fs::write(&path, "id,note\n1,\n2,\"x,y\"\n").unwrap();

        let batch = read_batch(&path).unwrap();
        assert_eq!(batch.columns(), &["ID", "NOTE"]);
        assert_eq!(batch.rows()[0], vec![SqlValue::from("1"), SqlValue::Null]);
        assert_eq!(batch.rows()[1][1], SqlValue::from("x,y"));
    }

    #[test]
    fn test_read_batch_rejects_rows_wider_than_header() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("T.csv");
        fs::write(&path, "A,B\n1,2,LOST\n").unwrap();

        let err = read_batch(&path).unwrap_err();
        assert!(matches!(err, MigrateError::MalformedArtifact { .. }));
        assert!(err.to_string().contains("line 2 has 3 fields"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_read_batch_pads_short_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("T.csv");
        fs::write(&path, "A,B,C\n1,2\n").unwrap();

        let batch = read_batch(&path).unwrap();
        assert_eq!(
            batch.rows()[0],
            vec![SqlValue::from("1"), SqlValue::from("2"), SqlValue::Null]
        );
    }

    #[test]
    fn test_insert_statement() {
        let sql = insert_statement(&TableRef::new("D", "S", "T"), &["X".into(), "Y".into()]).unwrap();
        assert_eq!(sql, "INSERT INTO \"D\".\"S\".\"T\" (\"X\", \"Y\") VALUES (?, ?)");
    }

    #[tokio::test]
    async fn test_both_strategies_keep_column_order() {
        for bulk in [true, false] {
            let session = target_session();
            session.set_bulk_transfer(bulk);
            let loader = LoaderImpl::select(session.clone());
            assert_eq!(loader.name(), if bulk { "bulk" } else { "row" });

            let target = TableRef::new("LAB", "RAW", "T");
            assert_eq!(loader.load(&target, &batch()).await.unwrap(), 2);
            assert_eq!(
                session.table_rows("LAB", "RAW", "T").unwrap(),
                vec![
                    vec![SqlValue::from("b1"), SqlValue::from("a1")],
                    vec![SqlValue::from("b2"), SqlValue::Null],
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_bulk_degrades_on_unsupported() {
        let session = target_session();
        session.fail_on(
            "bulk transfer",
            SessionError::Unsupported("no bulk for this table".into()),
        );
        let loader = LoaderImpl::select(session.clone());
        let target = TableRef::new("LAB", "RAW", "T");

        assert_eq!(loader.load(&target, &batch()).await.unwrap(), 2);
        let inserts = session
            .statements()
            .iter()
            .filter(|s| s.starts_with("INSERT"))
            .count();
        assert_eq!(inserts, 2);
    }

    #[tokio::test]
    async fn test_bulk_execution_error_propagates() {
        let session = target_session();
        session.fail_on("bulk transfer", SessionError::Execution("disk full".into()));
        let loader = LoaderImpl::select(session.clone());

        let err = loader
            .load(&TableRef::new("LAB", "RAW", "T"), &batch())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::QueryExecution { .. }));
    }

    #[tokio::test]
    async fn test_empty_batch_issues_nothing() {
        for bulk in [true, false] {
            let session = target_session();
            session.set_bulk_transfer(bulk);
            let loader = LoaderImpl::select(session.clone());
            let empty = Batch::new(vec!["A".into()], Vec::new());

            assert_eq!(loader.load(&TableRef::new("LAB", "RAW", "T"), &empty).await.unwrap(), 0);
            assert!(session.statements().is_empty());
            assert_eq!(session.bulk_calls(), 0);
        }
    }
}
