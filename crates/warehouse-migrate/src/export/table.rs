//! Table data export to CSV artifacts.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::core::TableRef;
use crate::error::{MigrateError, Result};
use crate::session::{ResultSet, Session};

/// Export a table's rows to `path`, creating or overwriting the file.
///
/// The header is the result's column list in result order. Values use
/// [`SqlValue::to_text`](crate::core::SqlValue::to_text), so NULL and the
/// empty string both become an empty field and cannot be told apart later.
pub async fn export_table(
    session: &dyn Session,
    table: &TableRef,
    limit: Option<u64>,
    path: &Path,
) -> Result<u64> {
    let mut sql = format!("SELECT * FROM {}", table.qualified()?);
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let rs = session
        .execute(&sql)
        .await
        .map_err(|e| MigrateError::query(table.to_string(), e))?;

    write_csv(path, &rs)?;
    debug!("Wrote {} rows of {} to {}", rs.rows.len(), table, path.display());
    Ok(rs.rows.len() as u64)
}

/// Write a result set as CSV with a header line.
pub fn write_csv(path: &Path, rs: &ResultSet) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(rs.columns.iter().map(|c| c.name.as_str()))?;
    for row in &rs.rows {
        writer.write_record(row.iter().map(|v| v.to_text().unwrap_or_default()))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::load::read_batch;
    use crate::session::{MemorySession, SessionError};
    use tempfile::TempDir;

    fn session() -> MemorySession {
        let session = MemorySession::new();
        session.add_table(
            "LAB",
            "RAW",
            "PEOPLE",
            &["ID", "NAME", "NICK"],
            vec![
                vec![SqlValue::Int(1), SqlValue::from("Ada"), SqlValue::Null],
                vec![SqlValue::Int(2), SqlValue::from("Grace, H."), SqlValue::from("")],
                vec![SqlValue::Int(3), SqlValue::from("Linus"), SqlValue::from("lt")],
            ],
        );
        session
    }

    #[tokio::test]
    async fn test_export_writes_header_and_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data").join("PEOPLE.csv");
        let table = TableRef::new("LAB", "RAW", "PEOPLE");

        let rows = export_table(&session(), &table, None, &path).await.unwrap();
        assert_eq!(rows, 3);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "ID,NAME,NICK\n1,Ada,\n2,\"Grace, H.\",\n3,Linus,lt\n");
    }

    #[tokio::test]
    async fn test_null_and_empty_string_are_indistinguishable_after_export() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("PEOPLE.csv");
        let table = TableRef::new("LAB", "RAW", "PEOPLE");
        export_table(&session(), &table, None, &path).await.unwrap();

        let batch = read_batch(&path).unwrap();
        // NULL in row 1 and '' in row 2 both come back as NULL.
        assert!(batch.rows()[0][2].is_null());
        assert!(batch.rows()[1][2].is_null());
    }

    #[tokio::test]
    async fn test_limit_and_overwrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("PEOPLE.csv");
        fs::write(&path, "stale contents\n").unwrap();
        let table = TableRef::new("LAB", "RAW", "PEOPLE");

        let session = session();
        assert_eq!(export_table(&session, &table, Some(1), &path).await.unwrap(), 1);
        assert!(session.statements()[0].ends_with(" LIMIT 1"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "ID,NAME,NICK\n1,Ada,\n");
    }

    #[tokio::test]
    async fn test_query_failure_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("PEOPLE.csv");
        let session = session();
        session.fail_on("PEOPLE", SessionError::Execution("warehouse suspended".into()));

        let err = export_table(&session, &TableRef::new("LAB", "RAW", "PEOPLE"), None, &path)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::QueryExecution { .. }));
        assert!(!path.exists());
    }
}
