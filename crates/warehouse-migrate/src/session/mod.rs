//! Warehouse session boundary.
//!
//! The pipeline talks to the warehouse only through the [`Session`] trait:
//! statement execution with result metadata, an optional bulk transfer
//! primitive, and errors typed well enough to decide between skipping a table
//! and aborting the run.
//!
//! Two implementations ship with the crate:
//!
//! - [`SqlApiSession`]: the warehouse's SQL REST API, authenticated with a
//!   programmatic access token
//! - [`MemorySession`]: an in-process catalog that records statements, used by
//!   tests and dry runs

mod memory;
mod sql_api;

pub use memory::{MemorySession, MemoryTask};
pub use sql_api::SqlApiSession;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{Batch, ColumnDescriptor, SqlValue, TableRef};

/// Errors a session can signal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The object does not exist or the role cannot see it.
    #[error("object not found or not authorized: {0}")]
    NotFound(String),

    /// The warehouse does not support the operation for this object.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Any other statement failure.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The session itself is unusable (network, authentication).
    #[error("connection failed: {0}")]
    Connectivity(String),
}

/// Result alias for session calls.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Rows returned by a statement together with their column metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    /// Result with no columns and no rows (DDL, DML acknowledgements).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Position of a column by case-insensitive name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Column names in result order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Text of the first cell of the first row, if any.
    pub fn scalar_text(&self) -> Option<String> {
        self.rows.first()?.first()?.to_text()
    }

    /// Text values of one column, skipping NULLs and empty strings.
    pub fn column_texts(&self, idx: usize) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(idx).and_then(SqlValue::to_text))
            .filter(|text| !text.is_empty())
            .collect()
    }
}

/// Options for [`Session::bulk_transfer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOptions {
    /// Let the transfer create the target table. The pipeline always passes
    /// `false`: table structure is owned by the import orchestrator.
    pub auto_create_target: bool,
}

/// An open, authenticated warehouse session.
///
/// Implementations must be `Send + Sync`; the pipeline holds one session per
/// run behind an `Arc` and issues statements strictly one after another.
#[async_trait]
pub trait Session: Send + Sync {
    /// Execute a statement without parameters.
    async fn execute(&self, sql: &str) -> SessionResult<ResultSet> {
        self.execute_with(sql, &[]).await
    }

    /// Execute a statement with positional `?` parameters.
    async fn execute_with(&self, sql: &str, params: &[SqlValue]) -> SessionResult<ResultSet>;

    /// Bind the default database and schema used to resolve unqualified names.
    async fn use_schema(&self, database: &str, schema: &str) -> SessionResult<()>;

    /// Capability probe for the bulk transfer primitive.
    fn supports_bulk_transfer(&self) -> bool;

    /// Transfer a whole batch into an existing table.
    ///
    /// Returns the number of rows written. Returns
    /// [`SessionError::Unsupported`] when the primitive is not available.
    async fn bulk_transfer(
        &self,
        target: &TableRef,
        batch: &Batch,
        options: BulkOptions,
    ) -> SessionResult<u64>;

    /// Account identifier the session is bound to.
    fn account(&self) -> &str;

    /// Release the session.
    async fn close(&self);
}
