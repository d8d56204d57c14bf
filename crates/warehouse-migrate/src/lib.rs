//! # warehouse-migrate
//!
//! Moves warehouse schemas between environments through portable artifacts.
//!
//! An export walks the catalog and writes, per table, a CSV file with the
//! rows and a sanitized DDL file with the structure. An import reads those
//! artifacts back, ensures each schema and table exists without replacing
//! anything, and loads the rows with the fastest strategy the session offers.
//!
//! - **Flat or nested artifacts**, detected from the directory shape
//! - **Skip-and-continue**: one bad table never ends the run
//! - **Bulk transfer** with a row-by-row fallback
//! - **Task capture and replay** for scheduled jobs
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warehouse_migrate::{Config, ImportOptions, Importer, SqlApiSession};
//!
//! #[tokio::main]
//! async fn main() -> warehouse_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let session = Arc::new(SqlApiSession::connect(&config.connection).await?);
//!     let report = Importer::new(session, ImportOptions::from_config(&config)?)
//!         .run()
//!         .await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod health;
pub mod import;
pub mod load;
pub mod report;
pub mod session;
pub mod tasks;

// Re-exports for convenient access
pub use artifacts::{ArtifactLayout, ArtifactStore};
pub use catalog::{CatalogWalk, SchemaSelection};
pub use config::{Config, ConnectionConfig, TableFilter};
pub use crate::core::{Batch, SqlValue, TableRef};
pub use error::{MigrateError, Result};
pub use export::{ExportOptions, Exporter};
pub use health::{health_check, HealthCheckResult};
pub use import::{ImportOptions, Importer};
pub use load::LoaderImpl;
pub use report::{ExportReport, ImportReport};
pub use session::{MemorySession, Session, SessionError, SqlApiSession};
pub use tasks::{TaskDefinition, TaskTarget};
