//! Catalog enumeration: databases, schemas and tables visible to a session.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::{quote_ident, qualify_schema, TableRef};
use crate::error::{MigrateError, Result};
use crate::session::{ResultSet, Session};

/// Schema every database carries that never holds user tables.
pub const INFORMATION_SCHEMA: &str = "INFORMATION_SCHEMA";

/// `SHOW` results carry the object name in the second column.
const NAME_COLUMN_FALLBACK: usize = 1;

/// Which schemas a walk covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSelection {
    /// Every schema the database lists.
    All,
    /// These schemas, in this order.
    Named(Vec<String>),
}

/// Tables of one schema, in catalog order unless sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaListing {
    pub name: String,
    pub tables: Vec<String>,
}

/// A schema that could not be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSchema {
    pub schema: String,
    pub cause: String,
}

/// Result of walking a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogWalk {
    pub database: String,
    pub schemas: Vec<SchemaListing>,
    pub skipped: Vec<SkippedSchema>,
}

impl CatalogWalk {
    /// Number of schemas the walk attempted.
    pub fn schemas_found(&self) -> usize {
        self.schemas.len() + self.skipped.len()
    }

    pub fn tables_found(&self) -> usize {
        self.schemas.iter().map(|s| s.tables.len()).sum()
    }

    /// Every listed table as a [`TableRef`], schema by schema.
    pub fn tables(&self) -> impl Iterator<Item = TableRef> + '_ {
        self.schemas.iter().flat_map(move |s| {
            s.tables
                .iter()
                .map(move |t| TableRef::new(&self.database, &s.name, t))
        })
    }
}

impl fmt::Display for CatalogWalk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Database: {}", self.database)?;
        for schema in &self.schemas {
            if schema.tables.is_empty() {
                continue;
            }
            writeln!(f, "  {}: {} table(s)", schema.name, schema.tables.len())?;
            for table in &schema.tables {
                writeln!(f, "    - {}", table)?;
            }
        }
        for skipped in &self.skipped {
            writeln!(f, "  {}: (skip: {})", skipped.schema, skipped.cause)?;
        }
        write!(f, "Total tables in {}: {}", self.database, self.tables_found())
    }
}

fn names(rs: &ResultSet) -> Vec<String> {
    let idx = rs.column_index("name").unwrap_or(NAME_COLUMN_FALLBACK);
    rs.column_texts(idx)
}

/// Databases visible to the session's role.
pub async fn list_databases(session: &dyn Session) -> Result<Vec<String>> {
    let rs = session
        .execute("SHOW DATABASES")
        .await
        .map_err(|e| MigrateError::catalog_access("databases", e))?;
    Ok(names(&rs))
}

/// Find a database by name: exact match first, then case-insensitive with
/// spaces read as underscores.
pub async fn resolve_database(session: &dyn Session, wanted: &str) -> Result<String> {
    let databases = list_databases(session).await?;
    if let Some(db) = databases.iter().find(|d| d.as_str() == wanted) {
        return Ok(db.clone());
    }

    let normalized = wanted.trim().replace(' ', "_").to_uppercase();
    if let Some(db) = databases.iter().find(|d| d.to_uppercase() == normalized) {
        debug!("Resolved database '{}' to '{}'", wanted, db);
        return Ok(db.clone());
    }

    let mut available: Vec<&str> = databases.iter().take(20).map(String::as_str).collect();
    if databases.len() > 20 {
        available.push("...");
    }
    Err(MigrateError::Config(format!(
        "no database named '{}' (available: {})",
        wanted,
        available.join(", ")
    )))
}

/// Schemas of a database, in catalog order.
pub async fn list_schemas(session: &dyn Session, database: &str) -> Result<Vec<String>> {
    let sql = format!("SHOW SCHEMAS IN DATABASE {}", quote_ident(database)?);
    let rs = session
        .execute(&sql)
        .await
        .map_err(|e| MigrateError::catalog_access(format!("database {}", database), e))?;
    Ok(names(&rs))
}

/// Tables of a schema, in catalog order.
pub async fn list_tables(session: &dyn Session, database: &str, schema: &str) -> Result<Vec<String>> {
    let sql = format!("SHOW TABLES IN SCHEMA {}", qualify_schema(database, schema)?);
    let rs = session.execute(&sql).await.map_err(|e| {
        MigrateError::catalog_access(format!("schema {}.{}", database, schema), e)
    })?;
    Ok(names(&rs))
}

/// List the selected schemas and their tables.
///
/// A schema that cannot be listed is recorded in [`CatalogWalk::skipped`] and
/// the walk moves on. Failing to list the database's schemas, or losing the
/// connection, ends the walk with an error.
pub async fn walk(
    session: &dyn Session,
    database: &str,
    selection: &SchemaSelection,
    sorted: bool,
) -> Result<CatalogWalk> {
    let mut schema_names = match selection {
        SchemaSelection::All => list_schemas(session, database)
            .await?
            .into_iter()
            .filter(|s| !s.eq_ignore_ascii_case(INFORMATION_SCHEMA))
            .collect(),
        SchemaSelection::Named(names) => names.clone(),
    };
    if sorted {
        schema_names.sort();
    }

    let mut walk = CatalogWalk {
        database: database.to_string(),
        schemas: Vec::new(),
        skipped: Vec::new(),
    };

    for schema in schema_names {
        match list_tables(session, database, &schema).await {
            Ok(mut tables) => {
                if sorted {
                    tables.sort();
                }
                debug!("{}.{}: {} table(s)", database, schema, tables.len());
                walk.schemas.push(SchemaListing {
                    name: schema,
                    tables,
                });
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Skipping schema {}: {}", schema, e);
                walk.skipped.push(SkippedSchema {
                    schema,
                    cause: e.to_string(),
                });
            }
        }
    }

    Ok(walk)
}

/// Table counts for every schema of a database, sorted by name.
pub async fn inventory(session: &dyn Session, database: &str) -> Result<CatalogWalk> {
    let database = resolve_database(session, database).await?;
    walk(session, &database, &SchemaSelection::All, true).await
}
