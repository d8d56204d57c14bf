//! Table identity and column metadata.

use std::fmt;

use serde::Serialize;

use super::identifier::qualify;
use crate::error::Result;

/// Fully qualified table identity.
///
/// Case is kept exactly as the catalog returned it; the key is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableRef {
    pub database: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Quoted `"db"."schema"."table"` for use in statements.
    pub fn qualified(&self) -> Result<String> {
        qualify(&self.database, &self.schema, &self.table)
    }

    /// `schema.table`, as printed in reports.
    pub fn short_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// A result column as described by the statement's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    /// Column name as returned by the warehouse.
    pub name: String,
    /// 1-based position in the result.
    pub ordinal_position: usize,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, ordinal_position: usize) -> Self {
        Self {
            name: name.into(),
            ordinal_position,
        }
    }

    /// Build descriptors for a list of names in result order.
    pub fn from_names<I, S>(names: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Self::new(name, i + 1))
            .collect()
    }
}
