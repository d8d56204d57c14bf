//! Artifact layout on disk.
//!
//! A flat layout keeps one schema's files side by side:
//!
//! ```text
//! data/<table>.csv      schema/<table>.sql
//! ```
//!
//! A nested layout keeps one directory per source schema:
//!
//! ```text
//! data/<schema>/<table>.csv      schema/<schema>/<table>.sql
//! ```
//!
//! At import time the layout is sniffed from the data directory: any
//! sub-directory selects the nested layout for the whole run.
//!
//! Schema and table names are stored through [`encode_name`], so a quoted
//! catalog name holding `/` or `..` stays a single entry inside its directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::TableRef;
use crate::error::{MigrateError, Result};

const CSV_EXTENSION: &str = "csv";
const DDL_EXTENSION: &str = "sql";

/// File-system form of a schema or table name.
///
/// `%`, both path separators and NUL are percent-encoded, as is a leading `.`.
/// Everything else is kept, so ordinary names map to themselves.
pub fn encode_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        match c {
            '%' | '/' | '\\' | '\0' => encoded.push_str(&format!("%{:02X}", c as u32)),
            '.' if i == 0 => encoded.push_str("%2E"),
            c => encoded.push(c),
        }
    }
    encoded
}

/// Inverse of [`encode_name`]. A stem that does not decode is taken as is.
pub fn decode_name(stem: &str) -> String {
    urlencoding::decode(stem)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| stem.to_string())
}

fn file_name(name: &str, extension: &str) -> String {
    format!("{}.{}", encode_name(name), extension)
}

/// How artifacts are arranged under the data and schema directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactLayout {
    /// `<dir>/<table>.<ext>`
    Flat,
    /// `<dir>/<schema>/<table>.<ext>`
    Nested,
}

impl ArtifactLayout {
    /// Default layout for an export covering `schema_count` schemas.
    pub fn for_schema_count(schema_count: usize) -> Self {
        if schema_count > 1 {
            ArtifactLayout::Nested
        } else {
            ArtifactLayout::Flat
        }
    }
}

impl std::fmt::Display for ArtifactLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactLayout::Flat => f.write_str("flat"),
            ArtifactLayout::Nested => f.write_str("nested"),
        }
    }
}

/// Artifact paths for an export run.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    data_dir: PathBuf,
    schema_dir: PathBuf,
    layout: ArtifactLayout,
}

impl ArtifactStore {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        schema_dir: impl Into<PathBuf>,
        layout: ArtifactLayout,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            schema_dir: schema_dir.into(),
            layout,
        }
    }

    pub fn layout(&self) -> ArtifactLayout {
        self.layout
    }

    /// CSV artifact path for a table.
    pub fn csv_path(&self, table: &TableRef) -> PathBuf {
        self.path_in(&self.data_dir, table, CSV_EXTENSION)
    }

    /// DDL artifact path for a table.
    pub fn ddl_path(&self, table: &TableRef) -> PathBuf {
        self.path_in(&self.schema_dir, table, DDL_EXTENSION)
    }

    /// Create the directories a schema's artifacts are written to.
    pub fn prepare(&self, schema: &str) -> Result<()> {
        let (data, ddl) = match self.layout {
            ArtifactLayout::Flat => (self.data_dir.clone(), self.schema_dir.clone()),
            ArtifactLayout::Nested => {
                let dir = encode_name(schema);
                (self.data_dir.join(&dir), self.schema_dir.join(&dir))
            }
        };
        fs::create_dir_all(data)?;
        fs::create_dir_all(ddl)?;
        Ok(())
    }

    fn path_in(&self, root: &Path, table: &TableRef, extension: &str) -> PathBuf {
        let file = file_name(&table.table, extension);
        match self.layout {
            ArtifactLayout::Flat => root.join(file),
            ArtifactLayout::Nested => root.join(encode_name(&table.schema)).join(file),
        }
    }
}

/// The artifacts for one table found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPair {
    /// Table name (the CSV file stem).
    pub table: String,
    pub csv: PathBuf,
    /// Definition file, when one exists.
    pub ddl: Option<PathBuf>,
}

/// Artifacts grouped under one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaArtifacts {
    /// Source schema name (directory name), or the flat-mode target.
    pub schema: String,
    pub tables: Vec<ArtifactPair>,
}

/// Everything discovered under a data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub layout: ArtifactLayout,
    /// Schemas holding at least one CSV, in name order.
    pub schemas: Vec<SchemaArtifacts>,
    /// Schema directories without CSV files.
    pub empty_schemas: Vec<String>,
}

impl Discovery {
    /// Number of schema directories (or 1 in flat mode), including empty ones.
    pub fn schemas_found(&self) -> usize {
        self.schemas.len() + self.empty_schemas.len()
    }

    /// Number of CSV artifacts across all schemas.
    pub fn tables_found(&self) -> usize {
        self.schemas.iter().map(|s| s.tables.len()).sum()
    }
}

/// Sniff the layout of a data directory.
pub fn detect_layout(data_dir: &Path) -> Result<ArtifactLayout> {
    if !data_dir.is_dir() {
        return Err(MigrateError::Config(format!(
            "data directory not found: {}",
            data_dir.display()
        )));
    }
    if sub_directories(data_dir)?.is_empty() {
        Ok(ArtifactLayout::Flat)
    } else {
        Ok(ArtifactLayout::Nested)
    }
}

/// Discover artifact pairs under `data_dir`, with definitions looked up in
/// `schema_dir`. In flat mode every pair is grouped under `flat_schema`.
pub fn discover(data_dir: &Path, schema_dir: &Path, flat_schema: &str) -> Result<Discovery> {
    let layout = detect_layout(data_dir)?;

    let discovery = match layout {
        ArtifactLayout::Flat => {
            let tables: Vec<ArtifactPair> = csv_files(data_dir)?
                .into_iter()
                .map(|(table, csv)| {
                    let ddl = existing(schema_dir.join(file_name(&table, DDL_EXTENSION)));
                    ArtifactPair { table, csv, ddl }
                })
                .collect();
            if tables.is_empty() {
                return Err(MigrateError::Config(format!(
                    "no CSV artifacts or schema directories in {}",
                    data_dir.display()
                )));
            }
            Discovery {
                layout,
                schemas: vec![SchemaArtifacts {
                    schema: flat_schema.to_string(),
                    tables,
                }],
                empty_schemas: Vec::new(),
            }
        }
        ArtifactLayout::Nested => {
            let mut schemas = Vec::new();
            let mut empty_schemas = Vec::new();
            for (schema, dir) in sub_directories(data_dir)? {
                let tables: Vec<ArtifactPair> = csv_files(&dir)?
                    .into_iter()
                    .map(|(table, csv)| {
                        let file = file_name(&table, DDL_EXTENSION);
                        let ddl = existing(schema_dir.join(encode_name(&schema)).join(&file))
                            .or_else(|| existing(schema_dir.join(&file)));
                        ArtifactPair { table, csv, ddl }
                    })
                    .collect();
                if tables.is_empty() {
                    warn!("Skipping schema directory {}: no CSV files", dir.display());
                    empty_schemas.push(schema);
                } else {
                    schemas.push(SchemaArtifacts { schema, tables });
                }
            }
            if !csv_files(data_dir)?.is_empty() {
                warn!(
                    "Ignoring CSV files at the top of {}: schema directories take precedence",
                    data_dir.display()
                );
            }
            Discovery {
                layout,
                schemas,
                empty_schemas,
            }
        }
    };

    debug!(
        "Discovered {} artifact(s) in {} schema(s) ({} layout)",
        discovery.tables_found(),
        discovery.schemas_found(),
        discovery.layout
    );
    Ok(discovery)
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

/// Sub-directories of `dir` as `(decoded name, path)`, sorted by name.
fn sub_directories(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                dirs.push((decode_name(name), entry.path()));
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// CSV files directly under `dir` as `(decoded stem, path)`, sorted by name.
fn csv_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(CSV_EXTENSION));
        if !is_csv || !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            files.push((decode_name(stem), path.clone()));
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "A\n1\n").unwrap();
    }

    #[test]
    fn test_store_paths() {
        let t = TableRef::new("DB", "RAW", "Orders");
        let flat = ArtifactStore::new("data", "schema", ArtifactLayout::Flat);
        assert_eq!(flat.csv_path(&t), PathBuf::from("data/Orders.csv"));
        assert_eq!(flat.ddl_path(&t), PathBuf::from("schema/Orders.sql"));

        let nested = ArtifactStore::new("data", "schema", ArtifactLayout::Nested);
        assert_eq!(nested.csv_path(&t), PathBuf::from("data/RAW/Orders.csv"));
        assert_eq!(nested.ddl_path(&t), PathBuf::from("schema/RAW/Orders.sql"));
    }

    #[test]
    fn test_encode_name() {
        assert_eq!(encode_name("Orders"), "Orders");
        assert_eq!(encode_name("line items.v2"), "line items.v2");
        assert_eq!(encode_name("a/b"), "a%2Fb");
        assert_eq!(encode_name(".."), "%2E.");
        assert_eq!(encode_name("../../escaped"), "%2E.%2F..%2Fescaped");
        assert_eq!(encode_name("50%\\x"), "50%25%5Cx");
        for name in ["a/b", "..", "../../escaped", "50%\\x", "Orders"] {
            assert_eq!(decode_name(&encode_name(name)), name);
        }
    }

    #[test]
    fn test_names_with_separators_stay_inside_their_directory() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let schema = tmp.path().join("schema");
        let store = ArtifactStore::new(&data, &schema, ArtifactLayout::Flat);
        store.prepare("RAW").unwrap();

        for name in ["../../escaped", "a/b"] {
            let path = store.csv_path(&TableRef::new("DB", "RAW", name));
            assert_eq!(path.parent(), Some(data.as_path()));
            touch(&path);
            touch(&store.ddl_path(&TableRef::new("DB", "RAW", name)));
        }
        assert!(!tmp.path().parent().unwrap().join("escaped.csv").exists());

        let found = discover(&data, &schema, "PUBLIC").unwrap();
        assert_eq!(found.layout, ArtifactLayout::Flat);
        let tables: Vec<&str> = found.schemas[0].tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(tables, vec!["../../escaped", "a/b"]);
        assert!(found.schemas[0].tables.iter().all(|t| t.ddl.is_some()));
    }

    #[test]
    fn test_nested_schema_name_is_encoded() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let schema = tmp.path().join("schema");
        let store = ArtifactStore::new(&data, &schema, ArtifactLayout::Nested);
        store.prepare("..").unwrap();

        let t = TableRef::new("DB", "..", "T");
        assert_eq!(store.csv_path(&t), data.join("%2E.").join("T.csv"));
        touch(&store.csv_path(&t));

        let found = discover(&data, &schema, "PUBLIC").unwrap();
        assert_eq!(found.schemas[0].schema, "..");
    }

    #[test]
    fn test_layout_for_schema_count() {
        assert_eq!(ArtifactLayout::for_schema_count(1), ArtifactLayout::Flat);
        assert_eq!(ArtifactLayout::for_schema_count(3), ArtifactLayout::Nested);
    }

    #[test]
    fn test_flat_discovery() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let schema = tmp.path().join("schema");
        touch(&data.join("B.csv"));
        touch(&data.join("A.csv"));
        touch(&schema.join("A.sql"));

        let found = discover(&data, &schema, "PUBLIC").unwrap();
        assert_eq!(found.layout, ArtifactLayout::Flat);
        assert_eq!(found.schemas.len(), 1);
        assert_eq!(found.schemas[0].schema, "PUBLIC");
        let tables = &found.schemas[0].tables;
        assert_eq!(tables[0].table, "A");
        assert!(tables[0].ddl.is_some());
        assert_eq!(tables[1].table, "B");
        assert!(tables[1].ddl.is_none());
    }

    #[test]
    fn test_one_sub_directory_selects_nested() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let schema = tmp.path().join("schema");
        touch(&data.join("loose.csv"));
        touch(&data.join("MART").join("T.csv"));
        touch(&schema.join("T.sql"));

        let found = discover(&data, &schema, "PUBLIC").unwrap();
        assert_eq!(found.layout, ArtifactLayout::Nested);
        assert_eq!(found.schemas.len(), 1);
        assert_eq!(found.schemas[0].schema, "MART");
        assert_eq!(found.schemas[0].tables[0].ddl, Some(schema.join("T.sql")));
    }

    #[test]
    fn test_nested_prefers_schema_specific_definition() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let schema = tmp.path().join("schema");
        touch(&data.join("RAW").join("T.csv"));
        touch(&schema.join("T.sql"));
        touch(&schema.join("RAW").join("T.sql"));
        fs::create_dir_all(data.join("EMPTY")).unwrap();

        let found = discover(&data, &schema, "PUBLIC").unwrap();
        assert_eq!(
            found.schemas[0].tables[0].ddl,
            Some(schema.join("RAW").join("T.sql"))
        );
        assert_eq!(found.empty_schemas, vec!["EMPTY"]);
        assert_eq!(found.schemas_found(), 2);
    }

    #[test]
    fn test_empty_or_missing_data_dir_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        assert!(matches!(
            discover(&data, tmp.path(), "PUBLIC"),
            Err(MigrateError::Config(_))
        ));
        fs::create_dir_all(&data).unwrap();
        assert!(matches!(
            discover(&data, tmp.path(), "PUBLIC"),
            Err(MigrateError::Config(_))
        ));
    }
}
