//! In-process warehouse catalog.
//!
//! `MemorySession` understands the handful of statement shapes the pipeline
//! issues (catalog listings, `GET_DDL`, `SELECT *`, idempotent `CREATE`,
//! parameterized `INSERT`, `TRUNCATE`, task creation) and records every
//! statement it receives. Anything else is recorded and answered with an empty
//! result, which is what makes it usable as a dry-run target.
//!
//! Unquoted names resolve upper-cased and quoted names verbatim, like the real
//! warehouse. Structural changes (database, schema, table and task creation)
//! are counted so tests can assert idempotency.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{BulkOptions, ResultSet, Session, SessionError, SessionResult};
use crate::core::{Batch, ColumnDescriptor, SqlValue, TableRef};

const INFORMATION_SCHEMA: &str = "INFORMATION_SCHEMA";
const CONSTRAINT_KEYWORDS: [&str; 4] = ["CONSTRAINT", "PRIMARY", "UNIQUE", "FOREIGN"];

/// A task stored in the in-process catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTask {
    pub database: String,
    pub schema: String,
    pub name: String,
    /// Full `CREATE ... TASK` text returned by `GET_DDL('TASK', ...)`.
    pub definition: String,
}

#[derive(Debug, Clone)]
enum Definition {
    /// Built from the column list on request.
    Synthesized,
    Fixed(String),
    Unsupported,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    definition: Definition,
}

#[derive(Debug, Default)]
struct MemorySchema {
    name: String,
    tables: Vec<MemoryTable>,
}

#[derive(Debug, Default)]
struct MemoryDatabase {
    name: String,
    schemas: Vec<MemorySchema>,
}

#[derive(Debug, Default)]
struct State {
    databases: Vec<MemoryDatabase>,
    tasks: Vec<MemoryTask>,
    database: Option<String>,
    schema: Option<String>,
    statements: Vec<String>,
    mutations: usize,
    failures: Vec<(String, SessionError)>,
    bulk_enabled: bool,
    bulk_calls: usize,
}

/// Recording session over an in-memory catalog.
#[derive(Debug)]
pub struct MemorySession {
    account: String,
    state: Mutex<State>,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// Empty catalog with bulk transfer enabled.
    pub fn new() -> Self {
        Self {
            account: "memory".to_string(),
            state: Mutex::new(State {
                bulk_enabled: true,
                ..Default::default()
            }),
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a database (no-op if present).
    pub fn add_database(&self, database: &str) {
        self.state().ensure_database(database);
    }

    /// Add a schema, creating its database if needed.
    pub fn add_schema(&self, database: &str, schema: &str) {
        self.state().ensure_schema(database, schema);
    }

    /// Add or replace a table with the given columns and rows.
    pub fn add_table(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
    ) {
        let mut state = self.state();
        let schema = state.ensure_schema(database, schema);
        let table = MemoryTable {
            name: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            definition: Definition::Synthesized,
        };
        match schema.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => schema.tables.push(table),
        }
    }

    /// Fix the text `GET_DDL` returns for a table.
    pub fn set_definition(&self, database: &str, schema: &str, table: &str, ddl: &str) {
        self.set_table_definition(database, schema, table, Definition::Fixed(ddl.to_string()));
    }

    /// Make `GET_DDL` report the table's definition as unsupported.
    pub fn set_definition_unsupported(&self, database: &str, schema: &str, table: &str) {
        self.set_table_definition(database, schema, table, Definition::Unsupported);
    }

    fn set_table_definition(&self, database: &str, schema: &str, table: &str, def: Definition) {
        let mut state = self.state();
        if let Some(t) = state.table_mut(database, schema, table) {
            t.definition = def;
        }
    }

    /// Add or replace a task.
    pub fn add_task(&self, task: MemoryTask) {
        self.state().put_task(task);
    }

    /// Fail every statement containing `pattern` with `error`.
    ///
    /// Bulk transfers are matched against `-- bulk transfer ... into <table>`.
    pub fn fail_on(&self, pattern: impl Into<String>, error: SessionError) {
        self.state().failures.push((pattern.into(), error));
    }

    /// Toggle the bulk transfer primitive.
    pub fn set_bulk_transfer(&self, enabled: bool) {
        self.state().bulk_enabled = enabled;
    }

    /// Every statement received, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    /// Forget recorded statements and counters, keeping the catalog.
    pub fn reset_log(&self) {
        let mut state = self.state();
        state.statements.clear();
        state.mutations = 0;
        state.bulk_calls = 0;
    }

    /// Number of structural changes (created databases, schemas, tables, tasks).
    pub fn mutation_count(&self) -> usize {
        self.state().mutations
    }

    /// Number of bulk transfer calls that reached the catalog.
    pub fn bulk_calls(&self) -> usize {
        self.state().bulk_calls
    }

    pub fn has_schema(&self, database: &str, schema: &str) -> bool {
        self.state().schema(database, schema).is_some()
    }

    pub fn has_table(&self, database: &str, schema: &str, table: &str) -> bool {
        self.state().table(database, schema, table).is_some()
    }

    pub fn table_columns(&self, database: &str, schema: &str, table: &str) -> Option<Vec<String>> {
        self.state()
            .table(database, schema, table)
            .map(|t| t.columns.clone())
    }

    pub fn table_rows(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Option<Vec<Vec<SqlValue>>> {
        self.state()
            .table(database, schema, table)
            .map(|t| t.rows.clone())
    }

    pub fn tasks(&self) -> Vec<MemoryTask> {
        self.state().tasks.clone()
    }
}

impl State {
    fn ensure_database(&mut self, name: &str) -> &mut MemoryDatabase {
        let idx = match self.databases.iter().position(|d| d.name == name) {
            Some(idx) => idx,
            None => {
                self.databases.push(MemoryDatabase {
                    name: name.to_string(),
                    schemas: Vec::new(),
                });
                self.databases.len() - 1
            }
        };
        &mut self.databases[idx]
    }

    fn ensure_schema(&mut self, database: &str, schema: &str) -> &mut MemorySchema {
        let db = self.ensure_database(database);
        let idx = match db.schemas.iter().position(|s| s.name == schema) {
            Some(idx) => idx,
            None => {
                db.schemas.push(MemorySchema {
                    name: schema.to_string(),
                    tables: Vec::new(),
                });
                db.schemas.len() - 1
            }
        };
        &mut db.schemas[idx]
    }

    fn database(&self, name: &str) -> Option<&MemoryDatabase> {
        self.databases.iter().find(|d| d.name == name)
    }

    fn schema(&self, database: &str, schema: &str) -> Option<&MemorySchema> {
        self.database(database)?
            .schemas
            .iter()
            .find(|s| s.name == schema)
    }

    fn schema_mut(&mut self, database: &str, schema: &str) -> Option<&mut MemorySchema> {
        self.databases
            .iter_mut()
            .find(|d| d.name == database)?
            .schemas
            .iter_mut()
            .find(|s| s.name == schema)
    }

    fn table(&self, database: &str, schema: &str, table: &str) -> Option<&MemoryTable> {
        self.schema(database, schema)?
            .tables
            .iter()
            .find(|t| t.name == table)
    }

    fn table_mut(&mut self, database: &str, schema: &str, table: &str) -> Option<&mut MemoryTable> {
        self.schema_mut(database, schema)?
            .tables
            .iter_mut()
            .find(|t| t.name == table)
    }

    fn put_task(&mut self, task: MemoryTask) {
        match self.tasks.iter_mut().find(|t| {
            t.database == task.database && t.schema == task.schema && t.name == task.name
        }) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }

    fn injected_failure(&self, sql: &str) -> Option<SessionError> {
        self.failures
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, err)| err.clone())
    }

    fn current_database(&self) -> SessionResult<String> {
        self.database
            .clone()
            .ok_or_else(|| SessionError::Execution("no current database".into()))
    }

    fn current_schema(&self) -> SessionResult<String> {
        self.schema
            .clone()
            .ok_or_else(|| SessionError::Execution("no current schema".into()))
    }

    /// Resolve a 1 to 3 part name against the session context.
    fn resolve(&self, parts: Vec<String>) -> SessionResult<TableRef> {
        let mut parts = parts;
        match parts.len() {
            3 => {
                let table = parts.remove(2);
                let schema = parts.remove(1);
                Ok(TableRef::new(parts.remove(0), schema, table))
            }
            2 => {
                let table = parts.remove(1);
                Ok(TableRef::new(self.current_database()?, parts.remove(0), table))
            }
            1 => Ok(TableRef::new(
                self.current_database()?,
                self.current_schema()?,
                parts.remove(0),
            )),
            _ => Err(SessionError::Execution(format!(
                "invalid object name: {}",
                parts.join(".")
            ))),
        }
    }

    fn resolve_schema(&self, parts: Vec<String>) -> SessionResult<(String, String)> {
        let mut parts = parts;
        match parts.len() {
            2 => {
                let schema = parts.remove(1);
                Ok((parts.remove(0), schema))
            }
            1 => Ok((self.current_database()?, parts.remove(0))),
            _ => Err(SessionError::Execution(format!(
                "invalid schema name: {}",
                parts.join(".")
            ))),
        }
    }

    fn existing_table(&mut self, target: &TableRef) -> SessionResult<&mut MemoryTable> {
        self.table_mut(&target.database, &target.schema, &target.table)
            .ok_or_else(|| not_found("Table", target))
    }

    fn run(&mut self, sql: &str, params: &[SqlValue]) -> SessionResult<ResultSet> {
        let text = strip_comments(sql);
        let text = text.trim().trim_end_matches(';').trim_end();

        if strip_keywords(text, &["SHOW", "DATABASES"]).is_some() {
            return Ok(name_listing(
                &["created_on", "name"],
                self.databases.iter().map(|d| vec![d.name.clone()]),
            ));
        }

        if let Some(rest) = strip_keywords(text, &["SHOW", "SCHEMAS", "IN", "DATABASE"]) {
            let database = single_name(rest)?;
            let db = self.database(&database).ok_or_else(|| {
                SessionError::NotFound(format!(
                    "Database '{}' does not exist or not authorized.",
                    database
                ))
            })?;
            let names = std::iter::once(INFORMATION_SCHEMA.to_string())
                .chain(db.schemas.iter().map(|s| s.name.clone()));
            return Ok(name_listing(
                &["created_on", "name", "database_name"],
                names.map(|n| vec![n, database.clone()]),
            ));
        }

        if let Some(rest) = strip_keywords(text, &["SHOW", "TABLES", "IN", "SCHEMA"]) {
            let (parts, _) = take_name(rest).ok_or_else(|| syntax_error(sql))?;
            let (database, schema) = self.resolve_schema(parts)?;
            if schema.eq_ignore_ascii_case(INFORMATION_SCHEMA) && self.database(&database).is_some() {
                return Ok(name_listing(&["created_on", "name"], std::iter::empty()));
            }
            let s = self.schema(&database, &schema).ok_or_else(|| {
                SessionError::NotFound(format!(
                    "Schema '{}.{}' does not exist or not authorized.",
                    database, schema
                ))
            })?;
            return Ok(name_listing(
                &["created_on", "name", "database_name", "schema_name"],
                s.tables
                    .iter()
                    .map(|t| vec![t.name.clone(), database.clone(), schema.clone()]),
            ));
        }

        if let Some(rest) = strip_keywords(text, &["SHOW", "TASKS", "IN", "DATABASE"]) {
            let database = single_name(rest)?;
            if self.database(&database).is_none() {
                return Err(SessionError::NotFound(format!(
                    "Database '{}' does not exist or not authorized.",
                    database
                )));
            }
            return Ok(name_listing(
                &["created_on", "name", "database_name", "schema_name"],
                self.tasks
                    .iter()
                    .filter(|t| t.database == database)
                    .map(|t| vec![t.name.clone(), t.database.clone(), t.schema.clone()]),
            ));
        }

        if let Some(rest) = strip_keywords(text, &["SELECT", "GET_DDL"]) {
            return self.get_ddl(rest, sql);
        }

        if let Some(rest) = strip_keywords(text, &["SELECT", "*", "FROM"]) {
            let (parts, rest) = take_name(rest).ok_or_else(|| syntax_error(sql))?;
            let limit = match strip_keywords(rest, &["LIMIT"]) {
                Some(n) => Some(
                    n.trim()
                        .parse::<usize>()
                        .map_err(|_| syntax_error(sql))?,
                ),
                None => None,
            };
            let target = self.resolve(parts)?;
            let table = self
                .table(&target.database, &target.schema, &target.table)
                .ok_or_else(|| not_found("Table", &target))?;
            let rows = table
                .rows
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect();
            return Ok(ResultSet::new(
                ColumnDescriptor::from_names(table.columns.iter().cloned()),
                rows,
            ));
        }

        if strip_keywords(text, &["SELECT", "1"]).is_some_and(str::is_empty) {
            return Ok(ResultSet::new(
                ColumnDescriptor::from_names(["1"]),
                vec![vec![SqlValue::Int(1)]],
            ));
        }

        if let Some(rest) = strip_keywords(text, &["CREATE", "DATABASE", "IF", "NOT", "EXISTS"]) {
            let database = single_name(rest)?;
            if self.database(&database).is_none() {
                self.ensure_database(&database);
                self.mutations += 1;
            }
            return Ok(ResultSet::empty());
        }

        if let Some(rest) = strip_keywords(text, &["CREATE", "SCHEMA", "IF", "NOT", "EXISTS"]) {
            let (parts, _) = take_name(rest).ok_or_else(|| syntax_error(sql))?;
            let (database, schema) = self.resolve_schema(parts)?;
            if self.database(&database).is_none() {
                return Err(SessionError::NotFound(format!(
                    "Database '{}' does not exist or not authorized.",
                    database
                )));
            }
            if self.schema(&database, &schema).is_none() {
                self.ensure_schema(&database, &schema);
                self.mutations += 1;
            }
            return Ok(ResultSet::empty());
        }

        if let Some(rest) = strip_keywords(text, &["CREATE", "OR", "REPLACE", "TASK"]) {
            let (parts, _) = take_name(rest).ok_or_else(|| syntax_error(sql))?;
            let target = self.resolve(parts)?;
            if self.schema(&target.database, &target.schema).is_none() {
                return Err(SessionError::NotFound(format!(
                    "Schema '{}.{}' does not exist or not authorized.",
                    target.database, target.schema
                )));
            }
            self.put_task(MemoryTask {
                database: target.database,
                schema: target.schema,
                name: target.table,
                definition: sql.trim().to_string(),
            });
            self.mutations += 1;
            return Ok(ResultSet::empty());
        }

        if let Some(create) = parse_create_table(text) {
            return self.create_table(create, sql);
        }

        if let Some(rest) = strip_keywords(text, &["INSERT", "INTO"]) {
            return self.insert(rest, params, sql);
        }

        if let Some(rest) = strip_keywords(text, &["TRUNCATE"]) {
            let rest = strip_keywords(rest, &["TABLE"]).unwrap_or(rest);
            let (if_exists, rest) = match strip_keywords(rest, &["IF", "EXISTS"]) {
                Some(rest) => (true, rest),
                None => (false, rest),
            };
            let (parts, _) = take_name(rest).ok_or_else(|| syntax_error(sql))?;
            let target = self.resolve(parts)?;
            match self.table_mut(&target.database, &target.schema, &target.table) {
                Some(table) => table.rows.clear(),
                None if if_exists => {}
                None => return Err(not_found("Table", &target)),
            }
            return Ok(ResultSet::empty());
        }

        Ok(ResultSet::empty())
    }

    fn get_ddl(&self, rest: &str, sql: &str) -> SessionResult<ResultSet> {
        let rest = rest.trim_start().strip_prefix('(').ok_or_else(|| syntax_error(sql))?;
        let (kind, rest) = take_literal(rest).ok_or_else(|| syntax_error(sql))?;
        let rest = rest.trim_start().strip_prefix(',').ok_or_else(|| syntax_error(sql))?;
        let (name, _) = take_literal(rest).ok_or_else(|| syntax_error(sql))?;
        let parts = split_qualified(&name).ok_or_else(|| syntax_error(sql))?;
        let target = self.resolve(parts)?;

        let ddl = match kind.to_uppercase().as_str() {
            "TABLE" => {
                let table = self
                    .table(&target.database, &target.schema, &target.table)
                    .ok_or_else(|| not_found("Table", &target))?;
                match &table.definition {
                    Definition::Fixed(ddl) => ddl.clone(),
                    Definition::Synthesized => synthesize_definition(table),
                    Definition::Unsupported => {
                        return Err(SessionError::Unsupported(format!(
                            "GET_DDL is not supported for {}",
                            target
                        )))
                    }
                }
            }
            "TASK" => self
                .tasks
                .iter()
                .find(|t| {
                    t.database == target.database
                        && t.schema == target.schema
                        && t.name == target.table
                })
                .map(|t| t.definition.clone())
                .ok_or_else(|| not_found("Task", &target))?,
            other => {
                return Err(SessionError::Unsupported(format!(
                    "GET_DDL for object type {}",
                    other
                )))
            }
        };

        Ok(ResultSet::new(
            ColumnDescriptor::from_names([format!("GET_DDL('{}', '{}')", kind, name)]),
            vec![vec![SqlValue::Text(ddl)]],
        ))
    }

    fn create_table(&mut self, create: CreateTable, sql: &str) -> SessionResult<ResultSet> {
        let target = self.resolve(create.name)?;
        if self.schema(&target.database, &target.schema).is_none() {
            return Err(SessionError::NotFound(format!(
                "Schema '{}.{}' does not exist or not authorized.",
                target.database, target.schema
            )));
        }
        let exists = self
            .table(&target.database, &target.schema, &target.table)
            .is_some();
        if exists && create.if_not_exists {
            return Ok(ResultSet::empty());
        }
        if exists && !create.or_replace {
            return Err(SessionError::Execution(format!(
                "Object '{}' already exists.",
                target
            )));
        }
        if create.columns.is_empty() {
            return Err(syntax_error(sql));
        }

        let table = MemoryTable {
            name: target.table.clone(),
            columns: create.columns,
            rows: Vec::new(),
            definition: Definition::Synthesized,
        };
        let schema = self.ensure_schema(&target.database, &target.schema);
        match schema.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => schema.tables.push(table),
        }
        self.mutations += 1;
        Ok(ResultSet::empty())
    }

    fn insert(&mut self, rest: &str, params: &[SqlValue], sql: &str) -> SessionResult<ResultSet> {
        let (parts, rest) = take_name(rest).ok_or_else(|| syntax_error(sql))?;
        let (column_list, rest) = take_parenthesized(rest).ok_or_else(|| syntax_error(sql))?;
        if strip_keywords(rest, &["VALUES"]).is_none() {
            return Err(syntax_error(sql));
        }
        let columns = split_top_level(column_list)
            .into_iter()
            .map(|c| {
                split_qualified(c)
                    .and_then(|mut p| (p.len() == 1).then(|| p.remove(0)))
                    .ok_or_else(|| syntax_error(sql))
            })
            .collect::<SessionResult<Vec<String>>>()?;
        if columns.len() != params.len() {
            return Err(SessionError::Execution(format!(
                "expected {} bind values, got {}",
                columns.len(),
                params.len()
            )));
        }

        let target = self.resolve(parts)?;
        let table = self.existing_table(&target)?;
        let row = place_row(table, &columns, params)?;
        table.rows.push(row);

        Ok(ResultSet::new(
            ColumnDescriptor::from_names(["number of rows inserted"]),
            vec![vec![SqlValue::Int(1)]],
        ))
    }

    fn bulk(&mut self, target: &TableRef, batch: &Batch, options: BulkOptions) -> SessionResult<u64> {
        if !self.bulk_enabled {
            return Err(SessionError::Unsupported(
                "bulk transfer is not available".into(),
            ));
        }
        if self.table(&target.database, &target.schema, &target.table).is_none() {
            if !options.auto_create_target {
                return Err(not_found("Table", target));
            }
            self.ensure_schema(&target.database, &target.schema)
                .tables
                .push(MemoryTable {
                    name: target.table.clone(),
                    columns: batch.columns().to_vec(),
                    rows: Vec::new(),
                    definition: Definition::Synthesized,
                });
            self.mutations += 1;
        }

        self.bulk_calls += 1;
        let table = self.existing_table(target)?;
        let mut placed = Vec::with_capacity(batch.len());
        for row in batch.rows() {
            placed.push(place_row(table, batch.columns(), row)?);
        }
        table.rows.extend(placed);
        Ok(batch.len() as u64)
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn execute_with(&self, sql: &str, params: &[SqlValue]) -> SessionResult<ResultSet> {
        let mut state = self.state();
        state.statements.push(sql.to_string());
        if let Some(err) = state.injected_failure(sql) {
            return Err(err);
        }
        state.run(sql, params)
    }

    async fn use_schema(&self, database: &str, schema: &str) -> SessionResult<()> {
        let mut state = self.state();
        if state.schema(database, schema).is_none() {
            return Err(SessionError::NotFound(format!(
                "Schema '{}.{}' does not exist or not authorized.",
                database, schema
            )));
        }
        state.database = Some(database.to_string());
        state.schema = Some(schema.to_string());
        Ok(())
    }

    fn supports_bulk_transfer(&self) -> bool {
        self.state().bulk_enabled
    }

    async fn bulk_transfer(
        &self,
        target: &TableRef,
        batch: &Batch,
        options: BulkOptions,
    ) -> SessionResult<u64> {
        let mut state = self.state();
        let entry = format!("-- bulk transfer: {} rows into {}", batch.len(), target);
        state.statements.push(entry.clone());
        if let Some(err) = state.injected_failure(&entry) {
            return Err(err);
        }
        state.bulk(target, batch, options)
    }

    fn account(&self) -> &str {
        &self.account
    }

    async fn close(&self) {}
}

fn not_found(kind: &str, target: &TableRef) -> SessionError {
    SessionError::NotFound(format!(
        "{} '{}' does not exist or not authorized.",
        kind, target
    ))
}

fn syntax_error(sql: &str) -> SessionError {
    SessionError::Execution(format!("SQL compilation error: cannot parse '{}'", sql.trim()))
}

/// Result in `SHOW` shape: `created_on` first, name second.
fn name_listing<I>(columns: &[&str], rows: I) -> ResultSet
where
    I: Iterator<Item = Vec<String>>,
{
    let rows = rows
        .map(|values| {
            std::iter::once(SqlValue::Null)
                .chain(values.into_iter().map(SqlValue::Text))
                .collect()
        })
        .collect();
    ResultSet::new(ColumnDescriptor::from_names(columns.iter().copied()), rows)
}

fn single_name(rest: &str) -> SessionResult<String> {
    match take_name(rest) {
        Some((mut parts, _)) if parts.len() == 1 => Ok(parts.remove(0)),
        _ => Err(SessionError::Execution(format!("invalid name: {}", rest.trim()))),
    }
}

/// Position values given in `columns` order into the table's column order.
fn place_row(
    table: &MemoryTable,
    columns: &[String],
    values: &[SqlValue],
) -> SessionResult<Vec<SqlValue>> {
    let mut row = vec![SqlValue::Null; table.columns.len()];
    for (column, value) in columns.iter().zip(values) {
        let idx = table
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| {
                SessionError::NotFound(format!("invalid identifier '{}'", column))
            })?;
        row[idx] = value.clone();
    }
    Ok(row)
}

fn synthesize_definition(table: &MemoryTable) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("\t{} VARCHAR(16777216)", c))
        .collect();
    format!(
        "create or replace TABLE {} (\n{}\n);",
        table.name,
        columns.join(",\n")
    )
}

struct CreateTable {
    or_replace: bool,
    if_not_exists: bool,
    name: Vec<String>,
    columns: Vec<String>,
}

fn parse_create_table(text: &str) -> Option<CreateTable> {
    let rest = strip_keywords(text, &["CREATE"])?;
    let (or_replace, rest) = match strip_keywords(rest, &["OR", "REPLACE"]) {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let rest = strip_keywords(rest, &["TRANSIENT"]).unwrap_or(rest);
    let rest = strip_keywords(rest, &["TABLE"])?;
    let (if_not_exists, rest) = match strip_keywords(rest, &["IF", "NOT", "EXISTS"]) {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let (name, rest) = take_name(rest)?;
    let columns = match take_parenthesized(rest) {
        Some((body, _)) => split_top_level(body)
            .into_iter()
            .filter_map(column_name)
            .collect(),
        None => Vec::new(),
    };
    Some(CreateTable {
        or_replace,
        if_not_exists,
        name,
        columns,
    })
}

/// Column name of one element of a `CREATE TABLE` body, `None` for constraints.
fn column_name(item: &str) -> Option<String> {
    let (mut parts, _) = take_name(item)?;
    if parts.len() != 1 {
        return None;
    }
    let name = parts.remove(0);
    if CONSTRAINT_KEYWORDS.contains(&name.as_str()) && !item.trim_start().starts_with('"') {
        return None;
    }
    Some(name)
}

/// Remove `--` comments outside of quoted text.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    for line in sql.lines() {
        let mut quote: Option<char> = None;
        let mut cut = line.len();
        let mut prev_dash = false;
        for (i, c) in line.char_indices() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '\'' || c == '"' => quote = Some(c),
                None if c == '-' && prev_dash => {
                    cut = i - 1;
                    break;
                }
                None => {}
            }
            prev_dash = quote.is_none() && c == '-';
        }
        out.push_str(&line[..cut]);
        out.push('\n');
    }
    out
}

/// Match leading keywords case-insensitively and return what follows.
fn strip_keywords<'a>(text: &'a str, keywords: &[&str]) -> Option<&'a str> {
    let mut rest = text.trim_start();
    for keyword in keywords {
        let head = rest.get(..keyword.len())?;
        if !head.eq_ignore_ascii_case(keyword) {
            return None;
        }
        let tail = &rest[keyword.len()..];
        let continues_word = tail
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let keyword_is_word = keyword.chars().all(|c| c.is_alphanumeric() || c == '_');
        if continues_word && keyword_is_word {
            return None;
        }
        rest = tail.trim_start();
    }
    Some(rest)
}

/// Take a possibly qualified, possibly quoted object name.
fn take_name(input: &str) -> Option<(Vec<String>, &str)> {
    let input = input.trim_start();
    let mut end = input.len();
    let mut quoted = false;
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if quoted {
            if c == '"' {
                if matches!(chars.peek(), Some((_, '"'))) {
                    chars.next();
                } else {
                    quoted = false;
                }
            }
            continue;
        }
        match c {
            '"' => quoted = true,
            c if c.is_whitespace() || matches!(c, '(' | ')' | ',' | ';') => {
                end = i;
                break;
            }
            _ => {}
        }
    }

    let parts = split_qualified(&input[..end])?;
    Some((parts, &input[end..]))
}

/// Split a possibly-qualified, possibly-quoted name into its parts.
///
/// `"db"."s"."t"` yields `["db", "s", "t"]`; unquoted parts are upper-cased
/// because that is how the warehouse resolves them. Returns `None` on an
/// unterminated quote or an empty part.
fn split_qualified(name: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut chars = name.trim().chars().peekable();

    loop {
        let mut part = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next()? {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        part.push('"');
                    }
                    '"' => break,
                    c => part.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == '.' || c.is_whitespace() {
                    break;
                }
                part.push(c);
                chars.next();
            }
            part = part.to_uppercase();
        }

        if part.is_empty() {
            return None;
        }
        parts.push(part);

        match chars.next() {
            Some('.') => continue,
            None => return Some(parts),
            Some(_) => return None,
        }
    }
}

/// Take a single-quoted literal, unescaping doubled quotes.
fn take_literal(input: &str) -> Option<(String, &str)> {
    let input = input.trim_start();
    let body = input.strip_prefix('\'')?;
    let mut value = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                value.push('\'');
            } else {
                return Some((value, &body[i + 1..]));
            }
        } else {
            value.push(c);
        }
    }
    None
}

/// Take a balanced `( ... )` group; returns the inside and the remainder.
fn take_parenthesized(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    let body = input.strip_prefix('(')?;
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    for (i, c) in body.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((&body[..i], &body[i + 1..]));
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Split on commas that are not nested in parentheses or quotes.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    items.push(input[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    items.push(input[start..].trim());
    items.into_iter().filter(|s| !s.is_empty()).collect()
}
