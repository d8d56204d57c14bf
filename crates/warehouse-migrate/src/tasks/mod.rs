//! Scheduled task capture and replay.
//!
//! Capture writes every task's `GET_DDL('TASK', ...)` output to one file,
//! blocks separated by a blank line. Replay runs those blocks verbatim, or,
//! when the file holds no task DDL, creates the configured definitions.
//! Tasks come up suspended either way.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{qualify, quote_ident, quote_literal};
use crate::error::{MigrateError, Result};
use crate::session::Session;

/// Written when a capture finds no task DDL.
const EMPTY_CAPTURE: &str =
    "-- No task DDL captured. Check SHOW TASKS privileges (OWNERSHIP or MONITOR on tasks).\n";

/// A task authored in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    /// Schedule clause, e.g. `60 MINUTE` or `USING CRON 0 8 * * * UTC`.
    pub schedule: String,
    /// Single SQL statement the task runs.
    pub statement: String,
}

impl TaskDefinition {
    /// `CREATE OR REPLACE TASK` for this definition. Newlines in the
    /// statement are collapsed to spaces.
    pub fn create_statement(&self, database: &str, schema: &str, warehouse: &str) -> Result<String> {
        let statement = self
            .statement
            .trim()
            .lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(" ");
        Ok(format!(
            "CREATE OR REPLACE TASK {} WAREHOUSE = {} SCHEDULE = {} AS {}",
            qualify(database, schema, &self.name)?,
            quote_ident(warehouse)?,
            quote_literal(&self.schedule),
            statement
        ))
    }
}

/// Outcome of a capture.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskCapture {
    /// Qualified names of captured tasks.
    pub captured: Vec<String>,
    /// Tasks whose DDL could not be read, with the cause.
    pub skipped: Vec<(String, String)>,
}

/// Where replayed tasks came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    File,
    Definitions,
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReplay {
    pub source: TaskSource,
    pub created: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Target of a definitions-based replay.
#[derive(Debug, Clone)]
pub struct TaskTarget {
    pub database: String,
    pub schema: String,
    pub warehouse: String,
}

/// Capture every task in `database` into `path`.
pub async fn capture_tasks(session: &dyn Session, database: &str, path: &Path) -> Result<TaskCapture> {
    let sql = format!("SHOW TASKS IN DATABASE {}", quote_ident(database)?);
    let rs = session
        .execute(&sql)
        .await
        .map_err(|e| MigrateError::catalog_access(format!("tasks in {}", database), e))?;

    let column = |name: &str| {
        rs.column_index(name).ok_or_else(|| MigrateError::CatalogAccess {
            scope: format!("tasks in {}", database),
            message: format!("SHOW TASKS result has no {} column", name),
        })
    };
    let (name_idx, db_idx, schema_idx) = (column("name")?, column("database_name")?, column("schema_name")?);

    let mut capture = TaskCapture::default();
    let mut blocks = Vec::new();

    for row in &rs.rows {
        let text = |idx: usize| row.get(idx).and_then(|v| v.to_text()).unwrap_or_default();
        let (task, db, schema) = (text(name_idx), text(db_idx), text(schema_idx));
        let label = format!("{}.{}", schema, task);
        let qualified = match qualify(&db, &schema, &task) {
            Ok(q) => q,
            Err(e) => {
                warn!("  Skipped {}: {}", label, e);
                capture.skipped.push((label, e.to_string()));
                continue;
            }
        };

        let ddl_sql = format!("SELECT GET_DDL('TASK', {})", quote_literal(&qualified));
        match session.execute(&ddl_sql).await {
            Ok(rs) => match rs.scalar_text().filter(|d| !d.trim().is_empty()) {
                Some(ddl) => {
                    info!("  Captured {}", label);
                    blocks.push(ddl.trim().to_string());
                    capture.captured.push(qualified);
                }
                None => {
                    warn!("  Skipped {}: no DDL returned", label);
                    capture.skipped.push((label, "no DDL returned".into()));
                }
            },
            Err(e) => {
                let err = MigrateError::query(&label, e);
                if err.is_fatal() {
                    return Err(err);
                }
                warn!("  Skipped {}: {}", label, err);
                capture.skipped.push((label, err.to_string()));
            }
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if blocks.is_empty() {
        fs::write(path, EMPTY_CAPTURE)?;
    } else {
        fs::write(path, blocks.join("\n\n") + "\n")?;
    }
    info!("Wrote {} task(s) to {}", capture.captured.len(), path.display());
    Ok(capture)
}

/// Blocks of a task file that hold DDL (comment-only blocks dropped).
pub fn task_blocks(content: &str) -> Vec<String> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|b| !b.is_empty() && !b.starts_with("--"))
        .map(String::from)
        .collect()
}

/// Replay the task file at `path` if it holds DDL, else create `definitions`.
///
/// Unqualified names in the file resolve against `target`'s schema.
pub async fn replay_tasks(
    session: &dyn Session,
    path: &Path,
    definitions: &[TaskDefinition],
    target: &TaskTarget,
) -> Result<TaskReplay> {
    let blocks = if path.is_file() {
        task_blocks(&fs::read_to_string(path)?)
    } else {
        Vec::new()
    };

    let (source, statements) = if blocks.is_empty() {
        let statements = definitions
            .iter()
            .map(|d| {
                let sql = d.create_statement(&target.database, &target.schema, &target.warehouse)?;
                Ok((format!("{}.{}", target.schema, d.name), sql))
            })
            .collect::<Result<Vec<_>>>()?;
        (TaskSource::Definitions, statements)
    } else {
        let statements = blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| (block_label(&block).unwrap_or_else(|| format!("block {}", i + 1)), block))
            .collect();
        (TaskSource::File, statements)
    };

    session
        .use_schema(&target.database, &target.schema)
        .await
        .map_err(|e| {
            MigrateError::catalog_access(format!("schema {}.{}", target.database, target.schema), e)
        })?;

    let mut replay = TaskReplay {
        source,
        created: Vec::new(),
        failed: Vec::new(),
    };
    for (label, sql) in statements {
        match session.execute(&sql).await {
            Ok(_) => {
                info!("  Created task {}", label);
                replay.created.push(label);
            }
            Err(e) => {
                let err = MigrateError::structure(&label, e);
                if err.is_fatal() {
                    return Err(err);
                }
                warn!("  Failed to create task {}: {}", label, err);
                replay.failed.push((label, err.to_string()));
            }
        }
    }
    Ok(replay)
}

/// Name following the `TASK` keyword of a DDL block.
fn block_label(block: &str) -> Option<String> {
    let mut words = block.split_whitespace();
    words.find(|w| w.eq_ignore_ascii_case("TASK"))?;
    words.next().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySession, MemoryTask, SessionError};
    use tempfile::TempDir;

    fn heartbeat() -> TaskDefinition {
        TaskDefinition {
            name: "LAB_HEARTBEAT".into(),
            schedule: "60 MINUTE".into(),
            statement: "SELECT 1 AS heartbeat,\n  CURRENT_TIMESTAMP() AS at".into(),
        }
    }

    fn task(schema: &str, name: &str) -> MemoryTask {
        MemoryTask {
            database: "LAB".into(),
            schema: schema.into(),
            name: name.into(),
            definition: format!(
                "create or replace task {}\n\twarehouse=WH\n\tschedule='1 DAY'\n\tas SELECT 1;",
                name
            ),
        }
    }

    #[test]
    fn test_create_statement() {
        let sql = heartbeat().create_statement("LAB", "OPS", "WH").unwrap();
        assert_eq!(
            sql,
            "CREATE OR REPLACE TASK \"LAB\".\"OPS\".\"LAB_HEARTBEAT\" WAREHOUSE = \"WH\" SCHEDULE = '60 MINUTE' AS SELECT 1 AS heartbeat, CURRENT_TIMESTAMP() AS at"
        );
    }

    #[test]
    fn test_task_blocks_skip_comments() {
        let content = "-- header\n\ncreate task A as SELECT 1;\n\n\n\ncreate task B as SELECT 2;\n";
        assert_eq!(
            task_blocks(content),
            vec!["create task A as SELECT 1;", "create task B as SELECT 2;"]
        );
        assert!(task_blocks(EMPTY_CAPTURE).is_empty());
    }

    #[tokio::test]
    async fn test_capture_writes_blocks_and_skips_failures() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks").join("tasks.sql");
        let session = MemorySession::new();
        session.add_schema("LAB", "OPS");
        session.add_task(task("OPS", "A"));
        session.add_task(task("OPS", "B"));
        session.fail_on("\"B\"')", SessionError::NotFound("no privilege".into()));

        let capture = capture_tasks(&session, "LAB", &path).await.unwrap();
        assert_eq!(capture.captured, vec!["\"LAB\".\"OPS\".\"A\""]);
        assert_eq!(capture.skipped.len(), 1);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("create or replace task A"));
        assert!(content.ends_with(";\n"));
    }

    #[tokio::test]
    async fn test_capture_skips_task_with_unquotable_name() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.sql");
        let session = MemorySession::new();
        session.add_schema("LAB", "OPS");
        session.add_task(task("OPS", &"T".repeat(300)));
        session.add_task(task("OPS", "GOOD"));

        let capture = capture_tasks(&session, "LAB", &path).await.unwrap();
        assert_eq!(capture.captured, vec!["\"LAB\".\"OPS\".\"GOOD\""]);
        assert_eq!(capture.skipped.len(), 1);
        assert!(capture.skipped[0].1.contains("maximum length"));
    }

    #[tokio::test]
    async fn test_capture_with_no_tasks_writes_comment() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.sql");
        let session = MemorySession::new();
        session.add_database("LAB");

        let capture = capture_tasks(&session, "LAB", &path).await.unwrap();
        assert!(capture.captured.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), EMPTY_CAPTURE);
    }

    #[tokio::test]
    async fn test_replay_prefers_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.sql");
        fs::write(
            &path,
            "CREATE OR REPLACE TASK \"LAB\".\"OPS\".\"A\" WAREHOUSE = WH SCHEDULE = '1 DAY' AS SELECT 1\n\nCREATE OR REPLACE TASK \"LAB\".\"OPS\".\"B\" WAREHOUSE = WH SCHEDULE = '1 DAY' AS SELECT 2\n",
        )
        .unwrap();
        let session = MemorySession::new();
        session.add_schema("LAB", "OPS");
        let target = TaskTarget {
            database: "LAB".into(),
            schema: "OPS".into(),
            warehouse: "WH".into(),
        };

        let replay = replay_tasks(&session, &path, &[heartbeat()], &target).await.unwrap();
        assert_eq!(replay.source, TaskSource::File);
        assert_eq!(replay.created.len(), 2);
        let names: Vec<String> = session.tasks().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_replay_falls_back_to_definitions() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.sql");
        fs::write(&path, EMPTY_CAPTURE).unwrap();
        let session = MemorySession::new();
        session.add_schema("LAB", "OPS");
        let target = TaskTarget {
            database: "LAB".into(),
            schema: "OPS".into(),
            warehouse: "WH".into(),
        };

        let replay = replay_tasks(&session, &path, &[heartbeat()], &target).await.unwrap();
        assert_eq!(replay.source, TaskSource::Definitions);
        assert_eq!(replay.created, vec!["OPS.LAB_HEARTBEAT"]);

        // Idempotent by name.
        replay_tasks(&session, &path, &[heartbeat()], &target).await.unwrap();
        assert_eq!(session.tasks().len(), 1);
    }
}
