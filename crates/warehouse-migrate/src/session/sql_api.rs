//! Session over the warehouse's SQL REST API (`/api/v2/statements`).
//!
//! Each statement is one HTTP request carrying the session context (database,
//! schema, warehouse, role), so [`Session::use_schema`] only updates local
//! state. Long-running statements answer `202 Accepted` and are polled by
//! handle; large results arrive in partitions that are fetched in order.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use super::{BulkOptions, ResultSet, Session, SessionError, SessionResult};
use crate::config::ConnectionConfig;
use crate::core::{Batch, ColumnDescriptor, SqlValue, TableRef};
use crate::error::{MigrateError, Result};
use crate::load::insert_statement;

const STATEMENTS_PATH: &str = "/api/v2/statements";
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";
const TOKEN_TYPE: &str = "PROGRAMMATIC_ACCESS_TOKEN";

/// Rows per array-bound INSERT request.
const BULK_CHUNK_ROWS: usize = 10_000;

const POLL_INITIAL: Duration = Duration::from_millis(250);
const POLL_MAX: Duration = Duration::from_secs(5);

/// Session context sent with every request.
#[derive(Debug, Clone, Default)]
struct Context {
    database: Option<String>,
    schema: Option<String>,
}

/// Warehouse session backed by the SQL REST API.
pub struct SqlApiSession {
    client: Client,
    base_url: String,
    account: String,
    token: String,
    warehouse: String,
    role: Option<String>,
    timeout_secs: u64,
    bulk_transfer: bool,
    context: Mutex<Context>,
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    warehouse: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, Binding>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Binding {
    #[serde(rename = "type")]
    kind: &'static str,
    value: JsonValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    sql_state: Option<String>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<PartitionInfo>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    scale: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionInfo {
    #[serde(default)]
    #[allow(dead_code)]
    row_count: u64,
}

impl SqlApiSession {
    /// Build a session without contacting the warehouse.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(MigrateError::Config(
                "connection token is required (--token or SNOWFLAKE_TOKEN)".into(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs + 30))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            account: config.account_identifier(),
            token: config.token.clone(),
            warehouse: config.warehouse.clone(),
            role: config.role.clone(),
            timeout_secs: config.timeout_secs,
            bulk_transfer: config.bulk_transfer,
            context: Mutex::new(Context {
                database: Some(config.database.clone()),
                schema: Some(config.schema.clone()),
            }),
        })
    }

    /// Build a session and verify it with a trivial statement.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let session = Self::new(config)?;
        session.execute("SELECT 1").await.map_err(|e| match e {
            SessionError::Connectivity(msg) => MigrateError::Connectivity(msg),
            other => MigrateError::Connectivity(other.to_string()),
        })?;
        info!(
            "Connected to warehouse account {} (warehouse {}, user {})",
            session.account, config.warehouse, config.user
        );
        Ok(session)
    }

    fn context(&self) -> Context {
        self.context
            .lock()
            .map(|ctx| ctx.clone())
            .unwrap_or_default()
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header(TOKEN_TYPE_HEADER, TOKEN_TYPE)
            .header(header::ACCEPT, "application/json")
    }

    async fn submit(
        &self,
        sql: &str,
        bindings: BTreeMap<String, Binding>,
    ) -> SessionResult<ResultSet> {
        let ctx = self.context();
        let body = StatementRequest {
            statement: sql,
            timeout: self.timeout_secs,
            database: ctx.database,
            schema: ctx.schema,
            warehouse: &self.warehouse,
            role: self.role.as_deref(),
            bindings,
        };

        debug!("Submitting statement: {}", sql);
        let request_id = uuid::Uuid::new_v4().to_string();
        let resp = self
            .authorized(self.client.post(format!("{}{}", self.base_url, STATEMENTS_PATH)))
            .query(&[("requestId", request_id.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Connectivity(e.to_string()))?;

        let first = self.wait_for_result(resp).await?;
        self.collect_partitions(first).await
    }

    async fn get_statement(&self, handle: &str, partition: Option<usize>) -> SessionResult<Response> {
        let mut builder = self
            .authorized(
                self.client
                    .get(format!("{}{}/{}", self.base_url, STATEMENTS_PATH, handle)),
            );
        if let Some(p) = partition {
            builder = builder.query(&[("partition", p.to_string())]);
        }
        builder
            .send()
            .await
            .map_err(|e| SessionError::Connectivity(e.to_string()))
    }

    /// Follow `202 Accepted` responses until the statement finishes.
    async fn wait_for_result(&self, mut resp: Response) -> SessionResult<StatementResponse> {
        let deadline = Instant::now() + Duration::from_secs(self.timeout_secs);
        let mut delay = POLL_INITIAL;

        loop {
            let status = resp.status();
            let body = read_body(resp).await?;

            match status {
                StatusCode::OK => return Ok(body),
                StatusCode::ACCEPTED => {
                    let handle = body.statement_handle.ok_or_else(|| {
                        SessionError::Execution("statement accepted without a handle".into())
                    })?;
                    if Instant::now() >= deadline {
                        return Err(SessionError::Execution(format!(
                            "statement {} did not finish within {}s",
                            handle, self.timeout_secs
                        )));
                    }
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(POLL_MAX);
                    resp = self.get_statement(&handle, None).await?;
                }
                other => return Err(classify_error(other, &body)),
            }
        }
    }

    /// Fetch partitions 1..n and decode the whole result.
    async fn collect_partitions(&self, mut first: StatementResponse) -> SessionResult<ResultSet> {
        let meta = first.result_set_meta_data.take().unwrap_or_default();
        let mut data = std::mem::take(&mut first.data);

        if meta.partition_info.len() > 1 {
            let handle = first.statement_handle.clone().ok_or_else(|| {
                SessionError::Execution("partitioned result without a handle".into())
            })?;
            for partition in 1..meta.partition_info.len() {
                let resp = self.get_statement(&handle, Some(partition)).await?;
                let status = resp.status();
                let body = read_body(resp).await?;
                if status != StatusCode::OK {
                    return Err(classify_error(status, &body));
                }
                data.extend(body.data);
            }
        }

        Ok(decode_result(&meta.row_type, data))
    }
}

#[async_trait]
impl Session for SqlApiSession {
    async fn execute_with(&self, sql: &str, params: &[SqlValue]) -> SessionResult<ResultSet> {
        let bindings = params
            .iter()
            .enumerate()
            .map(|(i, v)| ((i + 1).to_string(), scalar_binding(v)))
            .collect();
        self.submit(sql, bindings).await
    }

    async fn use_schema(&self, database: &str, schema: &str) -> SessionResult<()> {
        let mut ctx = self
            .context
            .lock()
            .map_err(|_| SessionError::Execution("session context poisoned".into()))?;
        ctx.database = Some(database.to_string());
        ctx.schema = Some(schema.to_string());
        Ok(())
    }

    fn supports_bulk_transfer(&self) -> bool {
        self.bulk_transfer
    }

    async fn bulk_transfer(
        &self,
        target: &TableRef,
        batch: &Batch,
        options: BulkOptions,
    ) -> SessionResult<u64> {
        if !self.bulk_transfer {
            return Err(SessionError::Unsupported(
                "bulk transfer disabled for this connection".into(),
            ));
        }
        if options.auto_create_target {
            return Err(SessionError::Unsupported(
                "the SQL API cannot create the target table during transfer".into(),
            ));
        }

        let sql = insert_statement(target, batch.columns())
            .map_err(|e| SessionError::Execution(e.to_string()))?;
        let mut written = 0u64;
        for chunk in batch.rows().chunks(BULK_CHUNK_ROWS) {
            let result = self.submit(&sql, array_bindings(batch.columns().len(), chunk)).await?;
            written += result
                .scalar_text()
                .and_then(|n| n.parse::<u64>().ok())
                .unwrap_or(chunk.len() as u64);
        }
        Ok(written)
    }

    fn account(&self) -> &str {
        &self.account
    }

    async fn close(&self) {
        debug!("Closing SQL API session for account {}", self.account);
    }
}

async fn read_body(resp: Response) -> SessionResult<StatementResponse> {
    let text = resp
        .text()
        .await
        .map_err(|e| SessionError::Connectivity(e.to_string()))?;
    Ok(serde_json::from_str(&text).unwrap_or_else(|_| StatementResponse {
        message: Some(text),
        ..Default::default()
    }))
}

fn scalar_binding(value: &SqlValue) -> Binding {
    let (kind, text) = match value {
        SqlValue::Null => ("TEXT", None),
        SqlValue::Bool(_) => ("BOOLEAN", value.to_text()),
        SqlValue::Int(_) => ("FIXED", value.to_text()),
        SqlValue::Float(_) => ("REAL", value.to_text()),
        _ => ("TEXT", value.to_text()),
    };
    Binding {
        kind,
        value: text.map(JsonValue::String).unwrap_or(JsonValue::Null),
    }
}

/// One array binding per column; every row contributes one element to each.
fn array_bindings(width: usize, rows: &[Vec<SqlValue>]) -> BTreeMap<String, Binding> {
    (0..width)
        .map(|idx| {
            let values = rows
                .iter()
                .map(|row| {
                    row.get(idx)
                        .and_then(SqlValue::to_text)
                        .map(JsonValue::String)
                        .unwrap_or(JsonValue::Null)
                })
                .collect();
            (
                (idx + 1).to_string(),
                Binding {
                    kind: "TEXT",
                    value: JsonValue::Array(values),
                },
            )
        })
        .collect()
}

fn classify_error(status: StatusCode, body: &StatementResponse) -> SessionError {
    let message = body
        .message
        .clone()
        .unwrap_or_else(|| format!("HTTP {}", status));

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status.is_server_error()
    {
        return SessionError::Connectivity(message);
    }

    let sql_state = body.sql_state.as_deref().unwrap_or_default();
    let code = body.code.as_deref().unwrap_or_default();
    let lower = message.to_lowercase();

    if sql_state == "0A000"
        || lower.contains("not supported")
        || lower.contains("unsupported")
        || lower.contains("does not support")
    {
        SessionError::Unsupported(message)
    } else if matches!(sql_state, "02000" | "42S02" | "42501") || code == "002003" {
        SessionError::NotFound(message)
    } else {
        SessionError::Execution(message)
    }
}

fn decode_result(row_type: &[RowType], data: Vec<Vec<Option<String>>>) -> ResultSet {
    let columns = ColumnDescriptor::from_names(row_type.iter().map(|r| r.name.clone()));
    let rows = data
        .into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(i, raw)| match row_type.get(i) {
                    Some(rt) => decode_value(&rt.kind, rt.scale.unwrap_or(0), raw),
                    None => SqlValue::from(raw),
                })
                .collect()
        })
        .collect();
    ResultSet::new(columns, rows)
}

fn decode_value(kind: &str, scale: i64, raw: Option<String>) -> SqlValue {
    let Some(raw) = raw else {
        return SqlValue::Null;
    };

    let decoded = match kind.to_lowercase().as_str() {
        "fixed" if scale == 0 => raw.parse::<i64>().ok().map(SqlValue::Int),
        "real" => raw.parse::<f64>().ok().map(SqlValue::Float),
        "boolean" => match raw.to_lowercase().as_str() {
            "true" | "1" => Some(SqlValue::Bool(true)),
            "false" | "0" => Some(SqlValue::Bool(false)),
            _ => None,
        },
        "date" => raw.parse::<i64>().ok().and_then(epoch_days).map(SqlValue::Date),
        "timestamp_ntz" | "timestamp_ltz" | "timestamp_tz" => raw
            .split_whitespace()
            .next()
            .and_then(epoch_seconds)
            .map(SqlValue::Timestamp),
        _ => None,
    };

    decoded.unwrap_or(SqlValue::Text(raw))
}

fn epoch_days(days: i64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    if days >= 0 {
        epoch.checked_add_days(Days::new(days as u64))
    } else {
        epoch.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

/// Parse `seconds[.fraction]` since the epoch.
fn epoch_seconds(raw: &str) -> Option<NaiveDateTime> {
    let negative = raw.starts_with('-');
    let (secs, frac) = raw.split_once('.').unwrap_or((raw, ""));
    let mut secs: i64 = secs.parse().ok()?;
    let mut digits: String = frac.chars().take(9).collect();
    while digits.len() < 9 {
        digits.push('0');
    }
    let mut nanos: u32 = digits.parse().ok()?;
    if negative && nanos > 0 {
        secs -= 1;
        nanos = 1_000_000_000 - nanos;
    }
    DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
}
