//! Session health check.

use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::session::Session;

const IDENTITY_QUERY: &str =
    "SELECT CURRENT_USER(), CURRENT_ROLE(), CURRENT_WAREHOUSE(), CURRENT_DATABASE(), CURRENT_SCHEMA()";

/// Result of probing a session.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub account: String,
    pub connected: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub healthy: bool,
}

/// Run the identity query and report what the session is bound to.
///
/// Never fails: a session error is reported in [`HealthCheckResult::error`].
pub async fn health_check(session: &dyn Session) -> HealthCheckResult {
    let start = Instant::now();
    let outcome = session.execute(IDENTITY_QUERY).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let mut result = HealthCheckResult {
        account: session.account().to_string(),
        connected: false,
        latency_ms,
        user: None,
        role: None,
        warehouse: None,
        database: None,
        schema: None,
        error: None,
        healthy: false,
    };

    match outcome {
        Ok(rs) => {
            let cell = |idx: usize| rs.rows.first().and_then(|r| r.get(idx)).and_then(|v| v.to_text());
            result.user = cell(0);
            result.role = cell(1);
            result.warehouse = cell(2);
            result.database = cell(3);
            result.schema = cell(4);
            result.connected = true;
            result.healthy = true;
        }
        Err(e) => {
            debug!("Health check failed: {}", e);
            result.error = Some(e.to_string());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySession, SessionError};

    #[tokio::test]
    async fn test_healthy_session() {
        let session = MemorySession::new().with_account("xy12345");
        let result = health_check(&session).await;
        assert!(result.healthy);
        assert_eq!(result.account, "xy12345");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_session() {
        let session = MemorySession::new();
        session.fail_on("CURRENT_USER", SessionError::Connectivity("401 Unauthorized".into()));
        let result = health_check(&session).await;
        assert!(!result.connected);
        assert!(!result.healthy);
        assert!(result.error.unwrap().contains("401"));
    }
}
