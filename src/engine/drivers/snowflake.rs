// SPDX-License-Identifier: Apache-2.0

//! Snowflake Driver
//!
//! Implements the DataEngine trait on top of the Snowflake SQL API
//! (`/api/v2/statements`) using reqwest.
//!
//! ## Sessions
//!
//! The SQL API is stateless: every request carries its own role, warehouse,
//! database and schema. A "session" here is therefore only a configured HTTP
//! client plus credentials. `connect` still sends `SELECT 1` once so that a
//! bad token or an unreachable endpoint fails before a session is handed out.
//!
//! ## Asynchronous statements
//!
//! Statements that run longer than the API's synchronous window come back as
//! `202 Accepted` with a status URL. The driver polls that URL until the
//! statement completes or fails. Results split into several partitions are
//! fetched partition by partition and concatenated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DataEngine;
use crate::engine::types::{
    ColumnInfo, ConnectionParams, QueryResult, Row, SessionContext, SessionId, Value,
};
use crate::observability::Sensitive;

const STATEMENTS_PATH: &str = "/api/v2/statements";
const TOKEN_TYPE_HEADER: &str = "x-snowflake-authorization-token-type";
const POLL_INITIAL_MS: u64 = 250;
const POLL_MAX_MS: u64 = 2000;
const LOGIN_CHECK: &str = "SELECT 1";

/// How the bearer token in `Authorization` must be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    ProgrammaticAccessToken,
    OAuth,
    KeypairJwt,
}

impl TokenType {
    fn parse(value: &str) -> EngineResult<Self> {
        match value.to_ascii_uppercase().as_str() {
            "PROGRAMMATIC_ACCESS_TOKEN" | "PAT" => Ok(Self::ProgrammaticAccessToken),
            "OAUTH" => Ok(Self::OAuth),
            "KEYPAIR_JWT" | "JWT" => Ok(Self::KeypairJwt),
            other => Err(EngineError::validation(format!(
                "unsupported token_type '{}'",
                other
            ))),
        }
    }

    fn header_value(&self) -> &'static str {
        match self {
            Self::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
            Self::OAuth => "OAUTH",
            Self::KeypairJwt => "KEYPAIR_JWT",
        }
    }
}

/// Connection settings extracted from the opaque connection params
#[derive(Debug, Clone)]
pub struct SnowflakeSettings {
    pub endpoint: Url,
    pub token: Sensitive<String>,
    pub token_type: TokenType,
    /// Server-side statement timeout in seconds
    pub timeout: Option<u32>,
}

impl SnowflakeSettings {
    pub fn from_params(params: &ConnectionParams) -> EngineResult<Self> {
        let endpoint = match params.get_str("host") {
            Some(host) if host.contains("://") => host.to_string(),
            Some(host) => format!("https://{}", host),
            None => {
                let account = params
                    .get_str("account")
                    .ok_or_else(|| EngineError::validation("connection is missing 'account'"))?;
                format!("https://{}.snowflakecomputing.com", account.to_ascii_lowercase())
            }
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| EngineError::validation(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        // A programmatic access token is accepted wherever a password is.
        let (token, token_type) = match (params.get_str("token"), params.get_str("password")) {
            (Some(token), _) => {
                let token_type = params
                    .get_str("token_type")
                    .map(TokenType::parse)
                    .transpose()?
                    .unwrap_or(TokenType::ProgrammaticAccessToken);
                (token, token_type)
            }
            (None, Some(password)) => (password, TokenType::ProgrammaticAccessToken),
            (None, None) => {
                return Err(EngineError::auth_failed(
                    "connection needs a 'token' or a programmatic access token in 'password'",
                ))
            }
        };

        Ok(Self {
            endpoint,
            token: Sensitive::new(token.to_string()),
            token_type,
            timeout: params.get_u32("timeout"),
        })
    }

    fn headers(&self) -> EngineResult<HeaderMap> {
        let invalid = |e: reqwest::header::InvalidHeaderValue| {
            EngineError::validation(format!("invalid header value: {}", e))
        };

        let mut headers = HeaderMap::with_capacity(5);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.token.expose()))
            .map_err(invalid)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            TOKEN_TYPE_HEADER,
            HeaderValue::from_static(self.token_type.header_value()),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            )),
        );
        Ok(headers)
    }
}

/// Holds the HTTP client and settings for one session
pub struct SnowflakeSession {
    client: reqwest::Client,
    settings: SnowflakeSettings,
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
}

impl<'a> StatementRequest<'a> {
    fn new(statement: &'a str, context: &'a SessionContext, timeout: Option<u32>) -> Self {
        Self {
            statement,
            timeout,
            role: context.role.as_deref(),
            warehouse: context.warehouse.as_deref(),
            database: context.database.as_deref(),
            schema: context.schema.as_deref(),
        }
    }
}

/// Body of every statement response, successful or not
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    code: Option<String>,
    message: Option<String>,
    sql_state: Option<String>,
    statement_handle: Option<String>,
    statement_status_url: Option<String>,
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    stats: Option<StatementStats>,
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
    data_type: String,
    scale: Option<i64>,
    #[serde(default = "default_nullable")]
    nullable: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionInfo {
    #[allow(dead_code)]
    row_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementStats {
    num_rows_inserted: Option<u64>,
    num_rows_updated: Option<u64>,
    num_rows_deleted: Option<u64>,
}

impl StatementStats {
    fn affected(&self) -> Option<u64> {
        match (self.num_rows_inserted, self.num_rows_updated, self.num_rows_deleted) {
            (None, None, None) => None,
            (i, u, d) => Some(i.unwrap_or(0) + u.unwrap_or(0) + d.unwrap_or(0)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PartitionResponse {
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

/// Snowflake SQL API driver implementation
pub struct SnowflakeDriver {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<SnowflakeSession>>>>,
}

impl SnowflakeDriver {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn get_session(&self, session: SessionId) -> EngineResult<Arc<SnowflakeSession>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session)
            .cloned()
            .ok_or_else(|| EngineError::session_not_found(session.0.to_string()))
    }

    fn statements_url(endpoint: &Url, request_id: Uuid) -> EngineResult<Url> {
        let mut url = endpoint
            .join(STATEMENTS_PATH)
            .map_err(|e| EngineError::internal(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("requestId", &request_id.to_string());
        Ok(url)
    }

    fn partition_url(endpoint: &Url, handle: &str, partition: usize) -> EngineResult<Url> {
        let mut url = endpoint
            .join(&format!("{}/{}", STATEMENTS_PATH, handle))
            .map_err(|e| EngineError::internal(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("partition", &partition.to_string());
        Ok(url)
    }

    async fn send(request: reqwest::RequestBuilder) -> EngineResult<(StatusCode, String)> {
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::connection_failed(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::connection_failed(e.to_string()))?;
        Ok((status, body))
    }

    fn parse_body(body: &str) -> StatementResponse {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Maps a failed HTTP exchange to an engine error
    fn map_error(status: StatusCode, body: &str, timeout: Option<u32>) -> EngineError {
        let parsed = Self::parse_body(body);
        let message = match (&parsed.code, parsed.message.as_deref()) {
            (Some(code), Some(msg)) => format!("{} ({})", msg, code),
            (None, Some(msg)) => msg.to_string(),
            _ if body.trim().is_empty() => format!("HTTP {}", status),
            _ => format!("HTTP {}: {}", status, body.trim()),
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EngineError::auth_failed(message),
            StatusCode::REQUEST_TIMEOUT => EngineError::Timeout {
                timeout_ms: timeout.map(|t| t as u64 * 1000).unwrap_or(0),
            },
            _ if message.starts_with("SQL compilation error") => EngineError::syntax_error(message),
            _ if parsed.sql_state.as_deref() == Some("42000") => EngineError::syntax_error(message),
            _ => EngineError::execution_error(message),
        }
    }

    /// Polls the status URL of an asynchronous statement until it finishes
    async fn wait_for_completion(
        session: &SnowflakeSession,
        headers: &HeaderMap,
        status_url: &str,
    ) -> EngineResult<StatementResponse> {
        let url = session
            .settings
            .endpoint
            .join(status_url)
            .map_err(|e| EngineError::internal(e.to_string()))?;
        let mut delay = POLL_INITIAL_MS;

        loop {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let (status, body) =
                Self::send(session.client.get(url.clone()).headers(headers.clone())).await?;

            match status {
                StatusCode::OK => return Ok(Self::parse_body(&body)),
                StatusCode::ACCEPTED => {
                    debug!(url = %url, "Statement still running");
                    delay = (delay * 2).min(POLL_MAX_MS);
                }
                _ => return Err(Self::map_error(status, &body, session.settings.timeout)),
            }
        }
    }

    /// Fetches partitions 1..n and appends their rows
    async fn fetch_partitions(
        session: &SnowflakeSession,
        headers: &HeaderMap,
        response: &mut StatementResponse,
    ) -> EngineResult<()> {
        let partitions = response
            .result_set_meta_data
            .as_ref()
            .map(|m| m.partition_info.len())
            .unwrap_or(0);
        if partitions <= 1 {
            return Ok(());
        }
        let handle = response
            .statement_handle
            .clone()
            .ok_or_else(|| EngineError::internal("partitioned result without statement handle"))?;

        for partition in 1..partitions {
            let url = Self::partition_url(&session.settings.endpoint, &handle, partition)?;
            let (status, body) = Self::send(session.client.get(url).headers(headers.clone())).await?;
            if status != StatusCode::OK {
                return Err(Self::map_error(status, &body, session.settings.timeout));
            }
            let page: PartitionResponse = serde_json::from_str(&body)
                .map_err(|e| EngineError::internal(format!("malformed partition {}: {}", partition, e)))?;
            response.data.extend(page.data);
        }
        Ok(())
    }

    /// Submits one statement and collects every partition of its result
    async fn run_statement(
        session: &SnowflakeSession,
        context: &SessionContext,
        statement: &str,
    ) -> EngineResult<QueryResult> {
        let headers = session.settings.headers()?;
        let url = Self::statements_url(&session.settings.endpoint, Uuid::new_v4())?;
        let body = StatementRequest::new(statement, context, session.settings.timeout);

        let start = Instant::now();
        let (status, text) = Self::send(
            session
                .client
                .post(url)
                .headers(headers.clone())
                .json(&body),
        )
        .await?;

        let mut response = match status {
            StatusCode::OK => Self::parse_body(&text),
            StatusCode::ACCEPTED => {
                let parsed = Self::parse_body(&text);
                let status_url = parsed.statement_status_url.ok_or_else(|| {
                    EngineError::internal("asynchronous statement without status URL")
                })?;
                Self::wait_for_completion(session, &headers, &status_url).await?
            }
            _ => {
                let err = Self::map_error(status, &text, session.settings.timeout);
                warn!(status = %status, error = %err, "Statement failed");
                return Err(err);
            }
        };

        Self::fetch_partitions(session, &headers, &mut response).await?;
        Ok(Self::into_query_result(
            response,
            start.elapsed().as_secs_f64() * 1000.0,
        ))
    }

    /// Runs a trivial statement with no context to check the credentials
    ///
    /// Rejected tokens stay authentication errors and transport failures
    /// stay connection errors; anything else the server answers with is
    /// reported as a failed connection.
    async fn check_login(session: &SnowflakeSession) -> EngineResult<()> {
        match Self::run_statement(session, &SessionContext::default(), LOGIN_CHECK).await {
            Ok(_) => Ok(()),
            Err(err @ (EngineError::AuthenticationFailed { .. } | EngineError::ConnectionFailed { .. })) => {
                Err(err)
            }
            Err(err) => Err(EngineError::connection_failed(format!("login check failed: {}", err))),
        }
    }

    fn into_query_result(response: StatementResponse, elapsed_ms: f64) -> QueryResult {
        let row_type = response
            .result_set_meta_data
            .map(|m| m.row_type)
            .unwrap_or_default();

        let columns = row_type
            .iter()
            .map(|col| ColumnInfo {
                name: col.name.clone(),
                data_type: col.data_type.clone(),
                nullable: col.nullable,
            })
            .collect();

        let rows = response
            .data
            .into_iter()
            .map(|cells| Row {
                values: cells
                    .into_iter()
                    .enumerate()
                    .map(|(idx, cell)| match (cell, row_type.get(idx)) {
                        (None, _) => Value::Null,
                        (Some(raw), Some(col)) => decode_cell(&raw, &col.data_type, col.scale),
                        (Some(raw), None) => Value::Text(raw),
                    })
                    .collect(),
            })
            .collect();

        QueryResult {
            columns,
            rows,
            affected_rows: response.stats.and_then(|s| s.affected()),
            execution_time_ms: elapsed_ms,
            statement_handle: response.statement_handle,
        }
    }
}

impl Default for SnowflakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataEngine for SnowflakeDriver {
    fn driver_id(&self) -> &'static str {
        "snowflake"
    }

    fn driver_name(&self) -> &'static str {
        "Snowflake"
    }

    async fn connect(&self, params: &ConnectionParams) -> EngineResult<SessionId> {
        let settings = SnowflakeSettings::from_params(params)?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EngineError::connection_failed(e.to_string()))?;

        let session = SnowflakeSession { client, settings };
        Self::check_login(&session).await?;
        debug!(endpoint = %session.settings.endpoint, "Snowflake login check passed");

        let session_id = SessionId::new();
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, Arc::new(session));
        Ok(session_id)
    }

    async fn disconnect(&self, session: SessionId) -> EngineResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(&session)
            .map(|_| ())
            .ok_or_else(|| EngineError::session_not_found(session.0.to_string()))
    }

    async fn execute(
        &self,
        session: SessionId,
        context: &SessionContext,
        statement: &str,
    ) -> EngineResult<QueryResult> {
        let session = self.get_session(session).await?;
        Self::run_statement(&session, context, statement).await
    }
}

/// Converts one JSON-encoded cell into a typed value
///
/// The SQL API returns every value as a string; timestamps are epoch seconds
/// with a fractional part (`timestamp_tz` adds an offset in minutes biased
/// by 1440) and dates are days since the epoch.
fn decode_cell(raw: &str, data_type: &str, scale: Option<i64>) -> Value {
    let parsed = match data_type.to_ascii_lowercase().as_str() {
        "fixed" if scale.unwrap_or(0) == 0 => raw.parse().ok().map(Value::Int),
        "fixed" | "real" => raw.parse().ok().map(Value::Float),
        "boolean" => match raw {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        "date" => raw
            .parse::<i64>()
            .ok()
            .and_then(|days| {
                NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(chrono::Duration::days(days))
            })
            .map(|d| Value::Text(d.format("%Y-%m-%d").to_string())),
        "timestamp_ntz" | "timestamp_ltz" => parse_epoch(raw)
            .map(|dt| Value::Text(dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.3f").to_string())),
        "timestamp_tz" => parse_timestamp_tz(raw)
            .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.3f %:z").to_string())),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::Text(raw.to_string()))
}

fn parse_epoch(raw: &str) -> Option<DateTime<chrono::Utc>> {
    let (secs, frac) = raw.split_once('.').unwrap_or((raw, "0"));
    let mut secs: i64 = secs.parse().ok()?;
    let digits: String = frac.chars().take(9).collect();
    let mut nanos: u32 = format!("{:0<9}", digits).parse().ok()?;
    if raw.starts_with('-') && nanos > 0 {
        secs -= 1;
        nanos = 1_000_000_000 - nanos;
    }
    DateTime::from_timestamp(secs, nanos)
}

fn parse_timestamp_tz(raw: &str) -> Option<DateTime<FixedOffset>> {
    let (epoch, offset) = raw.split_once(' ')?;
    let minutes: i32 = offset.parse::<i32>().ok()? - 1440;
    let offset = FixedOffset::east_opt(minutes * 60)?;
    Some(parse_epoch(epoch)?.with_timezone(&offset))
}
