//! Edge HTTP connector.
//!
//! Each statement is one HTTPS request to the provider's SQL endpoint. There
//! is no pool to warm up or drain, which suits short-lived execution contexts.

use super::{ensure_matches, Connector};
use crate::config::ConnectionConfig;
use crate::provider::Provider;
use crate::session::{Row, Session, SqlValue, Statement};
use crate::{BackendError, DbError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

const CONNECTION_STRING_HEADER: &str = "Neon-Connection-String";
const RAW_TEXT_HEADER: &str = "Neon-Raw-Text-Output";
const ARRAY_MODE_HEADER: &str = "Neon-Array-Mode";

// Postgres type OIDs reported in the response field list.
const BOOL_OID: u32 = 16;
const INT8_OID: u32 = 20;
const INT2_OID: u32 = 21;
const INT4_OID: u32 = 23;
const OID_OID: u32 = 26;
const JSON_OID: u32 = 114;
const FLOAT4_OID: u32 = 700;
const FLOAT8_OID: u32 = 701;
const TIMESTAMP_OID: u32 = 1114;
const TIMESTAMPTZ_OID: u32 = 1184;
const NUMERIC_OID: u32 = 1700;
const JSONB_OID: u32 = 3802;

/// Connector for the serverless HTTP provider.
#[derive(Debug, Clone)]
pub struct EdgeHttpConnector {
    user_agent: String,
}

impl Default for EdgeHttpConnector {
    fn default() -> Self {
        Self {
            user_agent: format!("bookbase/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[async_trait]
impl Connector for EdgeHttpConnector {
    fn provider(&self) -> Provider {
        Provider::EdgeHttp
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Session>> {
        ensure_matches(Provider::EdgeHttp, config)?;

        let endpoint = match &config.http_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => sql_endpoint(&config.connection_string)?,
        };

        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(config.acquire_timeout)
            .build()
            .map_err(|e| DbError::backend(Provider::EdgeHttp, e))?;

        debug!(provider = %Provider::EdgeHttp, endpoint = %endpoint, "Edge session ready");

        Ok(Arc::new(EdgeSession {
            client,
            endpoint,
            connection_string: config.connection_string.clone(),
            debug: config.debug,
        }))
    }
}

/// Derive `https://<host>/sql` from a postgres connection string.
fn sql_endpoint(connection_string: &str) -> Result<String> {
    let url = Url::parse(connection_string).map_err(|e| {
        DbError::Configuration(format!("{} is not a valid URL: {}", Provider::EdgeHttp.url_key(), e))
    })?;

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(format!("https://{}/sql", host)),
        _ => Err(DbError::Configuration(format!(
            "{} has no host",
            Provider::EdgeHttp.url_key()
        ))),
    }
}

struct EdgeSession {
    client: reqwest::Client,
    endpoint: String,
    connection_string: String,
    debug: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    fields: Vec<Field>,
    #[serde(default)]
    rows: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct Field {
    name: String,
    #[serde(rename = "dataTypeID")]
    data_type_id: u32,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl EdgeSession {
    fn fail(&self, error: impl Into<BackendError>) -> DbError {
        let error = DbError::backend(Provider::EdgeHttp, error);
        warn!(provider = %Provider::EdgeHttp, error = %error, "Statement failed");
        error
    }
}

#[async_trait]
impl Session for EdgeSession {
    fn provider(&self) -> Provider {
        Provider::EdgeHttp
    }

    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>> {
        if self.debug {
            debug!(provider = %Provider::EdgeHttp, sql = %statement.sql, params = statement.params.len(), "Executing statement");
        }

        let params: Vec<Option<String>> = statement.params.iter().map(SqlValue::to_text).collect();
        let body = json!({ "query": statement.sql, "params": params });

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONNECTION_STRING_HEADER, &self.connection_string)
            .header(RAW_TEXT_HEADER, "true")
            .header(ARRAY_MODE_HEADER, "false")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.fail(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let remote = response.json::<RemoteError>().await.unwrap_or(RemoteError {
                message: format!("HTTP {}", status),
                code: None,
            });
            return Err(self.fail(BackendError::Remote {
                code: remote.code,
                message: remote.message,
            }));
        }

        let result: QueryResponse = response.json().await.map_err(|e| self.fail(e.without_url()))?;
        into_rows(result).map_err(|message| self.fail(BackendError::Remote { code: None, message }))
    }

    async fn release(&self) -> Result<()> {
        // Nothing is held between requests.
        Ok(())
    }
}

fn into_rows(result: QueryResponse) -> std::result::Result<Vec<Row>, String> {
    result
        .rows
        .into_iter()
        .map(|mut raw| {
            for field in &result.fields {
                if let Some(value) = raw.remove(&field.name) {
                    raw.insert(field.name.clone(), from_text(field.data_type_id, value)?);
                }
            }
            Ok(Row::from(raw))
        })
        .collect()
}

/// Convert a raw text value into the JSON shape the pooled driver produces.
fn from_text(type_id: u32, value: Value) -> std::result::Result<Value, String> {
    let text = match value {
        Value::String(text) => text,
        other => return Ok(other),
    };

    let converted = match type_id {
        BOOL_OID => Value::Bool(matches!(text.as_str(), "t" | "true")),
        INT2_OID | INT4_OID | INT8_OID | OID_OID => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("bad integer '{}': {}", text, e))?,
        FLOAT4_OID | FLOAT8_OID | NUMERIC_OID => text
            .parse::<f64>()
            .map(Value::from)
            .map_err(|e| format!("bad number '{}': {}", text, e))?,
        TIMESTAMPTZ_OID => Value::from(parse_timestamptz(&text)?.to_rfc3339()),
        TIMESTAMP_OID => NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
            .map(|t| Value::from(t.and_utc().to_rfc3339()))
            .map_err(|e| format!("bad timestamp '{}': {}", text, e))?,
        JSON_OID | JSONB_OID => {
            serde_json::from_str(&text).map_err(|e| format!("bad json: {}", e))?
        }
        _ => Value::String(text),
    };

    Ok(converted)
}

fn parse_timestamptz(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamptz '{}': {}", text, e))
}
