//! The session capability shared by every backend.

use crate::provider::Provider;
use crate::{DbError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sqlx::PgPool;

/// An open handle to one backend, able to execute statements.
///
/// Sessions must be released by the caller once they are no longer needed.
#[async_trait]
pub trait Session: Send + Sync {
    /// Provider this session talks to.
    fn provider(&self) -> Provider;

    /// Execute a single parameterized statement and return its rows.
    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>>;

    /// Release the underlying connections.
    async fn release(&self) -> Result<()>;

    /// Underlying connection pool, for sessions that keep one.
    fn pg_pool(&self) -> Option<&PgPool> {
        None
    }
}

/// SQL text with positional `$n` placeholders and their values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn with_params(mut self, params: Vec<SqlValue>) -> Self {
        self.params.extend(params);
        self
    }
}

/// A statement parameter. Nulls keep their type so pooled drivers can
/// declare the right parameter type to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Timestamp(Option<DateTime<Utc>>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Bool(v) => v.is_none(),
            SqlValue::Int(v) => v.is_none(),
            SqlValue::Float(v) => v.is_none(),
            SqlValue::Text(v) => v.is_none(),
            SqlValue::Timestamp(v) => v.is_none(),
        }
    }

    /// Postgres text representation, `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Bool(v) => v.map(|b| b.to_string()),
            SqlValue::Int(v) => v.map(|i| i.to_string()),
            SqlValue::Float(v) => v.map(|f| f.to_string()),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Timestamp(v) => v.map(|t| t.to_rfc3339()),
        }
    }
}

macro_rules! sql_value_from {
    ($variant:ident, $ty:ty, $conv:expr) => {
        impl From<$ty> for SqlValue {
            fn from(value: $ty) -> Self {
                SqlValue::$variant(Some($conv(value)))
            }
        }

        impl From<Option<$ty>> for SqlValue {
            fn from(value: Option<$ty>) -> Self {
                SqlValue::$variant(value.map($conv))
            }
        }
    };
}

sql_value_from!(Bool, bool, |v| v);
sql_value_from!(Int, i64, |v| v);
sql_value_from!(Int, i32, i64::from);
sql_value_from!(Float, f64, |v| v);
sql_value_from!(Text, String, |v| v);
sql_value_from!(Timestamp, DateTime<Utc>, |v| v);

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(Some(value.to_string()))
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(Some(value.clone()))
    }
}

impl From<Option<&str>> for SqlValue {
    fn from(value: Option<&str>) -> Self {
        SqlValue::Text(value.map(str::to_string))
    }
}

/// One result row: column names mapped to JSON values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Map<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Decode one column.
    pub fn get<T: DeserializeOwned>(&self, column: &str) -> Result<T> {
        let value = self.columns.get(column).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| DbError::Decode(format!("column '{}': {}", column, e)))
    }

    /// Decode the whole row into an entity.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(Value::Object(self.columns)).map_err(|e| DbError::Decode(e.to_string()))
    }
}

impl From<Map<String, Value>> for Row {
    fn from(columns: Map<String, Value>) -> Self {
        Self { columns }
    }
}

/// Decode every row into an entity.
pub(crate) fn decode_all<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(Row::decode).collect()
}

/// Decode the first row, if any.
pub(crate) fn decode_first<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Option<T>> {
    rows.into_iter().next().map(Row::decode).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        id: i64,
        name: String,
        note: Option<String>,
        seen_at: DateTime<Utc>,
    }

    #[test]
    fn test_typed_nulls_keep_type() {
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Int(None));
        assert_eq!(SqlValue::from(None::<String>), SqlValue::Text(None));
        assert!(SqlValue::from(None::<DateTime<Utc>>).is_null());
        assert_eq!(SqlValue::from(7_i32), SqlValue::Int(Some(7)));
    }

    #[test]
    fn test_text_representation() {
        assert_eq!(SqlValue::from(true).to_text().as_deref(), Some("true"));
        assert_eq!(SqlValue::from(42_i64).to_text().as_deref(), Some("42"));
        assert_eq!(SqlValue::Text(None).to_text(), None);
    }

    #[test]
    fn test_row_decode() {
        let row = Row::new()
            .with("id", 3)
            .with("name", "Ada")
            .with("note", Value::Null)
            .with("seen_at", "2024-05-01T10:00:00.123456+00:00");

        assert_eq!(row.get::<i64>("id").unwrap(), 3);
        assert_eq!(row.get::<Option<String>>("missing").unwrap(), None);

        let sample: Sample = row.decode().unwrap();
        assert_eq!(sample.name, "Ada");
        assert!(sample.note.is_none());
    }

    #[test]
    fn test_row_decode_error() {
        let row = Row::new().with("id", json!("not a number"));
        let err = row.get::<i64>("id").unwrap_err();
        assert!(matches!(err, DbError::Decode(_)));
    }

    #[test]
    fn test_statement_builder() {
        let stmt = Statement::new("SELECT $1, $2").bind(1_i64).bind("x");
        assert_eq!(stmt.params, vec![SqlValue::Int(Some(1)), SqlValue::Text(Some("x".into()))]);
    }
}
