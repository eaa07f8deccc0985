//! Query gateway: parameterized, read-only queries against the warehouse.

pub mod auth;
pub mod bigquery;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{AppError, Result};

pub use bigquery::BigQueryGateway;

/// A single typed cell returned by the warehouse.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::String(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// One result row; column names are shared across all rows of a result.
#[derive(Clone, Debug)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Row { columns, values }
    }

    /// Convenience constructor used by fixtures and tests.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(name, value)| (name.into(), value)).unzip();
        Row {
            columns: columns.into(),
            values,
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    fn require(&self, column: &str) -> Result<&Value> {
        self.get(column)
            .ok_or_else(|| AppError::QueryError(format!("result has no column `{}`", column)))
    }

    pub fn string(&self, column: &str) -> Result<String> {
        match self.require(column)? {
            Value::String(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }

    pub fn int(&self, column: &str) -> Result<i64> {
        let value = self.require(column)?;
        if value.is_null() {
            return Ok(0);
        }
        value
            .as_i64()
            .ok_or_else(|| AppError::QueryError(format!("column `{}` is not an integer: {:?}", column, value)))
    }

    pub fn float(&self, column: &str) -> Result<f64> {
        let value = self.require(column)?;
        if value.is_null() {
            return Ok(0.0);
        }
        value
            .as_f64()
            .ok_or_else(|| AppError::QueryError(format!("column `{}` is not numeric: {:?}", column, value)))
    }
}

/// A named, typed query parameter. Values are never spliced into SQL text.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    String(String),
    Int64(i64),
    StringArray(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryParam {
    pub name: String,
    pub value: ParamValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Short template name, used for logging.
    pub name: &'static str,
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl Query {
    pub fn new(name: &'static str, sql: impl Into<String>) -> Self {
        Query {
            name,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, name: &str, value: ParamValue) -> Self {
        self.params.push(QueryParam {
            name: name.to_string(),
            value,
        });
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

#[async_trait]
pub trait QueryGateway: Send + Sync {
    /// Executes a read-only query and returns every result row.
    async fn run(&self, query: &Query) -> Result<Vec<Row>>;
}
