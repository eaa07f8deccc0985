use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::auth::TokenProvider;
use super::{ParamValue, Query, QueryGateway, Row, Value};
use crate::config::Config;
use crate::error::{AppError, Result};

const POLL_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    schema: Option<TableSchema>,
    rows: Option<Vec<TableRow>>,
    job_complete: Option<bool>,
    job_reference: Option<JobReference>,
    page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TableCell {
    #[serde(default)]
    pub v: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// BigQuery REST (`jobs.query` / `jobs.getQueryResults`) client.
pub struct BigQueryGateway {
    client: Client,
    tokens: TokenProvider,
    api_base: String,
    project: String,
    location: Option<String>,
    timeout: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl BigQueryGateway {
    pub fn new(config: &Config) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.query_timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let tokens = TokenProvider::new(config.credentials.clone(), client.clone())?;

        Ok(BigQueryGateway {
            client,
            tokens,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            project: config.project.clone(),
            location: config.location.clone(),
            timeout: config.query_timeout,
            max_attempts: config.query_max_attempts.max(1),
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Overrides the first retry delay; later retries double it.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn run_with_retry(&self, query: &Query) -> Result<Vec<Row>> {
        let mut attempt = 1;
        loop {
            match self.execute(query).await {
                Err(AppError::ConnectionError(msg)) if attempt < self.max_attempts => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        query = query.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "Transient warehouse error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn execute(&self, query: &Query) -> Result<Vec<Row>> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}/projects/{}/queries", self.api_base, self.project);
        let body = request_body(query, self.location.as_deref());

        let res = self.client.post(&url).bearer_auth(&token).json(&body).send().await?;
        let mut page: QueryResponse = self.read(res).await?;
        let job = page.job_reference.clone();

        let mut schema: Option<TableSchema> = None;
        let mut rows = Vec::new();

        loop {
            let complete = page.job_complete.unwrap_or(true);
            if complete {
                if let Some(s) = page.schema.take() {
                    schema = Some(s);
                }
                if let Some(page_rows) = page.rows.take() {
                    let fields = schema
                        .as_ref()
                        .ok_or_else(|| AppError::QueryError("result rows arrived without a schema".to_string()))?;
                    rows.extend(decode_rows(&fields.fields, page_rows)?);
                }
                if page.page_token.is_none() {
                    break;
                }
            }

            let job = job
                .as_ref()
                .ok_or_else(|| AppError::QueryError("incomplete query without a job reference".to_string()))?;
            tracing::debug!(query = query.name, job_id = %job.job_id, complete, "Fetching query results");

            let mut params: Vec<(&str, String)> = vec![("timeoutMs", POLL_TIMEOUT_MS.to_string())];
            if let Some(location) = job.location.as_ref().or(self.location.as_ref()) {
                params.push(("location", location.clone()));
            }
            if complete {
                if let Some(page_token) = page.page_token.take() {
                    params.push(("pageToken", page_token));
                }
            }

            let url = format!("{}/projects/{}/queries/{}", self.api_base, self.project, job.job_id);
            let res = self.client.get(&url).bearer_auth(&token).query(&params).send().await?;
            page = self.read(res).await?;
        }

        Ok(rows)
    }

    async fn read(&self, res: Response) -> Result<QueryResponse> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
            }
            return Err(classify(status, &body));
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl QueryGateway for BigQueryGateway {
    async fn run(&self, query: &Query) -> Result<Vec<Row>> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.run_with_retry(query)).await;

        match result {
            Ok(Ok(rows)) => {
                tracing::info!(
                    query = query.name,
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Query completed"
                );
                Ok(rows)
            }
            Ok(Err(err)) => {
                tracing::warn!(query = query.name, error = %err, "Query failed");
                Err(err)
            }
            Err(_) => {
                tracing::warn!(query = query.name, timeout_ms = self.timeout.as_millis() as u64, "Query timed out");
                Err(AppError::Timeout(self.timeout))
            }
        }
    }
}

/// Maps a non-success HTTP status to the error taxonomy.
pub(crate) fn classify(status: StatusCode, body: &str) -> AppError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    let message = format!("status {}: {}", status.as_u16(), message);

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        AppError::ConnectionError(message)
    } else {
        AppError::QueryError(message)
    }
}

pub(crate) fn request_body(query: &Query, location: Option<&str>) -> serde_json::Value {
    let params: Vec<serde_json::Value> = query
        .params
        .iter()
        .map(|p| match &p.value {
            ParamValue::String(s) => json!({
                "name": p.name,
                "parameterType": { "type": "STRING" },
                "parameterValue": { "value": s },
            }),
            ParamValue::Int64(i) => json!({
                "name": p.name,
                "parameterType": { "type": "INT64" },
                "parameterValue": { "value": i.to_string() },
            }),
            ParamValue::StringArray(values) => json!({
                "name": p.name,
                "parameterType": { "type": "ARRAY", "arrayType": { "type": "STRING" } },
                "parameterValue": {
                    "arrayValues": values.iter().map(|v| json!({ "value": v })).collect::<Vec<_>>(),
                },
            }),
        })
        .collect();

    let mut body = json!({
        "query": query.sql,
        "useLegacySql": false,
        "parameterMode": "NAMED",
        "queryParameters": params,
        "timeoutMs": POLL_TIMEOUT_MS,
        "formatOptions": { "useInt64Timestamp": true },
    });
    if let Some(location) = location {
        body["location"] = json!(location);
    }
    body
}

pub(crate) fn decode_rows(fields: &[FieldSchema], rows: Vec<TableRow>) -> Result<Vec<Row>> {
    let columns: Arc<[String]> = fields.iter().map(|f| f.name.clone()).collect();

    rows.into_iter()
        .map(|row| {
            if row.f.len() != fields.len() {
                return Err(AppError::QueryError(format!(
                    "row has {} cells but schema has {} fields",
                    row.f.len(),
                    fields.len()
                )));
            }
            let values = fields
                .iter()
                .zip(row.f)
                .map(|(field, cell)| decode_cell(field, &cell.v))
                .collect::<Result<Vec<_>>>()?;
            Ok(Row::new(columns.clone(), values))
        })
        .collect()
}

fn decode_cell(field: &FieldSchema, raw: &serde_json::Value) -> Result<Value> {
    if field.mode.as_deref() == Some("REPEATED") {
        let items = raw.as_array().map(|a| a.as_slice()).unwrap_or_default();
        let scalar = FieldSchema {
            name: field.name.clone(),
            field_type: field.field_type.clone(),
            mode: None,
        };
        let parts = items
            .iter()
            .map(|item| decode_cell(&scalar, &item["v"]).map(|v| v.to_string()))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::String(parts.join(", ")));
    }

    let text = match raw {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::String(s) => s.as_str(),
        other => return Ok(Value::String(other.to_string())),
    };

    let invalid = || AppError::QueryError(format!("cannot decode {} value {:?} in `{}`", field.field_type, text, field.name));

    let value = match field.field_type.as_str() {
        "INTEGER" | "INT64" => Value::Int(text.parse().map_err(|_| invalid())?),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => Value::Float(text.parse().map_err(|_| invalid())?),
        "BOOLEAN" | "BOOL" => Value::Bool(text.eq_ignore_ascii_case("true")),
        "TIMESTAMP" => {
            let ts = match text.parse::<i64>() {
                Ok(micros) => DateTime::from_timestamp_micros(micros),
                Err(_) => text.parse::<f64>().ok().and_then(|secs| {
                    DateTime::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
                }),
            };
            Value::Timestamp(ts.ok_or_else(invalid)?)
        }
        "DATE" => Value::Date(NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid())?),
        "DATETIME" => Value::DateTime(
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
                .map_err(|_| invalid())?,
        ),
        _ => Value::String(text.to_string()),
    };
    Ok(value)
}
