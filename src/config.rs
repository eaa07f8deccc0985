use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, Result};
use crate::warehouse::auth::ServiceAccount;

pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";
const DEFAULT_TABLE: &str = "project.dataset.table";

// Table references are spliced into SQL text, so only plain identifiers pass.
static TABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("Failed to compile table pattern"));

/// Fully-qualified tables the dashboard reads from.
#[derive(Clone, Debug, PartialEq)]
pub struct Tables {
    pub words: String,
    pub articles: String,
    pub tags: String,
}

impl Default for Tables {
    fn default() -> Self {
        Tables {
            words: DEFAULT_TABLE.to_string(),
            articles: DEFAULT_TABLE.to_string(),
            tags: DEFAULT_TABLE.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub credentials: ServiceAccount,
    pub project: String,
    pub location: Option<String>,
    pub api_base: String,
    pub tables: Tables,
    pub word_limit: i64,
    pub img_dir: PathBuf,
    pub query_timeout: Duration,
    pub query_max_attempts: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials_path = lookup("GOOGLE_APPLICATION_CREDENTIALS").ok_or_else(|| {
            AppError::ConfigError("GOOGLE_APPLICATION_CREDENTIALS must point to a service account file".to_string())
        })?;
        let credentials = ServiceAccount::from_file(&credentials_path)?;

        // Load server configuration with defaults
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("PORT").unwrap_or_else(|| "8080".to_string());
        let port = port.parse::<u16>().map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let project = lookup("BQ_PROJECT").unwrap_or_else(|| credentials.project_id.clone());
        if project.is_empty() {
            return Err(AppError::ConfigError("no BigQuery project configured".to_string()));
        }

        let tables = Tables {
            words: table(&lookup, "BQ_WORDS_TABLE")?,
            articles: table(&lookup, "BQ_ARTICLES_TABLE")?,
            tags: table(&lookup, "BQ_TAGS_TABLE")?,
        };

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            credentials,
            project,
            location: lookup("BQ_LOCATION").filter(|l| !l.is_empty()),
            api_base: lookup("BQ_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            tables,
            word_limit: number(&lookup, "WORD_LIMIT", 100)?,
            img_dir: PathBuf::from(lookup("IMG_DIR").unwrap_or_else(|| "img".to_string())),
            query_timeout: Duration::from_secs(number(&lookup, "QUERY_TIMEOUT_SECS", 30)?),
            query_max_attempts: number::<u32, _>(&lookup, "QUERY_MAX_ATTEMPTS", 3)?.max(1),
        })
    }
}

fn table<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let name = lookup(key).unwrap_or_else(|| DEFAULT_TABLE.to_string());
    if !TABLE_PATTERN.is_match(&name) {
        return Err(AppError::ConfigError(format!("{} is not a valid table reference: {:?}", key, name)));
    }
    Ok(name)
}

fn number<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
