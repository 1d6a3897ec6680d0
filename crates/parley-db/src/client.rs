//! PostgREST client.
//!
//! Rows are exchanged as JSON. Every call goes through `execute`, which adds
//! authentication, a tracing span, retry and request metrics.

use std::time::{Duration, Instant};

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info_span, Instrument};

use crate::error::{DbError, DbResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};

/// `Prefer` header for upserts.
pub const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=representation";

/// Database client configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgREST base URL, e.g. `https://db.example.com/rest/v1`
    pub base_url: String,
    /// Service key sent as `apikey` and bearer token
    pub service_key: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl DbConfig {
    /// Create config from environment variables.
    pub fn from_env() -> DbResult<Self> {
        let base_url = std::env::var("DATABASE_REST_URL")
            .map_err(|_| DbError::config_error("DATABASE_REST_URL must be set"))?;
        if base_url.trim().is_empty() {
            return Err(DbError::config_error("DATABASE_REST_URL cannot be empty"));
        }

        let service_key = std::env::var("DATABASE_SERVICE_KEY")
            .map_err(|_| DbError::config_error("DATABASE_SERVICE_KEY must be set"))?;

        let connect_timeout_secs: u64 = std::env::var("DB_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }
}

/// PostgREST client.
#[derive(Clone)]
pub struct DbClient {
    http: Client,
    config: DbConfig,
}

impl DbClient {
    /// Create a new client.
    pub fn new(config: DbConfig) -> DbResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("parley-db/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DbError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> DbResult<Self> {
        Self::new(DbConfig::from_env()?)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.config.base_url, table)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    // =========================================================================
    // Row operations
    // =========================================================================

    /// Fetch the first row where `column = value`.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> DbResult<Option<T>> {
        let url = self.table_url(table);
        let filter = format!("eq.{}", value);

        let body = self
            .execute("select_one", table, || {
                self.request(Method::GET, &url)
                    .query(&[("select", "*"), (column, filter.as_str()), ("limit", "1")])
            })
            .await?;

        let mut rows: Vec<T> = parse_rows(&body)?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    /// Insert a row and return the stored representation.
    pub async fn insert<T: Serialize, R: DeserializeOwned>(&self, table: &str, row: &T) -> DbResult<R> {
        let url = self.table_url(table);

        let body = self
            .execute("insert", table, || {
                self.request(Method::POST, &url)
                    .header("Prefer", "return=representation")
                    .json(row)
            })
            .await?;

        first_row(parse_rows(&body)?, table)
    }

    /// Patch every row where `column = value`.
    pub async fn update<P: Serialize>(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: &P,
    ) -> DbResult<()> {
        let url = self.table_url(table);
        let filter = format!("eq.{}", value);

        self.execute("update", table, || {
            self.request(Method::PATCH, &url)
                .query(&[(column, filter.as_str())])
                .header("Prefer", "return=minimal")
                .json(patch)
        })
        .await?;

        Ok(())
    }

    /// Insert or merge on the unique `on_conflict` column.
    ///
    /// Concurrent writers for the same key resolve to a single row holding
    /// the last write.
    pub async fn upsert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        on_conflict: &str,
        row: &T,
    ) -> DbResult<R> {
        let url = self.table_url(table);

        let body = self
            .execute("upsert", table, || {
                self.request(Method::POST, &url)
                    .query(&[("on_conflict", on_conflict)])
                    .header("Prefer", PREFER_UPSERT)
                    .json(row)
            })
            .await?;

        first_row(parse_rows(&body)?, table)
    }

    /// Lightweight connectivity probe.
    pub async fn ping(&self, table: &str) -> DbResult<()> {
        let url = self.table_url(table);
        self.execute("ping", table, || {
            self.request(Method::GET, &url).query(&[("select", "*"), ("limit", "0")])
        })
        .await?;
        Ok(())
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Send with retry, tracing and metrics; returns the response body.
    async fn execute<F>(&self, operation: &str, table: &str, build: F) -> DbResult<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let span = info_span!("db_request", operation = %operation, table = %table);
        let build = &build;

        let start = Instant::now();
        let result = with_retry(&self.config.retry, operation, || async move {
            let response = build().send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.text().await?);
            }

            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            Err(DbError::from_response(
                status.as_u16(),
                retry_after,
                format!("{} on {} failed: {}", operation, table, body),
            ))
        })
        .instrument(span)
        .await;

        let latency_ms = start.elapsed().as_millis() as f64;
        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, table, status, latency_ms);
        debug!(operation, table, status, "db request finished");

        result
    }
}

fn parse_rows<T: DeserializeOwned>(body: &str) -> DbResult<Vec<T>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(body).map_err(|e| {
        DbError::InvalidResponse(format!(
            "{} (body prefix: {})",
            e,
            body.chars().take(200).collect::<String>()
        ))
    })
}

fn first_row<R>(rows: Vec<R>, table: &str) -> DbResult<R> {
    rows.into_iter()
        .next()
        .ok_or_else(|| DbError::InvalidResponse(format!("{} returned no representation", table)))
}

// =============================================================================
// Tests
// =============================================================================
