use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE, RANGE};

use super::{Store, StoreError, UpsertResponse};
use crate::config::StoreCredentials;
use crate::row::{Row, TableSpec};

const REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// PostgREST-style table endpoint (`{url}/rest/v1/{table}`), as served by
/// Supabase. Each instance owns its own HTTP client so replacing the store
/// also drops any half-closed pooled connections.
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn connect(credentials: &StoreCredentials) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|err| StoreError::new(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: credentials.url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }
}

impl Store for RestStore {
    fn upsert(&mut self, table: &TableSpec, rows: &[Row]) -> Result<UpsertResponse, StoreError> {
        if rows.is_empty() {
            return Ok(UpsertResponse::default());
        }
        let resp = self
            .client
            .post(self.table_url(table.name))
            .query(&[("on_conflict", table.key.join(","))])
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .map_err(transport_error)?;
        let resp = ensure_success(resp)?;
        Ok(UpsertResponse {
            reported_rows: reported_rows(&resp),
        })
    }

    fn count(&mut self, table: &str, column: &str, value: i64) -> Result<u64, StoreError> {
        let resp = self
            .client
            .get(self.table_url(table))
            .query(&[("select", column.to_string()), (column, format!("eq.{value}"))])
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("Prefer", "count=exact")
            .header("Range-Unit", "items")
            .header(RANGE, "0-0")
            .send()
            .map_err(transport_error)?;
        let resp = ensure_success(resp)?;
        resp.headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                StoreError::new(format!("count on {table}: missing Content-Range total"))
            })
    }
}

fn ensure_success(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(StoreError::new(format!("http {status}: {body}")))
}

/// Prefixes transport failures with the kind of failure so the retry
/// classifier can recognise them.
fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::new(format!("request timed out: {err}"))
    } else if err.is_connect() || err.is_request() || err.is_body() {
        StoreError::new(format!("connection error: {err}"))
    } else {
        StoreError::new(err.to_string())
    }
}

fn reported_rows(resp: &Response) -> Option<usize> {
    resp.headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
        .and_then(|n| usize::try_from(n).ok())
}

/// `0-0/123` and `*/123` -> 123. An unknown total (`0-0/*`) is `None`.
fn parse_content_range_total(raw: &str) -> Option<u64> {
    raw.rsplit('/').next()?.trim().parse::<u64>().ok()
}
