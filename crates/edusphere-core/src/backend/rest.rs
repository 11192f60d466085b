//! [`RowSource`] over the provider's REST row interface.
//!
//! Speaks the PostgREST dialect: `select=`, `col=eq.v`, `col=gte.v`,
//! `order=col.asc|desc`, `limit=`. Counts are requested with
//! `Prefer: count=exact` and read from the `Content-Range` header.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use super::query::{Filter, RowQuery};
use super::{BackendError, Row, RowSource};
use crate::config::BackendConfig;

pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestBackend {
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let (Some(url), Some(key)) = (config.url.as_deref(), config.api_key.as_deref()) else {
            return Err(BackendError::NotConfigured {
                message: "set backend.url and backend.api_key (or EDUSPHERE_BACKEND_URL / \
                          EDUSPHERE_BACKEND_KEY)"
                    .to_string(),
            });
        };
        if !config.is_configured() {
            return Err(BackendError::NotConfigured {
                message: "backend.url and backend.api_key must not be empty".to_string(),
            });
        }
        Self::new(url, key, config.request_timeout())
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_headers(&self) -> Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| BackendError::NotConfigured {
                message: format!("api key is not a valid header value: {}", e),
            })?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| BackendError::NotConfigured {
                message: format!("api key is not a valid header value: {}", e),
            })?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    async fn send(&self, table: &str, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.headers(self.auth_headers()?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::HttpStatus {
                table: table.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

/// Query-string pairs for a row query.
pub fn query_params(query: &RowQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.columns.clone())];
    for filter in &query.filters {
        let value = match filter {
            Filter::Eq { value, .. } => format!("eq.{}", value),
            Filter::Gte { value, .. } => format!("gte.{}", value),
        };
        params.push((filter.column().to_string(), value));
    }
    if let Some(order) = &query.order {
        let dir = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

/// Total from a `Content-Range` header value such as `0-24/3573` or `*/0`.
pub fn parse_content_range(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.parse().ok()
}

/// Rows from a JSON body that must be an array of objects.
pub fn parse_rows(table: &str, body: Value) -> Result<Vec<Row>, BackendError> {
    let Value::Array(items) = body else {
        return Err(BackendError::malformed(table, "expected a JSON array"));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            other => Err(BackendError::malformed(
                table,
                format!("expected row object, got {}", other),
            )),
        })
        .collect()
}

#[async_trait]
impl RowSource for RestBackend {
    async fn count(&self, query: &RowQuery) -> Result<u64, BackendError> {
        let request = self
            .client
            .head(self.table_url(&query.table))
            .query(&query_params(query))
            .header("Prefer", "count=exact");
        let response = self.send(&query.table, request).await?;

        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| BackendError::malformed(&query.table, "missing Content-Range header"))?;
        let total = parse_content_range(range).ok_or_else(|| {
            BackendError::malformed(&query.table, format!("unparseable Content-Range '{}'", range))
        })?;

        debug!(event = "core.rest.count_completed", table = %query.table, total = total);
        Ok(total)
    }

    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, BackendError> {
        let request = self
            .client
            .get(self.table_url(&query.table))
            .query(&query_params(query));
        let response = self.send(&query.table, request).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::malformed(&query.table, e.to_string()))?;
        let rows = parse_rows(&query.table, body)?;

        debug!(event = "core.rest.select_completed", table = %query.table, rows = rows.len());
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: &[Value]) -> Result<(), BackendError> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(rows);
        self.send(table, request).await?;

        debug!(event = "core.rest.insert_completed", table = table, rows = rows.len());
        Ok(())
    }
}
