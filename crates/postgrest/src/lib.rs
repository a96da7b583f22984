//! PostgREST row store client for schoolhub
//!
//! This crate provides the row-level data access schoolhub needs from a
//! Supabase project.
//!
//! # Features
//!
//! - Query API (`select`, `insert`, `upsert`, `update`)
//! - Filtering (`eq`, `neq`, `in_list`, `ilike`)
//! - Ordering and limits
//! - Exact row counts read from `Content-Range`
//! - Single-object reads

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use url::Url;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Error details sent by PostgREST
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Errors returned by the row store client
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl PostgrestError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PostgrestError::ApiError { status, .. }
            | PostgrestError::UnparsedApiError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Rows plus the total count
#[derive(Debug, Clone, PartialEq)]
pub struct CountedRows<T> {
    pub rows: Vec<T>,
    /// Total matching rows reported by the server, when it sent one.
    pub count: Option<u64>,
}

/// Reads the total out of `Content-Range: 0-24/3573`
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

/// Turns a failed response into an error
async fn error_from_response(response: Response) -> PostgrestError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
        Ok(details) => PostgrestError::ApiError { details, status },
        Err(_) => PostgrestError::UnparsedApiError {
            message: error_text,
            status,
        },
    }
}

/// Reads the body of a write response (`Null` when empty)
async fn read_write_body(response: Response) -> Result<Value, PostgrestError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    let body_text = response.text().await.map_err(|e| {
        PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
    })?;

    // 204 No Content and friends
    if body_text.trim().is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_str::<Value>(&body_text)
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }
}

/// PostgREST client for one table
#[derive(Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: HashMap<String, String>,
    prefer: Vec<String>,
}

impl PostgrestClient {
    /// Create a new client
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: HashMap::new(),
            prefer: Vec::new(),
        }
    }

    /// Name of the table this client targets.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Add a header
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;

        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Act as the user holding `token`
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    /// Columns to select
    pub fn select(mut self, columns: &str) -> Self {
        self.query_params
            .insert("select".to_string(), columns.to_string());
        self
    }

    /// `column = value`
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.query_params
            .insert(column.to_string(), format!("eq.{}", value));
        self
    }

    /// `column <> value`
    pub fn neq(mut self, column: &str, value: &str) -> Self {
        self.query_params
            .insert(column.to_string(), format!("neq.{}", value));
        self
    }

    /// Case-insensitive pattern match
    pub fn ilike(mut self, column: &str, pattern: &str) -> Self {
        self.query_params
            .insert(column.to_string(), format!("ilike.{}", pattern));
        self
    }

    /// `column` is one of `values`
    pub fn in_list(mut self, column: &str, values: &[&str]) -> Self {
        let value_list = values.join(",");
        self.query_params
            .insert(column.to_string(), format!("in.({})", value_list));
        self
    }

    /// Order by `column`
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        let order_str = match order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        self.query_params
            .insert("order".to_string(), format!("{}.{}", column, order_str));
        self
    }

    /// Limit the number of rows
    pub fn limit(mut self, count: u32) -> Self {
        self.query_params
            .insert("limit".to_string(), count.to_string());
        self
    }

    /// Ask for an exact total (`Prefer: count=exact`)
    pub fn count_exact(mut self) -> Self {
        self.push_prefer("count=exact");
        self
    }

    fn push_prefer(&mut self, directive: &str) {
        if !self.prefer.iter().any(|p| p == directive) {
            self.prefer.push(directive.to_string());
        }
    }

    fn headers_with_prefer(&self, extra: &[&str]) -> HeaderMap {
        let mut headers = self.headers.clone();
        let mut directives: Vec<&str> = self.prefer.iter().map(String::as_str).collect();
        for directive in extra {
            if !directives.contains(directive) {
                directives.push(directive);
            }
        }
        if !directives.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&directives.join(",")) {
                headers.insert(HeaderName::from_static("prefer"), value);
            }
        }
        headers
    }

    fn build_url(&self) -> Result<String, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;

        for (key, value) in &self.query_params {
            url.query_pairs_mut().append_pair(key, value);
        }

        Ok(url.to_string())
    }

    async fn send_get(&self, headers: HeaderMap) -> Result<Response, PostgrestError> {
        let url = self.build_url()?;
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(PostgrestError::NetworkError)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response)
    }

    /// Fetch rows
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let response = self.send_get(self.headers_with_prefer(&[])).await?;

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Fetch rows and the total count
    pub async fn execute_with_count<T: DeserializeOwned>(
        &self,
    ) -> Result<CountedRows<T>, PostgrestError> {
        let response = self
            .send_get(self.headers_with_prefer(&["count=exact"]))
            .await?;

        let count = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range);

        let rows = response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))?;

        Ok(CountedRows { rows, count })
    }

    /// Fetch exactly one row; zero or several rows is an error
    pub async fn single<T: DeserializeOwned>(&self) -> Result<T, PostgrestError> {
        let mut headers = self.headers_with_prefer(&[]);
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(SINGLE_OBJECT),
        );

        let response = self.send_get(headers).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Insert rows
    pub async fn insert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let url = self.build_url()?;
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .headers(self.headers_with_prefer(&["return=representation"]))
            .json(&values)
            .send()
            .await
            .map_err(PostgrestError::NetworkError)?;

        read_write_body(response).await
    }

    /// Insert, merging into rows whose primary key already exists
    pub async fn upsert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let url = self.build_url()?;
        debug!("POST (upsert) {}", url);

        let response = self
            .http_client
            .post(&url)
            .headers(self.headers_with_prefer(&[
                "resolution=merge-duplicates",
                "return=representation",
            ]))
            .json(&values)
            .send()
            .await
            .map_err(PostgrestError::NetworkError)?;

        read_write_body(response).await
    }

    /// Update the filtered rows
    pub async fn update<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        if self.query_params.keys().all(|key| key == "select") {
            return Err(PostgrestError::InvalidParameters(
                "update requires at least one filter".to_string(),
            ));
        }

        let url = self.build_url()?;
        debug!("PATCH {}", url);

        let response = self
            .http_client
            .patch(&url)
            .headers(self.headers_with_prefer(&["return=representation"]))
            .json(&values)
            .send()
            .await
            .map_err(PostgrestError::NetworkError)?;

        read_write_body(response).await
    }
}
