//! REST client for the hosted backend's PostgREST endpoints.

use std::sync::Arc;
use std::time::Duration;

use medidash_core::realtime::{fetch_fn, FetchError, FetchFn};
use medidash_core::rpc::RemoteProcedure;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BackendConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from REST calls outside the sync bridge.
#[derive(Debug)]
pub enum RestError {
    /// Backend url or key missing from config
    NotConfigured,
    /// The request failed or the backend rejected it
    Request(FetchError),
    /// The response body did not have the expected shape
    Decode(String),
    /// No row with the given id
    NotFound { table: String, id: Uuid },
}

impl std::fmt::Display for RestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestError::NotConfigured => write!(
                f,
                "Backend not configured. Set backend.url and backend.api_key in config \
                 or MEDIDASH_BACKEND_URL / MEDIDASH_API_KEY."
            ),
            RestError::Request(e) => write!(f, "Request failed: {}", e),
            RestError::Decode(e) => write!(f, "Unexpected response: {}", e),
            RestError::NotFound { table, id } => write!(f, "No row {} in {}", id, table),
        }
    }
}

impl std::error::Error for RestError {}

impl From<FetchError> for RestError {
    fn from(e: FetchError) -> Self {
        RestError::Request(e)
    }
}

/// PostgREST error body.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Turns a non-success status and its body into a [`FetchError`].
fn classify(status: u16, body: &str) -> FetchError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    FetchError::from_response(status, parsed.code.as_deref(), message)
}

fn transport(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RestClient {
    server_url: String,
    api_key: String,
    schema: String,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(server_url: String, api_key: String, schema: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            server_url,
            api_key,
            schema,
            http,
        }
    }

    pub fn from_config(backend: &BackendConfig) -> Result<Self, RestError> {
        match (&backend.url, &backend.api_key) {
            (Some(url), Some(key)) => Ok(Self::new(url.clone(), key.clone(), backend.schema.clone())),
            _ => Err(RestError::NotConfigured),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Builds an HTTP URL for a given path.
    pub fn build_http_url(&self, path: &str) -> String {
        // Convert ws(s) to http(s) if needed
        let base_url = if self.server_url.starts_with("ws://") {
            self.server_url.replace("ws://", "http://")
        } else if self.server_url.starts_with("wss://") {
            self.server_url.replace("wss://", "https://")
        } else if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }

    /// Builds the realtime websocket URL.
    pub fn build_ws_url(&self) -> String {
        // Convert http(s) to ws(s) if needed
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replace("http://", "ws://")
        } else if self.server_url.starts_with("https://") {
            self.server_url.replace("https://", "wss://")
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            base_url.trim_end_matches('/'),
            urlencoding::encode(&self.api_key)
        )
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        self.build_http_url(&format!(
            "/rest/v1/{}{}",
            urlencoding::encode(table),
            query
        ))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let profile = if method == Method::GET {
            "Accept-Profile"
        } else {
            "Content-Profile"
        };
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header(profile, &self.schema)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, FetchError> {
        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status.as_u16(), &body))
    }

    /// Fetches every row of `table`.
    pub async fn fetch_rows<R: DeserializeOwned>(&self, table: &str) -> Result<Vec<R>, FetchError> {
        let url = self.table_url(table, "?select=*");
        tracing::debug!("GET {}", url);
        let response = self.send(self.request(Method::GET, &url)).await?;
        response
            .json::<Vec<R>>()
            .await
            .map_err(|e| FetchError::Decode(format!("{}: {}", table, e)))
    }

    pub async fn fetch_one<R: DeserializeOwned>(&self, table: &str, id: Uuid) -> Result<R, RestError> {
        let url = self.table_url(table, &format!("?select=*&id=eq.{}", id));
        let response = self.send(self.request(Method::GET, &url)).await?;
        let mut rows: Vec<R> = response
            .json()
            .await
            .map_err(|e| RestError::Decode(e.to_string()))?;
        if rows.is_empty() {
            return Err(RestError::NotFound {
                table: table.to_string(),
                id,
            });
        }
        Ok(rows.swap_remove(0))
    }

    pub async fn insert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> Result<(), RestError> {
        let url = self.table_url(table, "");
        tracing::debug!("POST {}", url);
        self.send(
            self.request(Method::POST, &url)
                .header("Prefer", "return=minimal")
                .json(row),
        )
        .await?;
        Ok(())
    }

    /// Sets the `status` column of one row.
    pub async fn update_status(&self, table: &str, id: Uuid, status: &str) -> Result<(), RestError> {
        let url = self.table_url(table, &format!("?id=eq.{}", id));
        tracing::debug!("PATCH {} status={}", url, status);
        self.send(
            self.request(Method::PATCH, &url)
                .header("Prefer", "return=minimal")
                .json(&serde_json::json!({ "status": status })),
        )
        .await?;
        Ok(())
    }

    /// Calls a server-side function and decodes its result.
    pub async fn call<P: RemoteProcedure>(&self, procedure: &P) -> Result<P::Output, RestError> {
        let url = self.build_http_url(&format!("/rest/v1/rpc/{}", P::NAME));
        tracing::debug!("RPC {}", P::NAME);
        let response = self
            .send(self.request(Method::POST, &url).json(procedure))
            .await?;
        let body = response.text().await.map_err(|e| RestError::Decode(e.to_string()))?;
        decode_rpc::<P::Output>(&body)
    }

    /// A bridge fetch function reading all rows of `table`.
    pub fn fetcher<R>(self: &Arc<Self>, table: &str) -> FetchFn<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let client = Arc::clone(self);
        let table = table.to_string();
        fetch_fn(move || {
            let client = Arc::clone(&client);
            let table = table.clone();
            async move { client.fetch_rows::<R>(&table).await }
        })
    }
}

/// Void functions answer with an empty body, which decodes as `null`.
fn decode_rpc<T: DeserializeOwned>(body: &str) -> Result<T, RestError> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| RestError::Decode(e.to_string()))
}
