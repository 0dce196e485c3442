use std::time::Duration;

use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION, CONTENT_RANGE},
    Method, Response,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use shared_config::AppConfig;
use shared_models::error::StoreError;

/// Upsert on primary key instead of failing on duplicates.
pub const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=minimal";
/// Plain insert, no representation returned.
pub const PREFER_INSERT: &str = "return=minimal";

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
    timeout: Duration,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        let timeout = config.store_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_role_key.clone(),
            timeout,
        }
    }

    /// Token used by backend stores, which act with the service role.
    pub fn service_token(&self) -> Option<&str> {
        if self.service_key.is_empty() {
            None
        } else {
            Some(&self.service_key)
        }
    }

    fn get_headers(&self, auth_token: Option<&str>, prefer: Option<&str>) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", header_value(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        }

        if let Some(prefer) = prefer {
            headers.insert("Prefer", header_value(prefer)?);
        }

        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        prefer: Option<&str>,
    ) -> Result<Response, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let headers = self.get_headers(auth_token, prefer)?;

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await.map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => StoreError::Auth(error_text),
                code => StoreError::Backend { status: code, message: error_text },
            });
        }

        Ok(response)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, StoreError>
    where T: DeserializeOwned {
        let response = self.send(method, path, auth_token, body, None).await?;
        let bytes = response.bytes().await.map_err(|e| self.map_transport_error(e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send a write whose response body is not needed.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        prefer: &str,
    ) -> Result<(), StoreError> {
        self.send(method, path, auth_token, body, Some(prefer)).await?;
        Ok(())
    }

    /// Exact row count for a filtered table path, read from `Content-Range`.
    pub async fn count(&self, path: &str, auth_token: Option<&str>) -> Result<u64, StoreError> {
        let response = self
            .send(Method::HEAD, path, auth_token, None, Some("count=exact"))
            .await?;

        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Backend {
                status: response.status().as_u16(),
                message: "missing Content-Range header on count request".to_string(),
            })?;

        parse_content_range_total(range).ok_or_else(|| StoreError::Backend {
            status: response.status().as_u16(),
            message: format!("unparseable Content-Range: {}", range),
        })
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }

    fn map_transport_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else if e.is_decode() {
            StoreError::Transport(format!("failed to decode response: {}", e))
        } else {
            StoreError::Transport(e.to_string())
        }
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, StoreError> {
    HeaderValue::from_str(raw)
        .map_err(|e| StoreError::Transport(format!("invalid header value: {}", e)))
}

/// `0-24/3573` or `*/0` -> total after the slash.
fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit('/').next()?.trim().parse().ok()
}
