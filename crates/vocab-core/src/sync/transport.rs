//! Transport used by the sync client to reach the sync service

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use super::error::{SyncError, SyncResult};
use super::protocol::{SyncRequest, SyncResponse, SYNC_PATH};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// One request/response exchange with the sync service.
pub trait SyncTransport: Send + Sync {
    fn exchange(
        &self,
        request: &SyncRequest,
    ) -> impl Future<Output = SyncResult<SyncResponse>> + Send;
}

/// HTTP transport posting JSON with a bearer token.
#[derive(Clone)]
pub struct HttpSyncTransport {
    url: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSyncTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncTransport")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpSyncTransport {
    /// Build a transport for `endpoint` (scheme and host, optional base path).
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        request_timeout: Duration,
    ) -> SyncResult<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        let token = normalize_text_option(Some(token.into())).ok_or_else(|| {
            SyncError::InvalidConfiguration("sync token must not be empty".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| SyncError::InvalidConfiguration(error.to_string()))?;

        Ok(Self {
            url: format!("{endpoint}{SYNC_PATH}"),
            token,
            client,
        })
    }

    /// Full URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SyncTransport for HttpSyncTransport {
    async fn exchange(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED => SyncError::Unauthorized,
                StatusCode::BAD_REQUEST => SyncError::Rejected(parse_api_error(status, &body)),
                _ => SyncError::Server(parse_api_error(status, &body)),
            });
        }

        let body = response.bytes().await.map_err(map_request_error)?;
        serde_json::from_slice::<SyncResponse>(&body)
            .map_err(|error| SyncError::MalformedResponse(error.to_string()))
    }
}

fn map_request_error(error: reqwest::Error) -> SyncError {
    if error.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Network(error.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let compact = compact_text(body);
    if compact.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> SyncResult<String> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        SyncError::InvalidConfiguration("server url must not be empty".to_string())
    })?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(SyncError::InvalidConfiguration(
            "server url must include http:// or https://".to_string(),
        ))
    }
}
