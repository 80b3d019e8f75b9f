use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

/// Outbound JSON POST, before any protocol interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP seam under the gateway protocols.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(&self, request: TransportRequest) -> Result<TransportResponse>;
}

pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut builder = self
            .http
            .post(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .json(&request.body);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = request.bearer.as_deref() {
            builder = builder.bearer_auth(token);
        }
        // reqwest errors render their URL, and the direct protocol carries the key in it.
        let response = builder
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("gateway request failed ({})", redact_url(&request.url)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("gateway response body read failed")?;
        Ok(TransportResponse { status, body })
    }
}

fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => base.to_string(),
        None => url.to_string(),
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
