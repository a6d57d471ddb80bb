/// api.rs – Async client for the bot backend REST API.
///
/// Thin request/response wrapper around the collaborator contract:
///  - GET  /api/status     → BotStatus snapshot
///  - GET  /api/trades     → full trade history (treated as unordered)
///  - POST /api/bot/start  → start the bot
///  - POST /api/bot/stop   → stop the bot
///
/// Every call attaches the current credential as a Bearer header when one is
/// present. Responses are mapped onto the `ApiError` taxonomy; the body is
/// decoded separately from the status check so malformed JSON surfaces as
/// `Decode`, not `Transport`.
use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::credentials::CredentialProvider;
use crate::error::ApiError;
use crate::models::{BotStatus, Trade};

pub struct BotApiClient {
    base_url: String,
    http: Client,
    creds: Arc<CredentialProvider>,
}

impl BotApiClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        creds: Arc<CredentialProvider>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            creds,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ------------------------------------------------------------------
    // Status / trade history
    // ------------------------------------------------------------------

    pub async fn fetch_status(&self) -> Result<BotStatus, ApiError> {
        self.get_json("/api/status").await
    }

    /// Full trade history. Order is not trusted; the timeline reducer sorts.
    pub async fn fetch_trade_history(&self) -> Result<Vec<Trade>, ApiError> {
        self.get_json("/api/trades").await
    }

    // ------------------------------------------------------------------
    // Bot control
    // ------------------------------------------------------------------

    pub async fn start_bot(&self) -> Result<(), ApiError> {
        info!("Requesting bot start");
        self.post_ok("/api/bot/start").await
    }

    pub async fn stop_bot(&self) -> Result<(), ApiError> {
        info!("Requesting bot stop");
        self.post_ok("/api/bot/stop").await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {url}");
        let mut req = self.http.get(&url);
        if let Some(token) = self.creds.current() {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status));
        }
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_ok(&self, path: &str) -> Result<(), ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {url}");
        let mut req = self.http.post(&url);
        if let Some(token) = self.creds.current() {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status));
        }
        Ok(())
    }
}
