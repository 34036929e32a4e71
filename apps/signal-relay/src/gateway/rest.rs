//! Live venue adapter.
//!
//! Talks to the trading venue through its REST bridge. Credentials travel
//! in the request body of a single call and are never logged; the caller
//! (the execution gateway) owns timeout and retry policy.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{ExecutionRequest, TradeStatus, VenueClient, VenueError, VenueReply};
use crate::config::GatewaySettings;
use crate::model::SignalKind;
use crate::vault::TradeCredentials;

/// REST bridge venue client.
pub struct RestVenue {
    http: reqwest::Client,
    base_url: String,
}

/// Wire shape of venue replies.
#[derive(Debug, Deserialize)]
struct VenueResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<VenueData>,
}

#[derive(Debug, Deserialize)]
struct VenueData {
    #[serde(default)]
    ticket: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    is_open: Option<bool>,
}

impl RestVenue {
    /// Create a client for the configured bridge URL.
    ///
    /// # Errors
    ///
    /// Returns [`VenueError::Transport`] if the HTTP client cannot be built.
    pub fn new(settings: &GatewaySettings) -> Result<Self, VenueError> {
        let http = reqwest::Client::builder()
            .timeout(settings.call_timeout)
            .build()
            .map_err(|e| VenueError::Transport(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: settings.rest_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn classify(status: reqwest::StatusCode, body: &VenueResponse) -> Option<VenueError> {
        let detail = || {
            body.message
                .clone()
                .or_else(|| body.data.as_ref().and_then(|d| d.message.clone()))
                .unwrap_or_else(|| format!("http {}", status.as_u16()))
        };

        if status.is_server_error() {
            return Some(VenueError::Transport(detail()));
        }
        if status.is_client_error() || body.status != "success" {
            return Some(VenueError::Rejected(detail()));
        }
        None
    }

    async fn parse(response: reqwest::Response) -> Result<VenueResponse, VenueError> {
        let status = response.status();
        let body: VenueResponse = response
            .json()
            .await
            .map_err(|e| VenueError::Transport(format!("malformed venue reply: {e}")))?;

        match Self::classify(status, &body) {
            Some(err) => Err(err),
            None => Ok(body),
        }
    }

    fn transport(err: &reqwest::Error) -> VenueError {
        // reqwest hides the URL in Display; keep the summary only so
        // nothing credential-adjacent can leak into logs.
        if err.is_timeout() {
            VenueError::Transport("venue request timed out".to_string())
        } else if err.is_connect() {
            VenueError::Transport("venue connection failed".to_string())
        } else {
            VenueError::Transport("venue request failed".to_string())
        }
    }
}

#[async_trait]
impl VenueClient for RestVenue {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        credentials: &TradeCredentials,
    ) -> Result<VenueReply, VenueError> {
        let response = match request.kind {
            SignalKind::Close => {
                let ticket = request
                    .ticket
                    .ok_or_else(|| VenueError::Rejected("close without ticket".to_string()))?;
                self.http
                    .delete(format!("{}/trades/{ticket}", self.base_url))
                    .json(&json!({
                        "volume": request.volume,
                        "login": credentials.login,
                        "server": credentials.server,
                        "password": credentials.password,
                    }))
                    .send()
                    .await
            }
            SignalKind::Modify => {
                let ticket = request
                    .ticket
                    .ok_or_else(|| VenueError::Rejected("modify without ticket".to_string()))?;
                self.http
                    .put(format!("{}/trades/{ticket}", self.base_url))
                    .json(&json!({
                        "sl": request.stop,
                        "tp": request.target,
                        "login": credentials.login,
                        "server": credentials.server,
                        "password": credentials.password,
                    }))
                    .send()
                    .await
            }
            _ => {
                self.http
                    .post(format!("{}/trades", self.base_url))
                    .json(&json!({
                        "symbol": request.instrument,
                        "command": request.kind.as_str(),
                        "volume": request.volume,
                        "price": request.price,
                        "sl": request.stop,
                        "tp": request.target,
                        "comment": request.comment,
                        "login": credentials.login,
                        "server": credentials.server,
                        "password": credentials.password,
                    }))
                    .send()
                    .await
            }
        };

        let response = response.map_err(|e| Self::transport(&e))?;
        let body = Self::parse(response).await?;

        let data = body.data.unwrap_or(VenueData {
            ticket: None,
            message: None,
            is_open: None,
        });
        Ok(VenueReply {
            ticket: data.ticket,
            message: data
                .message
                .or(body.message)
                .unwrap_or_else(|| "ok".to_string()),
        })
    }

    async fn query_status(&self, ticket: i64) -> Result<TradeStatus, VenueError> {
        let response = self
            .http
            .get(format!("{}/trades/{ticket}", self.base_url))
            .send()
            .await
            .map_err(|e| Self::transport(&e))?;

        let body = Self::parse(response).await?;
        let data = body
            .data
            .ok_or_else(|| VenueError::Transport("venue reply missing data".to_string()))?;

        Ok(TradeStatus {
            ticket: data.ticket.unwrap_or(ticket),
            is_open: data.is_open.unwrap_or(false),
        })
    }

    async fn probe(&self) -> bool {
        let Ok(response) = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        else {
            return false;
        };

        if !response.status().is_success() {
            return false;
        }

        matches!(
            response.json::<VenueResponse>().await,
            Ok(body) if body.status == "success" || body.status == "ok"
        )
    }

    fn name(&self) -> &'static str {
        "rest-venue"
    }
}
