//! Outbound HTTP sinks.
//!
//! Two external collaborators receive payloads from the session tier: the game-over sink and the order processor.
//! Payloads pass through unchanged; responses are JSON. Every call is bounded by the configured timeout, and a
//! timeout surfaces as a transport error the caller can report back over the socket.
use std::time::Duration;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct SinkConfig {
    pub game_over_url: String,
    pub process_order_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Could not build the HTTP client for the outbound sinks. {0}")]
    Initialization(String),
    #[error("Sink transport error: {0}")]
    Transport(String),
    #[error("The sink rejected the payload with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("The sink response was not valid JSON. {0}")]
    InvalidResponse(String),
}

pub struct SinkApi {
    client: Client,
    config: SinkConfig,
}

impl SinkApi {
    pub fn new(config: SinkConfig) -> Result<Self, SinkError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SinkError::Initialization(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Forwards a game-over payload verbatim.
    pub async fn post_game_over(&self, payload: &Value) -> Result<Value, SinkError> {
        self.post_json(&self.config.game_over_url, payload).await
    }

    /// Forwards an order payload verbatim and returns the processor's response for relaying to the player.
    pub async fn process_order(&self, order: &Value) -> Result<Value, SinkError> {
        self.post_json(&self.config.process_order_url, order).await
    }

    async fn post_json(&self, url: &str, payload: &Value) -> Result<Value, SinkError> {
        trace!("📨 POST {url}");
        let response =
            self.client.post(url).json(payload).send().await.map_err(|e| SinkError::Transport(e.to_string()))?;
        if response.status().is_success() {
            response.json::<Value>().await.map_err(|e| SinkError::InvalidResponse(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| SinkError::Transport(e.to_string()))?;
            Err(SinkError::Rejected { status, message })
        }
    }
}
