//! Minimal client for the interactive story relay.
//!
//! The relay forwards a chapter prompt to the model provider and streams the
//! result back as blank-line separated `data:` frames, each carrying a
//! `{type, value}` payload. This crate provides:
//! - Incremental UTF-8 decoding of the chunked body ([`Utf8Decoder`])
//! - Frame splitting ([`FrameBuffer`]) and event parsing ([`StreamEvent`])
//! - The HTTP client for generation and summarization ([`Relay`])

pub mod decoder;
pub mod event;
pub mod frame;
pub mod wire;

pub use decoder::Utf8Decoder;
pub use event::{decode_events, EventStream, StreamEvent};
pub use frame::FrameBuffer;
pub use wire::{
    CompactionMode, GenerateRequest, NarrativePerspective, NarrativePov, StorySettings,
    SummaryRequest, UserPreferences, DEFAULT_OUTPUT_LENGTH,
};

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use wire::SummaryResponse;

/// Placeholder host shipped in sample configuration. A base URL still
/// pointing at it means no relay has been set up.
const PLACEHOLDER_HOST: &str = "your-api.com";
const DEFAULT_BASE_URL: &str = "https://your-api.com/aibook";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when talking to the relay.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Relay error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("{0}")]
    Stream(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this failure is the timeout class rather than connectivity.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else if e.is_connect() {
            Error::Connect(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

/// Connection settings for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Upper bound for a whole request, body included.
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl RelayConfig {
    /// Create a config for the given relay base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Read `AIBOOK_API_BASE` and `AIBOOK_API_KEY` from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base) = std::env::var("AIBOOK_API_BASE") {
            config.base_url = base;
        }
        config.api_key = std::env::var("AIBOOK_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        config
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Whether a real relay has been configured.
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.base_url.contains(PLACEHOLDER_HOST)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Story relay client.
#[derive(Clone)]
pub struct Relay {
    client: reqwest::Client,
    config: RelayConfig,
}

impl Relay {
    /// Create a client with the given configuration.
    pub fn new(config: RelayConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create a client from `AIBOOK_API_BASE` / `AIBOOK_API_KEY`.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(RelayConfig::from_env())
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start generating a chapter and stream the relay's events.
    pub async fn stream(&self, request: &GenerateRequest) -> Result<EventStream, Error> {
        info!(chapter = request.next_chapter_index, "opening generation stream");

        let response = self
            .client
            .post(self.config.endpoint("generate/stream"))
            .headers(self.build_headers()?)
            .json(request)
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Status { status, message });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from_reqwest));
        Ok(decode_events(body))
    }

    /// Run one summarization round trip and return the summary line.
    pub async fn summarize(&self, request: &SummaryRequest) -> Result<String, Error> {
        debug!(?request, "summarize");

        let response = self
            .client
            .post(self.config.endpoint("summarize"))
            .headers(self.build_headers()?)
            .json(request)
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Status { status, message });
        }

        let body: SummaryResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;
        Ok(body.summary.trim().to_string())
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.config.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
            );
        }
        Ok(headers)
    }
}
