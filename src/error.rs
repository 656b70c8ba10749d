use std::time::Duration;

use thiserror::Error;

/// Failures raised by the browser session and its driver.
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    #[error("no active tab")]
    NoActiveTab,
    #[error("invalid tab index {index}: {count} tab(s) open")]
    TabOutOfRange { index: usize, count: usize },
    #[error("tab {0} is no longer open")]
    TabNotFound(String),
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("browser driver error: {0}")]
    Driver(String),
    #[error("browser call timed out after {0:?}")]
    Timeout(Duration),
    #[error("screenshot processing failed: {0}")]
    Image(String),
}

impl BrowserError {
    /// Conditions the model can recover from by choosing a different action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NoActiveTab | Self::TabOutOfRange { .. } | Self::TabNotFound(_)
        )
    }
}

impl From<anyhow::Error> for BrowserError {
    fn from(err: anyhow::Error) -> Self {
        Self::Driver(format!("{err:#}"))
    }
}

/// Failures talking to an LLM backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider configuration: {0}")]
    Config(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Authentication(body),
            429 => Self::RateLimited(body),
            400 | 404 | 413 | 422 => Self::InvalidRequest(body),
            _ => Self::Server { status, body },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Network(_) => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Task-level failure surfaced to whoever asked for the task.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("task exceeded the limit of {0} model turns")]
    TurnLimit(usize),
    #[error("task cancelled")]
    Cancelled,
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;
