// SPDX-License-Identifier: MIT

//! Typed error handling for market-agents
//!
//! Upstream failures (search, generation, credentials) surface as
//! [`MarketError`] and abort a run. Chart sandbox failures are reported as
//! [`SandboxError`] but are always absorbed by the chart stage.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, MarketError>;

/// Top-level error type for market-agents
#[derive(Debug, Error)]
pub enum MarketError {
    /// API errors from external services (OpenAI, Gemini, search providers)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model/LLM errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Workflow-specific errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Chart sandbox errors
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Workflow-specific errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No node registered for a stage the graph routed to
    #[error("No node registered for stage: {0}")]
    MissingStage(String),

    /// Unknown stage name
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// Safety limit on stage executions exceeded
    #[error("Exceeded {limit} stage executions without reaching the writer")]
    MaxSteps { limit: u32 },

    /// Topic was empty
    #[error("Topic must not be empty")]
    EmptyTopic,
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider name not recognised
    #[error("Unknown model provider: {0}")]
    UnknownProvider(String),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),
}

/// Chart sandbox errors
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Script rejected by the static policy check
    #[error("Script rejected: {0}")]
    PolicyViolation(String),

    /// Script ran past its time limit
    #[error("Script timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// Interpreter could not be started
    #[error("Failed to start interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    /// Script exited unsuccessfully
    #[error("Script exited with status {status}: {stderr}")]
    ScriptFailed { status: String, stderr: String },
}

impl MarketError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for MarketError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for MarketError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
