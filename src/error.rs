// ABOUTME: Error types for the flowchart client
// ABOUTME: Remote API, diagram rendering and configuration failures with display-ready messages

use thiserror::Error;

/// Failure talking to the remote job service.
///
/// The `Display` output is what pollers hand to `on_error`, so every variant
/// renders as a message a user can read without further formatting.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Could not reach the analysis service: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Job not found: {job_id}")]
    NotFound { job_id: String },
    #[error("{detail}")]
    Server { status: u16, detail: String },
    #[error("Unexpected response from the analysis service: {0}")]
    Decode(String),
    #[error("{0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Whether retrying the same request later can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Server { status, .. } => *status >= 500,
            ApiError::NotFound { .. } | ApiError::Decode(_) | ApiError::InvalidRequest(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

/// Failure turning a diagram description into an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("Render failed: {0}")]
    Engine(String),
    #[error("Render engine unavailable: {0}")]
    EngineUnavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
