//! Error types for the onboarding coordinator.

use std::time::Duration;

/// Top-level error type for the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Sequencer error: {0}")]
    Sequencer(#[from] SequencerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid URL for {key}: {url}")]
    InvalidUrl { key: String, url: String },
}

/// Client-side form validation failures.
///
/// Surfaced inline to the user; never sent to the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No {kind} file selected")]
    MissingFile { kind: String },

    #[error("{kind} file too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { kind: String, size: u64, limit: u64 },

    #[error("Unsupported {kind} file type: {content_type}")]
    UnsupportedFileType { kind: String, content_type: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Remote onboarding service errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Server rejected {endpoint}: status {status}: {body}")]
    ServerRejected {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Server reported success for step {step} without a next_step")]
    AmbiguousResponse { step: u8 },

    #[error("A submission for step {step} is already in flight")]
    SubmissionInFlight { step: u8 },
}

/// Extraction push-channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to connect to {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("Extraction channel disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("Invalid push message: {0}")]
    InvalidMessage(String),

    #[error("Extraction did not confirm completion within {deadline:?}")]
    CompletionTimeout { deadline: Duration },

    #[error("Extraction channel closed before completion")]
    Closed,
}

/// Auth-state errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Auth context did not become ready within {waited:?}")]
    TimedOut { waited: Duration },

    #[error("Auth watcher dropped before resolving")]
    WatcherDropped,
}

/// Step-sequencing violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequencerError {
    #[error("Step {step} is not accessible from the current progress")]
    StepNotAccessible { step: u8 },

    #[error("Invalid step number: {0}")]
    InvalidStep(u8),

    #[error("Onboarding is already complete")]
    AlreadyComplete,
}

/// Result type alias for the coordinator.
pub type Result<T> = std::result::Result<T, Error>;
