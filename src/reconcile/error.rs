//! Reconciliation Error Types

use thiserror::Error;

/// Errors reported by a ledger gateway call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Remote id no longer resolves
    #[error("Remote entity not found: {0}")]
    NotFound(String),

    /// Processor refused the payload as malformed (HTTP 400 / 422)
    #[error("Payload rejected with status {status}: {message}")]
    RejectedPayload { status: u16, message: String },

    /// Network failure, auth/rate-limit/conflict status, 5xx, or undecodable response
    #[error("Transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Get the error code for log output
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::RejectedPayload { .. } => "REJECTED_PAYLOAD",
            GatewayError::Transport(_) => "TRANSPORT_ERROR",
        }
    }

    /// Rejections are permanent for the payload that caused them
    #[inline]
    pub fn is_rejection(&self) -> bool {
        matches!(self, GatewayError::RejectedPayload { .. })
    }

    /// Classify a non-success HTTP status
    ///
    /// Only payload validation failures are permanent. Auth, conflict and
    /// rate-limit responses are retried on the next pass.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => GatewayError::NotFound(message),
            400 | 422 => GatewayError::RejectedPayload { status, message },
            _ => GatewayError::Transport(format!("HTTP {}: {}", status, message)),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => GatewayError::from_status(status.as_u16(), e.to_string()),
            None => GatewayError::Transport(e.to_string()),
        }
    }
}

/// Errors loading pending transfers
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid record at line {line}: {reason}")]
    InvalidRecord { line: u64, reason: String },
}

/// Errors surfaced by a reconciliation run or its setup
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transfer source error: {0}")]
    Source(#[from] SourceError),
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::InvalidConfig(_) => "INVALID_CONFIG",
            ReconcileError::Config(_) => "CONFIG_ERROR",
            ReconcileError::Io(_) => "IO_ERROR",
            ReconcileError::Source(_) => "SOURCE_ERROR",
        }
    }
}
