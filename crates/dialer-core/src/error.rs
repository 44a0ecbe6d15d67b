//! Error types for dialer-core

use thiserror::Error;

/// Result type alias for dialer operations
pub type Result<T> = std::result::Result<T, DialerError>;

/// Main error type for the call reconciliation engine
///
/// None of these errors is allowed to stop a finalized call from reaching the
/// disposition UI. The engine logs them and carries on.
#[derive(Error, Debug)]
pub enum DialerError {
    /// Call-log read permission was refused by the user or the OS
    #[error("Call log permission denied: {0}")]
    PermissionDenied(String),

    /// The native dialer plugin is missing on this platform
    #[error("Dialer bridge unavailable: {0}")]
    BridgeUnavailable(String),

    /// Every launcher attempt failed for a number
    #[error("Dialer launch failed for {phone}: {reason}")]
    LaunchFailed { phone: String, reason: String },

    /// The persistence endpoint rejected or failed a write
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A native payload could not be turned into a call event
    #[error("Malformed native event: {0}")]
    MalformedEvent(String),

    /// Pending session storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A caller passed something the engine cannot act on
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Record not found at the persistence endpoint
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The engine task has stopped and no longer accepts commands
    #[error("Dialer engine is not running")]
    EngineClosed,
}

impl DialerError {
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedEvent(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<sqlx::Error> for DialerError {
    fn from(err: sqlx::Error) -> Self {
        DialerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DialerError {
    fn from(err: serde_json::Error) -> Self {
        DialerError::Storage(format!("JSON error: {}", err))
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for DialerError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        DialerError::EngineClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for DialerError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        DialerError::EngineClosed
    }
}
