//! Capture channel trait
//!
//! Defines the interface shared by the long-lived capture sources (the
//! periodic screen capture and the OS click listener) and the error type
//! used across the crate.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while capturing or persisting activity
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Screen grab failed: {0}")]
    Grab(String),

    #[error("Pointer query failed: {0}")]
    Pointer(String),

    #[error("Monitor enumeration failed: {0}")]
    Monitor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Trait for capture channels
///
/// Each channel represents one independent source of activity signals.
/// `start` is idempotent; `stop` returns once the channel's execution
/// context has wound down (or its shutdown deadline has passed).
#[async_trait]
pub trait CaptureChannel: Send + Sync {
    /// Get the channel identifier (e.g., "screen", "input")
    fn id(&self) -> &str;

    /// Get the channel type
    fn channel_type(&self) -> ChannelType;

    /// Start capturing
    async fn start(&mut self) -> CaptureResult<()>;

    /// Stop capturing
    async fn stop(&mut self) -> CaptureResult<()>;

    /// Check if the channel is currently running
    fn is_running(&self) -> bool;
}

/// Types of capture channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// Periodic screenshots of the monitor under the pointer
    Screen,
    /// Global OS mouse clicks
    Input,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::Screen => write!(f, "screen"),
            ChannelType::Input => write!(f, "input"),
        }
    }
}
