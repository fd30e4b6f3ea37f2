//! Error types for the Gatekeeper engine.

use thiserror::Error;

/// Main error type for Gatekeeper operations.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The counter store has reached its configured key capacity
    #[error("Counter store at capacity ({0} keys)")]
    StoreExhausted(usize),

    /// Alert notification delivery errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
