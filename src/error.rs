//! Error types for Synheart Focus

use thiserror::Error;

/// Errors that can occur during frame analysis and distribution
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to decode frame payload: {0}")]
    DecodeError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    #[error("Missing required landmark: {0}")]
    MissingLandmark(u32),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Landmark provider error: {0}")]
    ProviderError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Delivery failed: {0}")]
    DeliveryError(String),
}
