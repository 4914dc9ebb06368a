//! Core prerender error types (pure - no I/O variants).

use thiserror::Error;

/// Maximum size for a serialized hydration payload (5MB).
pub const MAX_PAYLOAD_SIZE: usize = 5 * 1024 * 1024;

/// Core prerender errors (pure - no I/O variants).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SsrCoreError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Minimum instance count must be at least 1")]
    InvalidInstanceCount,

    #[error("Maximum uses per context must be at least 1")]
    InvalidMaxUses,

    #[error("Stability timeout must be positive")]
    InvalidTimeout,

    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Template parse failed: {0}")]
    TemplateParse(String),
}

pub type Result<T> = std::result::Result<T, SsrCoreError>;
