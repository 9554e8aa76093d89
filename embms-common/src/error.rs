//! Common error type for embms crates.

use thiserror::Error;

/// Errors shared across the embms crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// M2AP encoding error
    #[error("M2AP encoding error: {0}")]
    M2apEncode(String),

    /// M2AP decoding error
    #[error("M2AP decoding error: {0}")]
    M2apDecode(String),

    /// State machine error
    #[error("State machine error: {0}")]
    StateMachine(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}
