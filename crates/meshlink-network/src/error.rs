//! Network layer error types

use thiserror::Error;

/// Network layer errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed ICE URL
    #[error("invalid ICE URL: {0}")]
    InvalidUrl(String),

    /// Protocol violation in a received packet
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Tunnel driver error
    #[error("tunnel device error: {0}")]
    TunnelError(String),

    /// Candidate gathering failed
    #[error("candidate gathering failed: {0}")]
    GatherFailed(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Operation timed out
    #[error("operation timed out")]
    Timeout,
}

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;
