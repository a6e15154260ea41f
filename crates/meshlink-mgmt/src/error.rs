//! Management plane errors

use thiserror::Error;

/// Management plane errors
#[derive(Debug, Error)]
pub enum MgmtError {
    /// Precondition failed (e.g. network out of IPs)
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Malformed network or address
    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}

/// Result type for management plane operations
pub type MgmtResult<T> = Result<T, MgmtError>;
