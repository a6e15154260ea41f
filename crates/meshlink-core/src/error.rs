//! Engine error types

use thiserror::Error;

use meshlink_network::NetworkError;

/// Engine errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// The connection was forced to close; terminal for its reconnect worker
    #[error("connection closed")]
    ConnectionClosed,

    /// Close was called on an already closed connection
    #[error("connection already closed")]
    ConnectionAlreadyClosed,

    /// A stream to the coordinator or the signaling service broke; the
    /// supervising layer is expected to restart the engine
    #[error("reset connection")]
    ResetConnection,

    /// Operation requires a started engine
    #[error("engine is not started")]
    NotStarted,

    /// Signaling message addressed to a peer the engine doesn't know
    #[error("wrongly addressed message {0}")]
    UnknownPeer(String),

    /// Peer is already tracked
    #[error("peer already exists: {0}")]
    PeerExists(String),

    /// Unparseable signaling message
    #[error("malformed signaling message: {0}")]
    InvalidMessage(String),

    /// The attempt's timeout budget ran out before a connection came up
    #[error("timed out waiting for the remote peer")]
    NegotiationTimeout,

    /// An established connection lost connectivity; retryable
    #[error("peer connection disconnected")]
    Disconnected,

    /// Malformed key material
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Network layer error
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
}

/// Result type for engine operations
pub type CoreResult<T> = Result<T, CoreError>;
