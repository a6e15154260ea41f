//! Signaling messages and client interface
//!
//! The signaling service relays small negotiation messages between peers:
//! offers and answers carrying ICE credentials, trickled candidates and mode
//! switches. The engine consumes the inbound stream as a single dispatcher
//! and sends through the same client from every peer connection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Feature bit: the sender can run direct-path checks
pub const FEATURE_DIRECT_CHECK: u32 = 1;

/// Signaling message kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Offer,
    Answer,
    Candidate,
    Mode,
}

/// One signaling message. `key` is the sender, `remote_key` the addressee.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalMessage {
    pub key: String,
    pub remote_key: String,
    pub body: Body,
}

/// Payload of a signaling message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Body {
    pub message_type: MessageType,
    /// `ufrag:pwd` for offers/answers, candidate SDP for candidates
    pub payload: String,
    /// Sender's tunnel listener port, 0 when not applicable
    pub tunnel_listen_port: u16,
    /// Sender's client version
    pub version: String,
    /// Feature bits advertised by the sender
    pub features_supported: Vec<u32>,
    /// Present on MODE messages only
    pub mode: Option<Mode>,
}

/// Connection mode advertised by a peer
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Mode {
    pub direct: bool,
}

/// ICE credentials of one negotiation attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IceCredentials {
    pub ufrag: String,
    pub pwd: String,
}

/// Credential payload of an offer/answer body
pub fn credential_payload(credentials: &IceCredentials) -> String {
    format!("{}:{}", credentials.ufrag, credentials.pwd)
}

/// Extract ICE credentials from an offer/answer body
pub fn unmarshal_credentials(body: &Body) -> CoreResult<IceCredentials> {
    let (ufrag, pwd) = body
        .payload
        .split_once(':')
        .ok_or_else(|| CoreError::InvalidMessage("credential payload without separator".into()))?;

    if ufrag.is_empty() || pwd.is_empty() {
        return Err(CoreError::InvalidMessage("empty ICE credentials".into()));
    }

    Ok(IceCredentials {
        ufrag: ufrag.to_string(),
        pwd: pwd.to_string(),
    })
}

/// Full-duplex signaling client, shared by the engine and every peer
/// connection.
#[async_trait]
pub trait SignalClient: Send + Sync {
    /// Send a message to the peer named in `remote_key`
    async fn send(&self, msg: SignalMessage) -> CoreResult<()>;

    /// Next inbound message; Err when the stream broke
    async fn next_message(&self) -> CoreResult<SignalMessage>;

    /// Whether the client is connected to the service
    fn is_ready(&self) -> bool;

    /// Resolves once the inbound stream is connected
    async fn wait_stream_connected(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_round() {
        let credentials = IceCredentials {
            ufrag: "abcd".into(),
            pwd: "secret:with:colons".into(),
        };
        let body = Body {
            message_type: MessageType::Offer,
            payload: credential_payload(&credentials),
            tunnel_listen_port: 51820,
            version: "test".into(),
            features_supported: vec![FEATURE_DIRECT_CHECK],
            mode: None,
        };

        let parsed = unmarshal_credentials(&body).unwrap();
        assert_eq!(parsed, credentials);
    }

    #[test]
    fn test_malformed_credentials_rejected() {
        let mut body = Body {
            message_type: MessageType::Offer,
            payload: "noseparator".into(),
            tunnel_listen_port: 0,
            version: String::new(),
            features_supported: Vec::new(),
            mode: None,
        };
        assert!(matches!(
            unmarshal_credentials(&body),
            Err(CoreError::InvalidMessage(_))
        ));

        body.payload = ":".into();
        assert!(matches!(
            unmarshal_credentials(&body),
            Err(CoreError::InvalidMessage(_))
        ));
    }
}
