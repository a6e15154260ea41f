//! Engine configuration

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{CoreError, CoreResult};

/// Engine configuration, immutable after start
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tunnel interface name
    pub iface_name: String,

    /// Local tunnel address in CIDR notation (mesh network IP)
    pub tunnel_addr: String,

    /// Local tunnel private key, base64. It MUST never leave the machine.
    pub private_key: String,

    /// Tunnel listener port
    pub tunnel_port: u16,

    /// Port of the host-candidate mux socket, 0 lets the OS pick
    pub mux_port: u16,

    /// Port of the server-reflexive mux socket, 0 lets the OS pick
    pub mux_srflx_port: u16,

    /// Network interfaces to ignore when discovering candidates, substring
    /// match
    pub iface_blacklist: Vec<String>,

    pub disable_ipv6_discovery: bool,

    /// Optional pre-shared key applied to every tunnel peer, base64
    pub pre_shared_key: Option<String>,

    /// Private key of the embedded remote-shell server, PEM
    pub shell_key: Option<String>,

    /// Static NAT mappings, `EXTERNAL` or `EXTERNAL/INTERNAL` where
    /// `INTERNAL` is an IP or a local interface name
    pub nat_external_ips: Vec<String>,

    /// Custom DNS server address handed to the DNS collaborator
    pub custom_dns_address: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            iface_name: "meshlink0".to_string(),
            tunnel_addr: String::new(),
            private_key: String::new(),
            tunnel_port: 51820,
            mux_port: 0,
            mux_srflx_port: 0,
            iface_blacklist: Vec::new(),
            disable_ipv6_discovery: false,
            pre_shared_key: None,
            shell_key: None,
            nat_external_ips: Vec::new(),
            custom_dns_address: String::new(),
        }
    }
}

impl EngineConfig {
    /// Derive the local public key from the configured private key
    pub fn derive_public_key(&self) -> CoreResult<String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.private_key)
            .map_err(|e| CoreError::InvalidKey(format!("private key is not base64: {e}")))?;

        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidKey("private key must be 32 bytes".into()))?;

        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Ok(base64::engine::general_purpose::STANDARD.encode(public.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_public_key() {
        let config = EngineConfig {
            private_key: base64::engine::general_purpose::STANDARD.encode([7u8; 32]),
            ..Default::default()
        };

        let public = config.derive_public_key().unwrap();
        assert_eq!(
            base64::engine::general_purpose::STANDARD
                .decode(&public)
                .unwrap()
                .len(),
            32
        );
        // deterministic for a fixed private key
        assert_eq!(public, config.derive_public_key().unwrap());
    }

    #[test]
    fn test_derive_public_key_rejects_garbage() {
        let config = EngineConfig {
            private_key: "definitely-not-base64!!".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.derive_public_key(),
            Err(CoreError::InvalidKey(_))
        ));

        let config = EngineConfig {
            private_key: base64::engine::general_purpose::STANDARD.encode([1u8; 16]),
            ..Default::default()
        };
        assert!(matches!(
            config.derive_public_key(),
            Err(CoreError::InvalidKey(_))
        ));
    }
}
