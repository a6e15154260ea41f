//! STUN binding codec (RFC 5389 subset)
//!
//! Only what server-reflexive candidate discovery needs: building a binding
//! request and extracting the mapped address from the response. Everything
//! else on the mux sockets belongs to the per-peer ICE agents.

use std::net::SocketAddr;

use crate::error::{NetworkError, NetworkResult};

const STUN_BINDING_REQUEST: u16 = 0x0001;
const STUN_BINDING_RESPONSE: u16 = 0x0101;
const STUN_BINDING_ERROR: u16 = 0x0111;

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

/// STUN magic cookie (RFC 5389)
const MAGIC_COOKIE: u32 = 0x2112A442;

/// Length of the STUN transaction ID
pub const TRANSACTION_ID_LEN: usize = 12;

/// Generate a random 96-bit transaction ID
pub fn new_transaction_id() -> NetworkResult<[u8; TRANSACTION_ID_LEN]> {
    let mut transaction_id = [0u8; TRANSACTION_ID_LEN];
    getrandom::getrandom(&mut transaction_id)
        .map_err(|e| NetworkError::Protocol(format!("transaction id generation failed: {e}")))?;
    Ok(transaction_id)
}

/// True when the datagram plausibly is a STUN message
pub fn is_stun_datagram(data: &[u8]) -> bool {
    // first two bits of a STUN message are zero
    if data.len() < 20 || data[0] > 0x03 {
        return false;
    }
    u32::from_be_bytes([data[4], data[5], data[6], data[7]]) == MAGIC_COOKIE
}

/// Transaction ID of a binding success/error response, `None` for anything
/// else (requests, indications, non-STUN traffic).
pub fn response_transaction_id(data: &[u8]) -> Option<[u8; TRANSACTION_ID_LEN]> {
    if !is_stun_datagram(data) {
        return None;
    }
    let msg_type = u16::from_be_bytes([data[0], data[1]]);
    if msg_type != STUN_BINDING_RESPONSE && msg_type != STUN_BINDING_ERROR {
        return None;
    }
    let mut txn_id = [0u8; TRANSACTION_ID_LEN];
    txn_id.copy_from_slice(&data[8..20]);
    Some(txn_id)
}

/// Build a STUN binding request packet
pub fn build_binding_request(transaction_id: &[u8; TRANSACTION_ID_LEN]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(20);

    packet.extend_from_slice(&STUN_BINDING_REQUEST.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    packet.extend_from_slice(transaction_id);

    packet
}

/// Parse a binding response and return the mapped address
pub fn parse_binding_response(
    data: &[u8],
    expected_txn_id: &[u8; TRANSACTION_ID_LEN],
) -> NetworkResult<SocketAddr> {
    if data.len() < 20 {
        return Err(NetworkError::Protocol("STUN response too short".into()));
    }

    let msg_type = u16::from_be_bytes([data[0], data[1]]);
    let msg_len = u16::from_be_bytes([data[2], data[3]]) as usize;
    let magic = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let txn_id = &data[8..20];

    if msg_type != STUN_BINDING_RESPONSE && msg_type != STUN_BINDING_ERROR {
        return Err(NetworkError::Protocol(format!(
            "unexpected STUN message type: 0x{msg_type:04x}"
        )));
    }

    if magic != MAGIC_COOKIE {
        return Err(NetworkError::Protocol("invalid STUN magic cookie".into()));
    }

    if txn_id != expected_txn_id {
        return Err(NetworkError::Protocol("transaction ID mismatch".into()));
    }

    if msg_type == STUN_BINDING_ERROR {
        return Err(NetworkError::Protocol("STUN binding error response".into()));
    }

    if data.len() < 20 + msg_len {
        return Err(NetworkError::Protocol("STUN message truncated".into()));
    }

    let mut mapped_address: Option<SocketAddr> = None;

    let mut pos = 20;
    while pos + 4 <= 20 + msg_len {
        let attr_type = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let attr_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;

        if pos + attr_len > data.len() {
            break;
        }

        let attr_data = &data[pos..pos + attr_len];

        match attr_type {
            ATTR_MAPPED_ADDRESS => {
                if let Some(addr) = parse_mapped_address(attr_data, false, &data[4..8]) {
                    mapped_address = Some(addr);
                }
            }
            ATTR_XOR_MAPPED_ADDRESS => {
                if let Some(addr) = parse_mapped_address(attr_data, true, &data[4..8]) {
                    mapped_address = Some(addr);
                }
            }
            _ => {}
        }

        // next attribute, 4-byte aligned
        pos += (attr_len + 3) & !3;
    }

    mapped_address
        .ok_or_else(|| NetworkError::Protocol("no mapped address in STUN response".into()))
}

/// Parse MAPPED-ADDRESS or XOR-MAPPED-ADDRESS attribute
fn parse_mapped_address(data: &[u8], xor: bool, magic_cookie: &[u8]) -> Option<SocketAddr> {
    if data.len() < 8 {
        return None;
    }

    let family = data[1];
    let mut port = u16::from_be_bytes([data[2], data[3]]);

    if xor {
        port ^= u16::from_be_bytes([magic_cookie[0], magic_cookie[1]]);
    }

    match family {
        0x01 => {
            let mut ip_bytes = [data[4], data[5], data[6], data[7]];
            if xor {
                for i in 0..4 {
                    ip_bytes[i] ^= magic_cookie[i];
                }
            }
            let ip = std::net::Ipv4Addr::from(ip_bytes);
            Some(SocketAddr::new(ip.into(), port))
        }
        0x02 => {
            if data.len() < 20 {
                return None;
            }
            let mut ip_bytes = [0u8; 16];
            ip_bytes.copy_from_slice(&data[4..20]);
            if xor {
                for i in 0..4 {
                    ip_bytes[i] ^= magic_cookie[i];
                }
            }
            let ip = std::net::Ipv6Addr::from(ip_bytes);
            Some(SocketAddr::new(ip.into(), port))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding_response(txn_id: &[u8; 12], addr: SocketAddr) -> Vec<u8> {
        let (family, ip_bytes, port) = match addr {
            SocketAddr::V4(v4) => (0x01u8, v4.ip().octets().to_vec(), v4.port()),
            SocketAddr::V6(v6) => (0x02u8, v6.ip().octets().to_vec(), v6.port()),
        };

        let attr_len = 4 + ip_bytes.len();
        let mut packet = Vec::new();
        packet.extend_from_slice(&STUN_BINDING_RESPONSE.to_be_bytes());
        packet.extend_from_slice(&((4 + attr_len) as u16).to_be_bytes());
        packet.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        packet.extend_from_slice(txn_id);
        packet.extend_from_slice(&ATTR_MAPPED_ADDRESS.to_be_bytes());
        packet.extend_from_slice(&(attr_len as u16).to_be_bytes());
        packet.push(0);
        packet.push(family);
        packet.extend_from_slice(&port.to_be_bytes());
        packet.extend_from_slice(&ip_bytes);
        packet
    }

    #[test]
    fn test_request_layout() {
        let txn_id = [1u8; 12];
        let request = build_binding_request(&txn_id);

        assert_eq!(request.len(), 20);
        assert_eq!(request[0..2], [0x00, 0x01]);
        assert_eq!(request[4..8], MAGIC_COOKIE.to_be_bytes());
        assert_eq!(&request[8..20], &txn_id);
        assert!(is_stun_datagram(&request));
        // a request carries no response transaction id
        assert!(response_transaction_id(&request).is_none());
    }

    #[test]
    fn test_response_round() {
        let txn_id = [7u8; 12];
        let mapped: SocketAddr = "203.0.113.9:41641".parse().unwrap();
        let packet = binding_response(&txn_id, mapped);

        assert_eq!(response_transaction_id(&packet), Some(txn_id));
        assert_eq!(parse_binding_response(&packet, &txn_id).unwrap(), mapped);
    }

    #[test]
    fn test_response_transaction_mismatch() {
        let txn_id = [7u8; 12];
        let packet = binding_response(&txn_id, "203.0.113.9:41641".parse().unwrap());

        let err = parse_binding_response(&packet, &[8u8; 12]).unwrap_err();
        assert!(matches!(err, NetworkError::Protocol(_)));
    }

    #[test]
    fn test_non_stun_rejected() {
        assert!(!is_stun_datagram(b"hello, definitely not stun"));
        assert!(response_transaction_id(&[0u8; 8]).is_none());
    }
}
