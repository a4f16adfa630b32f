//! DNS message encoding for the mDNS responder.
//!
//! Only what an A-record responder needs: name encoding, question parsing
//! with compression pointers, and a fixed single-answer response.

use std::net::Ipv4Addr;

use thiserror::Error;

pub const TYPE_A: u16 = 1;
pub const TYPE_ANY: u16 = 255;
pub const CLASS_IN: u16 = 1;

/// TTL advertised on answers, in seconds.
pub const ANSWER_TTL: u32 = 120;

const HEADER_LEN: usize = 12;
const MAX_LABEL_LEN: usize = 63;
/// Compression pointers followed before a name is considered malformed.
const MAX_POINTER_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("dns name is empty")]
    EmptyName,

    #[error("dns label '{0}' must be 1-63 bytes")]
    InvalidLabel(String),
}

/// Encode a dotted name as length-prefixed labels ending in a zero byte.
pub fn encode_name(name: &str) -> Result<Vec<u8>, DnsError> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        return Err(DnsError::EmptyName);
    }

    let mut out = Vec::with_capacity(name.len() + 2);
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(DnsError::InvalidLabel(label.to_string()));
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    Ok(out)
}

/// Decode the name starting at `start`.
///
/// Returns the dotted name and the number of bytes it occupies at `start`
/// (a compression pointer counts as two). `None` for truncated names,
/// reserved label types, out-of-range pointers or pointer chains deeper
/// than eight.
pub fn decode_name(packet: &[u8], start: usize) -> Option<(String, usize)> {
    let mut offset = start;
    let mut consumed = 0;
    let mut jumps = 0;
    let mut labels: Vec<String> = Vec::new();

    loop {
        let length = *packet.get(offset)? as usize;

        if length == 0 {
            if jumps == 0 {
                consumed += 1;
            }
            return Some((labels.join("."), consumed));
        }

        match length & 0xC0 {
            0xC0 => {
                let low = *packet.get(offset + 1)? as usize;
                let pointer = ((length & 0x3F) << 8) | low;
                if pointer >= packet.len() {
                    return None;
                }
                if jumps == 0 {
                    consumed += 2;
                }
                jumps += 1;
                if jumps > MAX_POINTER_DEPTH {
                    return None;
                }
                offset = pointer;
            }
            0x00 => {
                let label = packet.get(offset + 1..offset + 1 + length)?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                if jumps == 0 {
                    consumed += 1 + length;
                }
                offset += 1 + length;
            }
            _ => return None,
        }
    }
}

fn read_u16(packet: &[u8], offset: usize) -> Option<u16> {
    let bytes = packet.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Whether `packet` is a query asking for the A (or ANY) record of `host`.
///
/// Names compare ASCII case-insensitively. The unicast-response bit of the
/// question class is ignored. Responses and malformed packets never match.
pub fn query_requests_host(packet: &[u8], host: &str) -> bool {
    if packet.len() < HEADER_LEN {
        return false;
    }
    // QR set: this is someone's answer, not a question.
    if packet[2] & 0x80 != 0 {
        return false;
    }

    let host = host.strip_suffix('.').unwrap_or(host);
    let Some(qdcount) = read_u16(packet, 4) else {
        return false;
    };

    let mut offset = HEADER_LEN;
    for _ in 0..qdcount {
        let Some((name, consumed)) = decode_name(packet, offset) else {
            return false;
        };
        offset += consumed;

        let (Some(qtype), Some(qclass)) = (read_u16(packet, offset), read_u16(packet, offset + 2)) else {
            return false;
        };
        offset += 4;

        let class_ok = qclass & 0x7FFF == CLASS_IN;
        let type_ok = qtype == TYPE_A || qtype == TYPE_ANY;
        if class_ok && type_ok && name.eq_ignore_ascii_case(host) {
            return true;
        }
    }

    false
}

/// An authoritative response carrying a single A record for `host`.
pub fn build_answer(host: &str, address: Ipv4Addr) -> Result<Vec<u8>, DnsError> {
    let name = encode_name(host)?;

    let mut packet = Vec::with_capacity(HEADER_LEN + name.len() + 14);
    // id 0, flags QR|AA, no questions, one answer.
    packet.extend_from_slice(&[0x00, 0x00, 0x84, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    packet.extend_from_slice(&name);
    packet.extend_from_slice(&TYPE_A.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    packet.extend_from_slice(&ANSWER_TTL.to_be_bytes());
    packet.extend_from_slice(&4u16.to_be_bytes());
    packet.extend_from_slice(&address.octets());
    Ok(packet)
}
