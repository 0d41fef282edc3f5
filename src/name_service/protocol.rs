// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Name-service messages carried as sequences.
//!
//! Every field is one tagged element. Integers are little-endian, strings
//! are UTF-8 without a terminator, and an IPv4 endpoint is four address
//! octets followed by the port in network order. A protocol element applies
//! to the endpoint element just before it. Tags `1..=9` are reserved for
//! the protocol; elements with any other tag are application metadata and
//! travel through untouched.

use crate::errors::ProtocolError;
use crate::name_service::info::{FtState, NameEndpoint, MAX_ENDPOINTS};
use crate::sequence::{Element, Sequence, SequenceBuilder, SequenceId, SequenceType, ServiceType};
use std::net::Ipv4Addr;

pub type RequestId = u64;

pub const NAME_SEQUENCE_NAME: &str = "name_request";
pub const NAME_SEQUENCE_ID: SequenceId = 0x9a3e_07e9;
pub const HEARTBEAT_SEQUENCE_NAME: &str = "name_server_heartbeat";
pub const HEARTBEAT_SEQUENCE_ID: SequenceId = 0x300_0000;

pub const TAG_NAME: u64 = 1;
pub const TAG_CONNECT_IPV4: u64 = 2;
pub const TAG_GROUP_NAME: u64 = 3;
pub const TAG_LINGER: u64 = 4;
pub const TAG_REQUEST_ID: u64 = 5;
pub const TAG_PROTOCOL: u64 = 6;
pub const TAG_FT_STATE: u64 = 7;
pub const TAG_SERVER_ID: u64 = 8;
pub const TAG_REMOVED: u64 = 9;

/// Element tags the protocol claims. Metadata carrying one of these is
/// read back as a protocol field.
pub const RESERVED_TAGS: std::ops::RangeInclusive<u64> = TAG_NAME..=TAG_REMOVED;

const ENDPOINT_LEN: usize = 6;

/// A decoded name-service message, in either direction.
///
/// `kind` is the sequence type: clients send `Request` (register), `Query`
/// and `Subscribe`; servers answer registrations and subscription
/// confirmations with `Request` and lookups with `Query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMessage {
    pub kind: SequenceType,
    pub name: String,
    pub request_id: Option<RequestId>,
    pub group_name: Option<String>,
    pub linger_secs: Option<u32>,
    pub endpoints: Vec<NameEndpoint>,
    pub ft_state: Option<FtState>,
    pub server_id: Option<u64>,
    pub removed: bool,
    pub meta_data: Vec<Element>,
}

impl NameMessage {
    pub fn new(kind: SequenceType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            request_id: None,
            group_name: None,
            linger_secs: None,
            endpoints: Vec::new(),
            ft_state: None,
            server_id: None,
            removed: false,
            meta_data: Vec::new(),
        }
    }

    pub fn to_builder(&self) -> SequenceBuilder {
        let mut builder = Sequence::builder(NAME_SEQUENCE_NAME, NAME_SEQUENCE_ID)
            .sequence_type(self.kind)
            .service_type(ServiceType::Mgmt);

        builder.copy_str(&self.name, TAG_NAME);
        if let Some(id) = self.request_id {
            builder.copy_bytes(&id.to_le_bytes(), TAG_REQUEST_ID);
        }
        if let Some(group) = &self.group_name {
            builder.copy_str(group, TAG_GROUP_NAME);
        }
        if let Some(linger) = self.linger_secs {
            builder.copy_bytes(&linger.to_le_bytes(), TAG_LINGER);
        }
        for endpoint in self.endpoints.iter().take(MAX_ENDPOINTS) {
            builder.copy_bytes(&encode_endpoint(endpoint), TAG_CONNECT_IPV4);
            if let Some(protocol) = &endpoint.protocol {
                builder.copy_str(protocol, TAG_PROTOCOL);
            }
        }
        if let Some(state) = self.ft_state {
            builder.copy_bytes(&[state.raw()], TAG_FT_STATE);
        }
        if let Some(server) = self.server_id {
            builder.copy_bytes(&server.to_le_bytes(), TAG_SERVER_ID);
        }
        if self.removed {
            builder.copy_bytes(&[1], TAG_REMOVED);
        }
        for element in &self.meta_data {
            builder.push_element(element.clone());
        }
        builder
    }

    pub fn decode(sequence: &Sequence) -> Result<Self, ProtocolError> {
        let mut name = None;
        let mut message = NameMessage::new(sequence.sequence_type(), String::new());

        for element in sequence {
            let payload = element.payload;
            match element.type_tag {
                TAG_NAME => name = Some(utf8(payload, TAG_NAME)?),
                TAG_REQUEST_ID => message.request_id = Some(u64_le(payload, TAG_REQUEST_ID)?),
                TAG_GROUP_NAME => message.group_name = Some(utf8(payload, TAG_GROUP_NAME)?),
                TAG_LINGER => {
                    let bytes: [u8; 4] = payload.try_into().map_err(|_| ProtocolError::BadLength {
                        tag: TAG_LINGER,
                        expected: 4,
                        actual: payload.len(),
                    })?;
                    message.linger_secs = Some(u32::from_le_bytes(bytes));
                }
                TAG_CONNECT_IPV4 => {
                    if message.endpoints.len() < MAX_ENDPOINTS {
                        message.endpoints.push(decode_endpoint(payload)?);
                    }
                }
                TAG_PROTOCOL => {
                    let protocol = utf8(payload, TAG_PROTOCOL)?;
                    if let Some(last) = message.endpoints.last_mut() {
                        if last.protocol.is_none() {
                            last.protocol = Some(protocol);
                        }
                    }
                }
                TAG_FT_STATE => {
                    let raw = *payload.first().ok_or(ProtocolError::BadLength {
                        tag: TAG_FT_STATE,
                        expected: 1,
                        actual: 0,
                    })?;
                    message.ft_state = Some(FtState::from_raw(raw)?);
                }
                TAG_SERVER_ID => message.server_id = Some(u64_le(payload, TAG_SERVER_ID)?),
                TAG_REMOVED => message.removed = payload.first() == Some(&1),
                tag => message.meta_data.push(Element::new(payload.to_vec(), tag)),
            }
        }

        message.name = name.ok_or(ProtocolError::MissingName)?;
        Ok(message)
    }
}

pub fn is_name_sequence(sequence: &Sequence) -> bool {
    sequence.id() == NAME_SEQUENCE_ID
}

pub fn is_heartbeat_sequence(sequence: &Sequence) -> bool {
    sequence.id() == HEARTBEAT_SEQUENCE_ID
}

/// The periodic liveness message a name server sends its clients.
pub fn heartbeat(server_id: u64) -> SequenceBuilder {
    let mut builder = Sequence::builder(HEARTBEAT_SEQUENCE_NAME, HEARTBEAT_SEQUENCE_ID)
        .service_type(ServiceType::Mgmt);
    builder.copy_bytes(&server_id.to_le_bytes(), TAG_SERVER_ID);
    builder
}

pub fn decode_heartbeat(sequence: &Sequence) -> Result<u64, ProtocolError> {
    let payload = sequence
        .find_by_type(TAG_SERVER_ID)
        .ok_or(ProtocolError::MissingServerId)?;
    u64_le(payload, TAG_SERVER_ID)
}

fn encode_endpoint(endpoint: &NameEndpoint) -> [u8; ENDPOINT_LEN] {
    let mut out = [0u8; ENDPOINT_LEN];
    out[..4].copy_from_slice(&endpoint.address.octets());
    out[4..].copy_from_slice(&endpoint.port.to_be_bytes());
    out
}

fn decode_endpoint(payload: &[u8]) -> Result<NameEndpoint, ProtocolError> {
    if payload.len() != ENDPOINT_LEN {
        return Err(ProtocolError::BadLength {
            tag: TAG_CONNECT_IPV4,
            expected: ENDPOINT_LEN,
            actual: payload.len(),
        });
    }
    Ok(NameEndpoint {
        address: Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]),
        port: u16::from_be_bytes([payload[4], payload[5]]),
        protocol: None,
    })
}

fn utf8(payload: &[u8], tag: u64) -> Result<String, ProtocolError> {
    String::from_utf8(payload.to_vec()).map_err(|_| ProtocolError::InvalidUtf8 { tag })
}

fn u64_le(payload: &[u8], tag: u64) -> Result<u64, ProtocolError> {
    let bytes: [u8; 8] = payload.try_into().map_err(|_| ProtocolError::BadLength {
        tag,
        expected: 8,
        actual: payload.len(),
    })?;
    Ok(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SequenceHandle;

    fn endpoint(last: u8, port: u16, protocol: Option<&str>) -> NameEndpoint {
        NameEndpoint {
            address: Ipv4Addr::new(10, 0, 0, last),
            port,
            protocol: protocol.map(str::to_string),
        }
    }

    #[test]
    fn test_registration_survives_encoding() {
        let mut message = NameMessage::new(SequenceType::Request, "telemetry");
        message.request_id = Some(17);
        message.group_name = Some("blue".into());
        message.linger_secs = Some(5);
        message.endpoints = vec![endpoint(1, 29312, Some("tcp")), endpoint(2, 29313, None)];
        message.ft_state = Some(FtState::Active);
        message.meta_data = vec![Element::new(b"rack-4".to_vec(), 0x200)];

        let seq = message.to_builder().build(SequenceHandle(1));
        assert!(is_name_sequence(&seq));
        assert_eq!(NameMessage::decode(&seq).unwrap(), message);
    }

    #[test]
    fn test_endpoint_wire_layout_uses_network_order_port() {
        let mut message = NameMessage::new(SequenceType::Query, "svc");
        message.endpoints = vec![endpoint(9, 0x1234, None)];
        let seq = message.to_builder().build(SequenceHandle(2));

        assert_eq!(
            seq.find_by_type(TAG_CONNECT_IPV4),
            Some(&[10, 0, 0, 9, 0x12, 0x34][..])
        );
    }

    #[test]
    fn test_metadata_in_the_reserved_range_reads_back_as_protocol_field() {
        for tag in [TAG_NAME, TAG_SERVER_ID, TAG_REMOVED] {
            assert!(RESERVED_TAGS.contains(&tag));
        }
        assert!(!RESERVED_TAGS.contains(&0x200));

        let mut message = NameMessage::new(SequenceType::Request, "svc");
        message.meta_data = vec![
            Element::new(b"rack-4".to_vec(), 0x200),
            Element::new(vec![1], TAG_REMOVED),
        ];
        let decoded = NameMessage::decode(&message.to_builder().build(SequenceHandle(3))).unwrap();

        assert!(decoded.removed);
        assert_eq!(decoded.meta_data, vec![Element::new(b"rack-4".to_vec(), 0x200)]);
    }

    #[test]
    fn test_decode_requires_a_name() {
        let mut builder = Sequence::builder(NAME_SEQUENCE_NAME, NAME_SEQUENCE_ID);
        builder.copy_bytes(&3u64.to_le_bytes(), TAG_REQUEST_ID);
        let seq = builder.build(SequenceHandle(3));

        assert_eq!(NameMessage::decode(&seq), Err(ProtocolError::MissingName));
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        let mut builder = Sequence::builder(NAME_SEQUENCE_NAME, NAME_SEQUENCE_ID);
        builder.copy_str("svc", TAG_NAME).copy_bytes(&[1, 2, 3], TAG_REQUEST_ID);
        let seq = builder.build(SequenceHandle(4));

        assert_eq!(
            NameMessage::decode(&seq),
            Err(ProtocolError::BadLength {
                tag: TAG_REQUEST_ID,
                expected: 8,
                actual: 3
            })
        );
    }

    #[test]
    fn test_endpoints_are_capped() {
        let mut message = NameMessage::new(SequenceType::Request, "wide");
        message.endpoints = (1..=7).map(|i| endpoint(i, 1000, None)).collect();
        let seq = message.to_builder().build(SequenceHandle(5));

        assert_eq!(NameMessage::decode(&seq).unwrap().endpoints.len(), MAX_ENDPOINTS);
    }

    #[test]
    fn test_heartbeat_carries_server_id() {
        let seq = heartbeat(0xabc).build(SequenceHandle(6));
        assert!(is_heartbeat_sequence(&seq));
        assert!(!is_name_sequence(&seq));
        assert_eq!(decode_heartbeat(&seq), Ok(0xabc));
    }
}
