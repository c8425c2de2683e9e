//! Canonical wire codec.
//!
//! A frame is a flat concatenation with no framing overhead of its own;
//! transports are responsible for delimiting frames:
//!
//! ```text
//! FRAME := src_pub(32) ‖ dst_field(32) ‖ type_tag(1) ‖ body
//! ```
//!
//! | Tag  | Variant      | Body                                                  |
//! |------|--------------|-------------------------------------------------------|
//! | 0x01 | NetworkData  | `nonce(12) ‖ length(2) ‖ signature(64) ‖ payload`     |
//! | 0x02 | RouteRequest | `dst_kind(1) ‖ x25519_pub(32) ‖ signature(64)`        |
//! | 0x03 | RouteResponse| `requester_key(32) ‖ x25519_pub(32) ‖ signature(64)`  |
//! | 0x04 | RouteError   | `route_src(32) ‖ route_dst(32) ‖ signature(64)`       |
//!
//! For RouteRequest frames, `dst_kind` 0x00 marks `dst_field` as a full
//! Ed25519 key and any other value as a raw opaque address. The codec does
//! not verify signatures; an unsigned message encodes with a zeroed
//! signature field and is discarded at admission by the receiver.

use qorp_crypto::ed25519::Signature;
use qorp_crypto::x25519::X25519PublicKey;

use crate::messages::{
    Message, NetworkData, RouteError, RouteRequest, RouteResponse, NONCE_LENGTH,
};
use crate::nodes::{KnownNode, Node, NodeAddress, ADDRESS_LENGTH};
use crate::{DecodeError, Result};

/// Length of a raw public key field in bytes.
pub const PUBKEY_LENGTH: usize = 32;

/// Length of an Ed25519 signature field in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of the common frame header: source, destination field, type tag.
pub const HEADER_LENGTH: usize = 2 * PUBKEY_LENGTH + 1;

/// Type tag for NetworkData frames.
pub const TAG_DATA: u8 = 0x01;
/// Type tag for RouteRequest frames.
pub const TAG_REQUEST: u8 = 0x02;
/// Type tag for RouteResponse frames.
pub const TAG_RESPONSE: u8 = 0x03;
/// Type tag for RouteError frames.
pub const TAG_ERROR: u8 = 0x04;

/// Destination-kind marker: `dst_field` is a full Ed25519 public key.
const DST_KNOWN: u8 = 0x00;
/// Destination-kind marker: `dst_field` is a raw opaque address.
const DST_OPAQUE: u8 = 0x01;

const DATA_BODY_LENGTH: usize = NONCE_LENGTH + 2 + SIGNATURE_LENGTH;
const REQUEST_BODY_LENGTH: usize = 1 + PUBKEY_LENGTH + SIGNATURE_LENGTH;
const RESPONSE_BODY_LENGTH: usize = 2 * PUBKEY_LENGTH + SIGNATURE_LENGTH;
const ERROR_BODY_LENGTH: usize = 2 * PUBKEY_LENGTH + SIGNATURE_LENGTH;

/// Serialise a message into its canonical frame bytes.
pub fn encode(message: &Message) -> Vec<u8> {
    match message {
        Message::Data(data) => {
            let mut frame =
                Vec::with_capacity(HEADER_LENGTH + DATA_BODY_LENGTH + data.payload.len());
            frame.extend_from_slice(data.source.address().as_bytes());
            frame.extend_from_slice(data.destination.address().as_bytes());
            frame.push(TAG_DATA);
            frame.extend_from_slice(&data.nonce);
            frame.extend_from_slice(&data.length.to_be_bytes());
            frame.extend_from_slice(&signature_bytes(&data.signature));
            frame.extend_from_slice(&data.payload);
            frame
        }
        Message::Request(request) => {
            let mut frame = Vec::with_capacity(HEADER_LENGTH + REQUEST_BODY_LENGTH);
            frame.extend_from_slice(request.source.address().as_bytes());
            frame.extend_from_slice(request.destination.address().as_bytes());
            frame.push(TAG_REQUEST);
            frame.push(match request.destination {
                Node::Known(_) => DST_KNOWN,
                Node::Opaque(_) => DST_OPAQUE,
            });
            frame.extend_from_slice(request.public_key.as_bytes());
            frame.extend_from_slice(&signature_bytes(&request.signature));
            frame
        }
        Message::Response(response) => {
            let mut frame = Vec::with_capacity(HEADER_LENGTH + RESPONSE_BODY_LENGTH);
            frame.extend_from_slice(response.source.address().as_bytes());
            frame.extend_from_slice(response.destination.address().as_bytes());
            frame.push(TAG_RESPONSE);
            frame.extend_from_slice(response.requester_key.as_bytes());
            frame.extend_from_slice(response.public_key.as_bytes());
            frame.extend_from_slice(&signature_bytes(&response.signature));
            frame
        }
        Message::Error(error) => {
            let mut frame = Vec::with_capacity(HEADER_LENGTH + ERROR_BODY_LENGTH);
            frame.extend_from_slice(error.source.address().as_bytes());
            frame.extend_from_slice(error.destination.address().as_bytes());
            frame.push(TAG_ERROR);
            frame.extend_from_slice(error.route_source.address().as_bytes());
            frame.extend_from_slice(error.route_destination.address().as_bytes());
            frame.extend_from_slice(&signature_bytes(&error.signature));
            frame
        }
    }
}

/// Deserialise a frame into a message.
///
/// Signatures are carried through unverified; admission control rejects
/// forgeries later. Trailing bytes after a fixed-length body are ignored.
pub fn decode(frame: &[u8]) -> Result<Message> {
    if frame.len() < HEADER_LENGTH {
        return Err(DecodeError::Truncated {
            expected: HEADER_LENGTH,
            actual: frame.len(),
        });
    }
    let source = known_node(&frame[..PUBKEY_LENGTH])?;
    let dst_field = &frame[PUBKEY_LENGTH..2 * PUBKEY_LENGTH];
    let tag = frame[2 * PUBKEY_LENGTH];
    let body = &frame[HEADER_LENGTH..];

    match tag {
        TAG_DATA => {
            require(body, DATA_BODY_LENGTH, frame.len())?;
            let destination = known_node(dst_field)?;
            let mut nonce = [0u8; NONCE_LENGTH];
            nonce.copy_from_slice(&body[..NONCE_LENGTH]);
            let length = u16::from_be_bytes([body[NONCE_LENGTH], body[NONCE_LENGTH + 1]]);
            let signature = signature(&body[NONCE_LENGTH + 2..NONCE_LENGTH + 2 + SIGNATURE_LENGTH]);
            let payload = body[DATA_BODY_LENGTH..].to_vec();
            Ok(Message::Data(NetworkData {
                source,
                destination,
                nonce,
                length,
                payload,
                signature: Some(signature),
            }))
        }
        TAG_REQUEST => {
            require(body, REQUEST_BODY_LENGTH, frame.len())?;
            let destination = if body[0] == DST_KNOWN {
                Node::Known(known_node(dst_field)?)
            } else {
                Node::Opaque(node_address(dst_field))
            };
            let public_key = x25519_key(&body[1..1 + PUBKEY_LENGTH]);
            let signature = signature(&body[1 + PUBKEY_LENGTH..REQUEST_BODY_LENGTH]);
            Ok(Message::Request(RouteRequest {
                source,
                destination,
                public_key,
                signature: Some(signature),
            }))
        }
        TAG_RESPONSE => {
            require(body, RESPONSE_BODY_LENGTH, frame.len())?;
            let destination = known_node(dst_field)?;
            let requester_key = x25519_key(&body[..PUBKEY_LENGTH]);
            let public_key = x25519_key(&body[PUBKEY_LENGTH..2 * PUBKEY_LENGTH]);
            let signature = signature(&body[2 * PUBKEY_LENGTH..RESPONSE_BODY_LENGTH]);
            Ok(Message::Response(RouteResponse {
                source,
                destination,
                requester_key,
                public_key,
                signature: Some(signature),
            }))
        }
        TAG_ERROR => {
            require(body, ERROR_BODY_LENGTH, frame.len())?;
            let destination = known_node(dst_field)?;
            let route_source = known_node(&body[..PUBKEY_LENGTH])?;
            let route_destination = known_node(&body[PUBKEY_LENGTH..2 * PUBKEY_LENGTH])?;
            let signature = signature(&body[2 * PUBKEY_LENGTH..ERROR_BODY_LENGTH]);
            Ok(Message::Error(RouteError {
                source,
                destination,
                route_source,
                route_destination,
                signature: Some(signature),
            }))
        }
        unknown => Err(DecodeError::UnknownKind(unknown)),
    }
}

fn require(body: &[u8], body_length: usize, frame_length: usize) -> Result<()> {
    if body.len() < body_length {
        return Err(DecodeError::Truncated {
            expected: HEADER_LENGTH + body_length,
            actual: frame_length,
        });
    }
    Ok(())
}

fn signature_bytes(signature: &Option<Signature>) -> [u8; SIGNATURE_LENGTH] {
    match signature {
        Some(signature) => signature.to_bytes(),
        None => [0u8; SIGNATURE_LENGTH],
    }
}

fn known_node(bytes: &[u8]) -> Result<KnownNode> {
    let mut key = [0u8; ADDRESS_LENGTH];
    key.copy_from_slice(bytes);
    KnownNode::from_bytes(&key).map_err(|_| DecodeError::InvalidKey)
}

fn node_address(bytes: &[u8]) -> NodeAddress {
    let mut address = [0u8; ADDRESS_LENGTH];
    address.copy_from_slice(bytes);
    NodeAddress::new(address)
}

fn x25519_key(bytes: &[u8]) -> X25519PublicKey {
    let mut key = [0u8; PUBKEY_LENGTH];
    key.copy_from_slice(bytes);
    X25519PublicKey::from_bytes(key)
}

fn signature(bytes: &[u8]) -> Signature {
    let mut raw = [0u8; SIGNATURE_LENGTH];
    raw.copy_from_slice(bytes);
    Signature::from_bytes(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qorp_crypto::ed25519::KeyPair;
    use qorp_crypto::x25519::X25519StaticSecret;

    fn node(kp: &KeyPair) -> KnownNode {
        KnownNode::new(kp.verifying_key())
    }

    fn x25519_pub() -> X25519PublicKey {
        X25519StaticSecret::random().public_key()
    }

    fn signed_data(src: &KeyPair, dst: &KeyPair, payload: &[u8]) -> Message {
        let mut data = NetworkData::new(
            node(src),
            node(dst),
            [0x07u8; NONCE_LENGTH],
            payload.len() as u16,
            payload.to_vec(),
        );
        data.sign(src);
        Message::Data(data)
    }

    #[test]
    fn test_data_roundtrip() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let message = signed_data(&src, &dst, b"hello mesh");
        let decoded = decode(&encode(&message)).expect("decode");
        assert_eq!(decoded, message);
        assert!(decoded.verify());
    }

    #[test]
    fn test_data_empty_payload_roundtrip() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let message = signed_data(&src, &dst, b"");
        let decoded = decode(&encode(&message)).expect("decode");
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_request_roundtrip_known_destination() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let mut request = RouteRequest::new(node(&src), Node::Known(node(&dst)), x25519_pub());
        request.sign(&src);
        let message = Message::Request(request);
        let decoded = decode(&encode(&message)).expect("decode");
        assert_eq!(decoded, message);
        assert!(decoded.verify());
        assert!(matches!(
            decoded,
            Message::Request(RouteRequest {
                destination: Node::Known(_),
                ..
            })
        ));
    }

    #[test]
    fn test_request_roundtrip_opaque_destination() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let opaque = Node::Opaque(node(&dst).address());
        let mut request = RouteRequest::new(node(&src), opaque, x25519_pub());
        request.sign(&src);
        let message = Message::Request(request);
        let decoded = decode(&encode(&message)).expect("decode");
        assert_eq!(decoded, message);
        assert!(decoded.verify());
        assert!(matches!(
            decoded,
            Message::Request(RouteRequest {
                destination: Node::Opaque(_),
                ..
            })
        ));
    }

    #[test]
    fn test_response_roundtrip() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let mut response = RouteResponse::new(node(&src), node(&dst), x25519_pub(), x25519_pub());
        response.sign(&src);
        let message = Message::Response(response);
        let decoded = decode(&encode(&message)).expect("decode");
        assert_eq!(decoded, message);
        assert!(decoded.verify());
    }

    #[test]
    fn test_error_roundtrip() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let route_src = KeyPair::generate();
        let route_dst = KeyPair::generate();
        let mut error = RouteError::new(node(&src), node(&dst), node(&route_src), node(&route_dst));
        error.sign(&src);
        let message = Message::Error(error);
        let decoded = decode(&encode(&message)).expect("decode");
        assert_eq!(decoded, message);
        assert!(decoded.verify());
    }

    #[test]
    fn test_frame_layout() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let message = signed_data(&src, &dst, b"x");
        let frame = encode(&message);
        assert_eq!(&frame[..32], src.verifying_key().as_bytes());
        assert_eq!(&frame[32..64], dst.verifying_key().as_bytes());
        assert_eq!(frame[64], TAG_DATA);
        assert_eq!(&frame[65..77], &[0x07u8; 12]);
        assert_eq!(&frame[77..79], &[0x00, 0x01]);
        assert_eq!(frame.len(), HEADER_LENGTH + DATA_BODY_LENGTH + 1);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let mut frame = encode(&signed_data(&src, &dst, b"x"));
        frame[2 * PUBKEY_LENGTH] = 0x7F;
        assert_eq!(decode(&frame), Err(DecodeError::UnknownKind(0x7F)));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let err = decode(&[0u8; 12]).expect_err("must fail");
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn test_truncated_body_rejected() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let mut response = RouteResponse::new(node(&src), node(&dst), x25519_pub(), x25519_pub());
        response.sign(&src);
        let frame = encode(&Message::Response(response));
        let err = decode(&frame[..frame.len() - 1]).expect_err("must fail");
        assert_eq!(
            err,
            DecodeError::Truncated {
                expected: HEADER_LENGTH + RESPONSE_BODY_LENGTH,
                actual: frame.len() - 1,
            }
        );
    }

    #[test]
    fn test_length_field_is_informational() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        // length says 1 byte, payload carries 4; the decoder must not truncate.
        let mut data = NetworkData::new(
            node(&src),
            node(&dst),
            [0u8; NONCE_LENGTH],
            1,
            vec![1, 2, 3, 4],
        );
        data.sign(&src);
        let decoded = decode(&encode(&Message::Data(data))).expect("decode");
        if let Message::Data(data) = decoded {
            assert_eq!(data.length, 1);
            assert_eq!(data.payload, vec![1, 2, 3, 4]);
        } else {
            unreachable!("decoded variant must be Data");
        }
    }

    #[test]
    fn test_unsigned_message_encodes_zero_signature() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let data = NetworkData::new(node(&src), node(&dst), [0u8; NONCE_LENGTH], 0, vec![]);
        let frame = encode(&Message::Data(data));
        assert_eq!(&frame[79..143], &[0u8; SIGNATURE_LENGTH]);
        let decoded = decode(&frame).expect("decode");
        assert!(!decoded.verify(), "zeroed signature must not verify");
    }

    /// Bytes that fail Ed25519 point decompression.
    fn invalid_key_bytes() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for b in 0..=255u8 {
            bytes[0] = b;
            if KnownNode::from_bytes(&bytes).is_err() {
                return bytes;
            }
        }
        unreachable!("some low y-coordinate must fail decompression")
    }

    #[test]
    fn test_invalid_source_key_rejected() {
        let src = KeyPair::generate();
        let dst = KeyPair::generate();
        let mut frame = encode(&signed_data(&src, &dst, b"x"));
        frame[..32].copy_from_slice(&invalid_key_bytes());
        assert_eq!(decode(&frame), Err(DecodeError::InvalidKey));
    }
}
