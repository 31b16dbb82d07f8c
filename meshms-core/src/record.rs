//! Ply record framing (spec §4.B): payload bytes followed by a two-byte,
//! big-endian footer encoding `(record_length << 4) | (type & 0xF)`.
use byteorder::{BigEndian, ByteOrder};

use crate::error::{MeshmsError, Result};
use crate::varint;

pub const FOOTER_LEN: usize = 2;

/// Record types a ply payload can carry. `BidReference` is reserved by the
/// spec and never produced by this crate, but it still round-trips through
/// the footer codec so a reader doesn't choke on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Ack,
    Message,
    BidReference,
}

impl RecordType {
    fn as_nibble(self) -> u8 {
        match self {
            RecordType::Ack => 0x1,
            RecordType::Message => 0x2,
            RecordType::BidReference => 0x3,
        }
    }
}

impl TryFrom<u8> for RecordType {
    type Error = MeshmsError;

    fn try_from(nibble: u8) -> Result<Self> {
        match nibble & 0xF {
            0x1 => Ok(RecordType::Ack),
            0x2 => Ok(RecordType::Message),
            0x3 => Ok(RecordType::BidReference),
            other => Err(MeshmsError::InvalidPayload(format!(
                "unknown record type nibble {other:#x}"
            ))),
        }
    }
}

/// Appends `payload` to `buf` followed by its footer, returning the total
/// number of bytes written (payload + footer).
pub fn append_record(buf: &mut Vec<u8>, record_type: RecordType, payload: &[u8]) -> usize {
    buf.extend_from_slice(payload);
    let footer = ((payload.len() as u16) << 4) | (record_type.as_nibble() as u16);
    let mut footer_bytes = [0u8; FOOTER_LEN];
    BigEndian::write_u16(&mut footer_bytes, footer);
    buf.extend_from_slice(&footer_bytes);
    payload.len() + FOOTER_LEN
}

/// Decodes a two-byte footer into `(type, record_length)`.
pub fn decode_footer(bytes: [u8; FOOTER_LEN]) -> Result<(RecordType, u16)> {
    let word = BigEndian::read_u16(&bytes);
    let record_type = RecordType::try_from((word & 0xF) as u8)?;
    Ok((record_type, word >> 4))
}

/// Encodes an ACK record payload: `ack_offset`, followed by `delta` (the
/// distance back to the previously acknowledged offset) when there was a
/// previous ACK to measure from.
pub fn encode_ack_payload(ack_offset: u64, previous_ack: Option<u64>) -> Vec<u8> {
    let mut buf = Vec::new();
    varint::pack(ack_offset, &mut buf);
    if let Some(previous) = previous_ack {
        varint::pack(ack_offset - previous, &mut buf);
    }
    buf
}

/// Decodes an ACK record payload into `(ack_offset, delta)`. `delta` is
/// `None` when the payload carries only `ack_offset` (the sender's first
/// ACK on this ply).
pub fn decode_ack_payload(payload: &[u8]) -> Result<(u64, Option<u64>)> {
    let (ack_offset, consumed) = varint::unpack(payload).map_err(|_| MeshmsError::MalformedAck)?;
    if consumed == payload.len() {
        return Ok((ack_offset, None));
    }
    let (delta, _) = varint::unpack(&payload[consumed..]).map_err(|_| MeshmsError::MalformedAck)?;
    Ok((ack_offset, Some(delta)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_record_round_trips() {
        let mut buf = Vec::new();
        let written = append_record(&mut buf, RecordType::Message, b"hi\0");
        assert_eq!(written, 5);
        assert_eq!(buf.len(), 5);
        let footer = [buf[3], buf[4]];
        let (record_type, len) = decode_footer(footer).unwrap();
        assert_eq!(record_type, RecordType::Message);
        assert_eq!(len, 3);
    }

    #[test]
    fn ack_footer_matches_spec_example() {
        // S2 in spec §8: ack payload of 1 byte -> footer 0x11.
        let mut buf = Vec::new();
        append_record(&mut buf, RecordType::Ack, &[5u8]);
        assert_eq!(&buf[1..], &[0x00, 0x11]);
    }

    #[test]
    fn unknown_type_nibble_is_rejected() {
        assert!(decode_footer([0x00, 0x04]).is_err());
    }

    #[test]
    fn first_ack_has_no_delta() {
        let payload = encode_ack_payload(5, None);
        let (ack_offset, delta) = decode_ack_payload(&payload).unwrap();
        assert_eq!(ack_offset, 5);
        assert_eq!(delta, None);
    }

    #[test]
    fn second_ack_encodes_delta_from_previous() {
        let payload = encode_ack_payload(12, Some(5));
        let (ack_offset, delta) = decode_ack_payload(&payload).unwrap();
        assert_eq!(ack_offset, 12);
        assert_eq!(delta, Some(7));
    }

    #[test]
    fn malformed_ack_payload_is_rejected() {
        assert!(decode_ack_payload(&[0x80]).is_err());
    }
}
