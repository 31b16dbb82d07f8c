//! Self-delimiting unsigned varint codec (spec §4.A).
//!
//! Encoding is LEB128: seven payload bits per byte, continuation bit in the
//! MSB. The spec leaves the concrete scheme open ("any unambiguous,
//! self-delimiting, monotone encoding"); LEB128 is what the rest of the
//! ecosystem reaches for, and it keeps `pack`/`unpack`/`measure` trivial to
//! keep in agreement.

use crate::error::{MeshmsError, Result};

/// Appends the varint encoding of `value` to `buf`, returning the number of
/// bytes written.
pub fn pack(value: u64, buf: &mut Vec<u8>) -> usize {
    let mut v = value;
    let mut written = 0;
    loop {
        let mut byte = (v & 0x7F) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        written += 1;
        if v == 0 {
            break;
        }
    }
    written
}

/// Number of bytes `pack(value, ..)` would write, without writing them.
pub fn measure(value: u64) -> usize {
    let mut v = value;
    let mut len = 1;
    while v >= 0x80 {
        v >>= 7;
        len += 1;
    }
    len
}

/// Decodes a varint from the start of `buf`, returning the value and the
/// number of bytes consumed.
///
/// Fails if `buf` ends before a terminating byte is found, or if the
/// encoded value would overflow 64 bits.
pub fn unpack(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= 10 {
            return Err(MeshmsError::InvalidPayload("varint overflows u64".into()));
        }
        let bits = (byte & 0x7F) as u64;
        let shift = i * 7;
        if i == 9 && (bits >> (64 - shift)) != 0 {
            return Err(MeshmsError::InvalidPayload("varint overflows u64".into()));
        }
        value |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(MeshmsError::InvalidPayload(
        "varint buffer truncated".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_round_trips() {
        let mut buf = Vec::new();
        let written = pack(0, &mut buf);
        assert_eq!(written, 1);
        assert_eq!(measure(0), 1);
        let (value, read) = unpack(&buf).unwrap();
        assert_eq!(value, 0);
        assert_eq!(read, written);
    }

    #[test]
    fn max_value_round_trips() {
        let mut buf = Vec::new();
        pack(u64::MAX, &mut buf);
        let (value, read) = unpack(&buf).unwrap();
        assert_eq!(value, u64::MAX);
        assert_eq!(read, buf.len());
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut buf = Vec::new();
        pack(1_000_000, &mut buf);
        buf.truncate(buf.len() - 1);
        assert!(unpack(&buf).is_err());
    }

    proptest! {
        #[test]
        fn pack_unpack_is_identity(value: u64) {
            let mut buf = Vec::new();
            let written = pack(value, &mut buf);
            prop_assert_eq!(written, measure(value));
            let (decoded, read) = unpack(&buf).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(read, written);
        }

        #[test]
        fn unpack_ignores_trailing_bytes(value: u64, extra in proptest::collection::vec(any::<u8>(), 0..8)) {
            let mut buf = Vec::new();
            let written = pack(value, &mut buf);
            buf.extend_from_slice(&extra);
            let (decoded, read) = unpack(&buf).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(read, written);
        }
    }
}
