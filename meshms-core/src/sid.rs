//! Participant and bundle identifiers.
use std::fmt;
use std::str::FromStr;

use crate::error::MeshmsError;

const SID_BYTES: usize = 32;
const BID_BYTES: usize = 32;

/// Long-term public key identifying a MeshMS participant.
///
/// Total order is lexicographic byte compare, which is what the
/// conversation index relies on to keep its entries sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sid([u8; SID_BYTES]);

/// Opaque content-addressed bundle identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bid([u8; BID_BYTES]);

macro_rules! hex_id {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const BYTES: usize = $len;

            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = MeshmsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s).map_err(|_| MeshmsError::InvalidHex(s.to_owned()))?;
                let array: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| MeshmsError::InvalidHex(s.to_owned()))?;
                Ok(Self(array))
            }
        }
    };
}

hex_id!(Sid, SID_BYTES);
hex_id!(Bid, BID_BYTES);
