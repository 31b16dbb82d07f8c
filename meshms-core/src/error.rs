//! Error kinds surfaced by the MeshMS core (spec §7).
use thiserror::Error;

use crate::sid::{Bid, Sid};

#[derive(Debug, Error)]
pub enum MeshmsError {
    #[error("SID not found in keyring: {0}")]
    NotFound(Sid),

    #[error("bundle {0} not found in store")]
    BundleNotFound(Bid),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("ply truncated mid-record")]
    Truncated,

    #[error("finalise gazumped by a concurrent writer (local version {local}, store version {store})")]
    Gazumped { local: u64, store: u64 },

    #[error("store reported inconsistent bundle: {0}")]
    StoreInconsistent(String),

    #[error("malformed ACK payload")]
    MalformedAck,

    #[error("invalid hex value: {0}")]
    InvalidHex(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MeshmsError>;
