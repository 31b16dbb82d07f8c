//! The bundle-store and keyring contract the core is built against
//! (spec §6). Both the store itself and authorship checking are out of
//! scope for this crate; `meshms-mock` supplies an in-memory
//! implementation used by the integration tests.

use crate::error::Result;
use crate::sid::{Bid, Sid};

pub const SERVICE_MESHMS2: &str = "MeshMS2";
pub const SERVICE_FILE: &str = "file";

/// A ply or conversation-bundle manifest as retrieved from, or about to be
/// written to, the store. Field names mirror spec §3/§6 directly.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub bid: Bid,
    pub version: u64,
    pub service: String,
    pub sender: Sid,
    pub recipient: Sid,
    pub filesize: Option<u64>,
    pub tail: u64,
    pub payload_encrypted: bool,
    pub has_secret: bool,
    pub author_authentic: bool,
}

/// One row of `query_meshms_manifests`.
#[derive(Debug, Clone)]
pub struct QueryRow {
    pub bid: Bid,
    pub version: u64,
    pub size: u64,
    pub tail: u64,
    pub sender: Sid,
    pub recipient: Sid,
}

/// The keypair backing a local SID, as returned by `Keyring::find_sid`.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub sid: Sid,
    pub secret_key_hex: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadStatus {
    Stored,
    Empty,
    /// The manifest exists but no payload has been stored for it yet.
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStatus {
    New,
    Same,
    Duplicate,
    Old,
    Inconsistent,
    Fake,
    Invalid,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinaliseStatus {
    New,
    Same,
    Duplicate,
    Old,
    Error,
    Inconsistent,
    Fake,
    Invalid,
}

/// An in-progress write of a payload (spec §6's `open_write`/`write`/`finish`/`fail`).
///
/// `finish` only stages the payload; per spec §6 the store's `finalise` is
/// the single commit step shared by both the append path and this
/// from-scratch rewrite path, and is what actually resolves a version race.
pub trait PayloadWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<()>;
    fn fail(self: Box<Self>);
}

/// The bundle store contract MeshMS is built against. See spec §6.
pub trait BundleStore {
    fn query_meshms_manifests(&self, my_sid: &Sid, peer_or_self: &Sid) -> Result<Vec<QueryRow>>;

    fn retrieve_manifest(&self, bid: &Bid) -> Result<Manifest>;

    /// Opens a decrypting reader over the manifest's payload. Per spec §9's
    /// design note, the whole payload is returned up front rather than
    /// handed back as a streaming reader — plies are small, and this avoids
    /// needing a seekable decrypting stream for tail-first reads.
    fn open_decrypting_reader(&self, manifest: &Manifest) -> Result<(PayloadStatus, Vec<u8>)>;

    fn append_journal(&self, manifest: &mut Manifest, bytes: &[u8]) -> Result<AppendStatus>;

    fn open_write(&self, manifest: &Manifest) -> Result<Box<dyn PayloadWriter>>;

    fn new_manifest_from_seed(&self, seed: &str) -> Result<Manifest>;

    fn fill_manifest(&self, manifest: &mut Manifest, author: &Sid) -> Result<()>;

    fn finalise(&self, manifest: &mut Manifest) -> Result<FinaliseStatus>;
}

/// The keyring contract MeshMS is built against. See spec §6.
pub trait Keyring {
    fn find_sid(&self, sid: &Sid) -> Option<KeyPair>;

    fn authenticate_author(&self, manifest: &Manifest) -> bool;
}
