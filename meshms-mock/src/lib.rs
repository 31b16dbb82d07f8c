//! In-memory implementation of `meshms_core`'s `BundleStore`/`Keyring`
//! traits, standing in for Rhizome and the keyring in tests.
//!
//! Grounded on `bkase-gbx`'s `mock` crate: a workspace member whose only
//! job is satisfying another crate's trait boundary under test, kept out
//! of the library it's testing.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sha2::{Digest, Sha256};

use meshms_core::error::{MeshmsError, Result};
use meshms_core::record::{append_record, RecordType};
use meshms_core::sid::{Bid, Sid};
use meshms_core::store::{
    AppendStatus, BundleStore, FinaliseStatus, KeyPair, Keyring, Manifest, PayloadStatus,
    PayloadWriter, QueryRow, SERVICE_MESHMS2,
};

#[derive(Clone)]
struct StoredBundle {
    manifest: Manifest,
    payload: Vec<u8>,
}

enum Pending {
    Append(Vec<u8>),
    Replace(Vec<u8>),
}

#[derive(Default)]
struct State {
    bundles: HashMap<Bid, StoredBundle>,
    staging: HashMap<(Bid, u64), Pending>,
    keyring: HashMap<Sid, KeyPair>,
    counter: u64,
}

/// An in-memory Rhizome-and-keyring stand-in. Cheap to clone (an `Rc`
/// handle); every clone shares the same underlying state, the way a real
/// store handle would.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Rc<RefCell<State>>,
}

fn hash_to_bid(parts: &[&[u8]]) -> Bid {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest[..32]);
    Bid::from_bytes(bytes)
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh identity with a deterministic keypair and adds it to
    /// the keyring, returning its SID.
    pub fn add_identity(&self) -> Sid {
        let mut state = self.state.borrow_mut();
        let n = state.counter;
        state.counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(b"meshms-mock-identity");
        hasher.update(n.to_le_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest[..32]);
        let sid = Sid::from_bytes(bytes);
        state.keyring.insert(
            sid,
            KeyPair {
                sid,
                secret_key_hex: hex::encode(n.to_le_bytes()),
            },
        );
        sid
    }

    /// Test convenience: seeds a stored ply containing one MESSAGE record,
    /// as if `sender` had already sent `message` to `recipient` before this
    /// test run started (used to exercise discovery without going through
    /// the synchroniser).
    pub fn seed_ply(&self, sender: Sid, recipient: Sid, message: &[u8]) -> Bid {
        let mut state = self.state.borrow_mut();
        let n = state.counter;
        state.counter += 1;
        let bid = hash_to_bid(&[b"ply", sender.as_bytes(), recipient.as_bytes(), &n.to_le_bytes()]);
        let mut payload = Vec::new();
        let mut text = message.to_vec();
        text.push(0);
        append_record(&mut payload, RecordType::Message, &text);
        let manifest = Manifest {
            bid,
            version: 1,
            service: SERVICE_MESHMS2.to_owned(),
            sender,
            recipient,
            filesize: Some(payload.len() as u64),
            tail: 0,
            payload_encrypted: true,
            has_secret: true,
            author_authentic: true,
        };
        state.bundles.insert(
            bid,
            StoredBundle {
                manifest,
                payload,
            },
        );
        bid
    }

    /// Directly read back a stored payload, for assertions in tests.
    pub fn payload_of(&self, bid: &Bid) -> Option<Vec<u8>> {
        self.state.borrow().bundles.get(bid).map(|b| b.payload.clone())
    }
}

struct MockWriter {
    state: Rc<RefCell<State>>,
    bid: Bid,
    base_version: u64,
    buffer: Vec<u8>,
}

impl PayloadWriter for MockWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.state
            .borrow_mut()
            .staging
            .insert((self.bid, self.base_version), Pending::Replace(self.buffer));
        Ok(())
    }

    fn fail(self: Box<Self>) {
        // Nothing was staged under the caller's name, so failing is a no-op.
    }
}

impl BundleStore for MockStore {
    fn query_meshms_manifests(&self, my_sid: &Sid, peer_or_self: &Sid) -> Result<Vec<QueryRow>> {
        let state = self.state.borrow();
        let rows = state
            .bundles
            .values()
            .filter(|b| b.manifest.service == SERVICE_MESHMS2)
            .filter(|b| &b.manifest.sender == my_sid || &b.manifest.recipient == my_sid)
            .filter(|b| &b.manifest.sender == peer_or_self || &b.manifest.recipient == peer_or_self)
            .map(|b| QueryRow {
                bid: b.manifest.bid,
                version: b.manifest.version,
                size: b.manifest.filesize.unwrap_or(0),
                tail: b.manifest.tail,
                sender: b.manifest.sender,
                recipient: b.manifest.recipient,
            })
            .collect();
        Ok(rows)
    }

    fn retrieve_manifest(&self, bid: &Bid) -> Result<Manifest> {
        self.state
            .borrow()
            .bundles
            .get(bid)
            .map(|b| b.manifest.clone())
            .ok_or_else(|| MeshmsError::BundleNotFound(*bid))
    }

    fn open_decrypting_reader(&self, manifest: &Manifest) -> Result<(PayloadStatus, Vec<u8>)> {
        let state = self.state.borrow();
        match state.bundles.get(&manifest.bid) {
            Some(stored) if stored.payload.is_empty() => Ok((PayloadStatus::Empty, Vec::new())),
            Some(stored) => Ok((PayloadStatus::Stored, stored.payload.clone())),
            None => Ok((PayloadStatus::New, Vec::new())),
        }
    }

    fn append_journal(&self, manifest: &mut Manifest, bytes: &[u8]) -> Result<AppendStatus> {
        self.state
            .borrow_mut()
            .staging
            .insert((manifest.bid, manifest.version), Pending::Append(bytes.to_vec()));
        Ok(AppendStatus::New)
    }

    fn open_write(&self, manifest: &Manifest) -> Result<Box<dyn PayloadWriter>> {
        Ok(Box::new(MockWriter {
            state: Rc::clone(&self.state),
            bid: manifest.bid,
            base_version: manifest.version,
            buffer: Vec::new(),
        }))
    }

    fn new_manifest_from_seed(&self, seed: &str) -> Result<Manifest> {
        let bid = hash_to_bid(&[b"seed", seed.as_bytes()]);
        let state = self.state.borrow();
        if let Some(stored) = state.bundles.get(&bid) {
            return Ok(stored.manifest.clone());
        }
        let placeholder = Sid::from_bytes([0u8; 32]);
        Ok(Manifest {
            bid,
            version: 0,
            service: String::new(),
            sender: placeholder,
            recipient: placeholder,
            filesize: None,
            tail: 0,
            payload_encrypted: false,
            has_secret: true,
            author_authentic: true,
        })
    }

    fn fill_manifest(&self, manifest: &mut Manifest, author: &Sid) -> Result<()> {
        let state = self.state.borrow();
        if !state.keyring.contains_key(author) {
            return Err(MeshmsError::NotFound(*author));
        }
        drop(state);
        if manifest.bid == Bid::from_bytes([0u8; 32]) {
            let mut state = self.state.borrow_mut();
            let n = state.counter;
            state.counter += 1;
            manifest.bid = hash_to_bid(&[b"fill", author.as_bytes(), &n.to_le_bytes()]);
        }
        manifest.has_secret = true;
        manifest.payload_encrypted = true;
        manifest.author_authentic = true;
        Ok(())
    }

    fn finalise(&self, manifest: &mut Manifest) -> Result<FinaliseStatus> {
        let mut state = self.state.borrow_mut();
        let current_version = state.bundles.get(&manifest.bid).map(|b| b.manifest.version).unwrap_or(0);
        if manifest.version != current_version {
            log::warn!(
                "finalise gazumped for {}: local version {}, store version {}",
                manifest.bid,
                manifest.version,
                current_version
            );
            return Ok(FinaliseStatus::Old);
        }
        let pending = state.staging.remove(&(manifest.bid, manifest.version));
        let base_payload = state
            .bundles
            .get(&manifest.bid)
            .map(|b| b.payload.clone())
            .unwrap_or_default();
        let new_payload = match pending {
            Some(Pending::Append(bytes)) => {
                let mut payload = base_payload;
                payload.extend_from_slice(&bytes);
                payload
            }
            Some(Pending::Replace(bytes)) => bytes,
            None => base_payload,
        };
        let new_version = current_version + 1;
        manifest.version = new_version;
        manifest.filesize = Some(new_payload.len() as u64);
        state.bundles.insert(
            manifest.bid,
            StoredBundle {
                manifest: manifest.clone(),
                payload: new_payload,
            },
        );
        Ok(FinaliseStatus::New)
    }
}

impl Keyring for MockStore {
    fn find_sid(&self, sid: &Sid) -> Option<KeyPair> {
        self.state.borrow().keyring.get(sid).cloned()
    }

    fn authenticate_author(&self, manifest: &Manifest) -> bool {
        self.state.borrow().keyring.contains_key(&manifest.sender)
    }
}
