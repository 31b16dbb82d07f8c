//! The synchroniser (spec §4.F): reconciles local cursors against the store
//! and appends ACK records so the peer learns what has been received.
use crate::config::MeshmsConfig;
use crate::conversation::{Conversation, ConversationIndex, PlyDescriptor};
use crate::error::{MeshmsError, Result};
use crate::ply::{PlyRead, PlyReader};
use crate::record::{decode_ack_payload, encode_ack_payload, RecordType};
use crate::sid::{Bid, Sid};
use crate::store::{BundleStore, FinaliseStatus, Keyring, Manifest, SERVICE_MESHMS2};

/// Outcome of one synchroniser pass over a single conversation.
///
/// The original mixes `{-1, 0, 1}` return codes where `1` means "dirty";
/// kept as a sum type here so a stale-but-successful pass (`Dirty`, the
/// cursor needs persisting) can never be confused with a hard failure.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Nothing changed; the persisted cursor is already current.
    Clean,
    /// The conversation's cursors advanced; the caller should persist them.
    Dirty,
    Failed(MeshmsError),
}

/// Runs the synchroniser over a single conversation (spec §4.F steps 1-7).
pub fn synchronise_conversation(
    store: &dyn BundleStore,
    keyring: &dyn Keyring,
    config: &MeshmsConfig,
    my_sid: &Sid,
    conv: &mut Conversation,
) -> SyncOutcome {
    match synchronise_conversation_inner(store, keyring, config, my_sid, conv) {
        Ok(outcome) => outcome,
        Err(e) => SyncOutcome::Failed(e),
    }
}

/// Runs the synchroniser over every conversation in `index`, in SID order
/// (spec §5: "the synchroniser walks the index in infix order").
pub fn synchronise_all(
    store: &dyn BundleStore,
    keyring: &dyn Keyring,
    config: &MeshmsConfig,
    my_sid: &Sid,
    index: &mut ConversationIndex,
) -> Vec<SyncOutcome> {
    index
        .iter_mut()
        .map(|conv| synchronise_conversation(store, keyring, config, my_sid, conv))
        .collect()
}

fn synchronise_conversation_inner(
    store: &dyn BundleStore,
    keyring: &dyn Keyring,
    config: &MeshmsConfig,
    my_sid: &Sid,
    conv: &mut Conversation,
) -> Result<SyncOutcome> {
    let Some(their_ply) = conv.their_ply else {
        return Ok(SyncOutcome::Clean);
    };
    if conv.their_size == their_ply.size {
        return Ok(SyncOutcome::Clean);
    }

    let mut their_reader = PlyReader::open(store, &their_ply.bid)?;
    match their_reader.find_prev(RecordType::Message)? {
        PlyRead::EndOfPly => {
            // Nothing to acknowledge yet; don't touch their_size so the next
            // pass re-checks once a message actually lands.
            return Ok(SyncOutcome::Clean);
        }
        PlyRead::Record => {
            conv.their_last_message = their_reader.record_end_offset;
        }
    }

    let previous_ack = match conv.my_ply {
        Some(my_ply) => {
            let mut my_reader = PlyReader::open(store, &my_ply.bid)?;
            match my_reader.find_prev(RecordType::Ack)? {
                PlyRead::Record => decode_ack_payload(my_reader.record())
                    .map(|(ack_offset, _)| ack_offset)
                    .unwrap_or(0),
                PlyRead::EndOfPly => 0,
            }
        }
        None => 0,
    };

    let dirty = if previous_ack >= conv.their_last_message {
        true
    } else {
        let payload = encode_ack_payload(conv.their_last_message, Some(previous_ack).filter(|p| *p != 0));
        if config.debug_logging {
            log::debug!(
                "acking {} up to {} (previous {}) for {}",
                their_ply.bid,
                conv.their_last_message,
                previous_ack,
                conv.them
            );
        }
        append_to_my_ply(store, keyring, my_sid, conv, RecordType::Ack, &payload)?;
        true
    };

    conv.their_size = their_ply.size;
    Ok(if dirty { SyncOutcome::Dirty } else { SyncOutcome::Clean })
}

/// Sends a text message to `conv.them`, creating `conv.my_ply` first if this
/// is the first outgoing message in the conversation. Shares the append
/// procedure with the synchroniser's ACK path (spec §4.F "Appending to
/// my_ply" is written generically over the record being appended).
pub fn send_message(
    store: &dyn BundleStore,
    keyring: &dyn Keyring,
    my_sid: &Sid,
    conv: &mut Conversation,
    text: &str,
) -> Result<()> {
    let mut payload = text.as_bytes().to_vec();
    payload.push(0);
    append_to_my_ply(store, keyring, my_sid, conv, RecordType::Message, &payload)
}

/// Appends a record to `conv.my_ply`, creating the ply first if this
/// conversation has never sent anything (spec §4.F "Appending to my_ply").
pub fn append_to_my_ply(
    store: &dyn BundleStore,
    keyring: &dyn Keyring,
    my_sid: &Sid,
    conv: &mut Conversation,
    record_type: RecordType,
    payload: &[u8],
) -> Result<()> {
    let mut manifest = match conv.my_ply {
        Some(descriptor) => store.retrieve_manifest(&descriptor.bid)?,
        None => create_my_ply(store, my_sid, conv.them)?,
    };

    if !keyring.authenticate_author(&manifest) {
        return Err(MeshmsError::InvalidManifest(format!(
            "author of ply {} is not authentic",
            manifest.bid
        )));
    }

    let mut buf = Vec::new();
    crate::record::append_record(&mut buf, record_type, payload);
    store.append_journal(&mut manifest, &buf)?;

    match store.finalise(&mut manifest)? {
        FinaliseStatus::New => {
            conv.my_ply = Some(PlyDescriptor {
                bid: manifest.bid,
                version: manifest.version,
                tail: manifest.tail,
                size: manifest.filesize.unwrap_or(0),
            });
            Ok(())
        }
        FinaliseStatus::Same | FinaliseStatus::Duplicate | FinaliseStatus::Old => {
            let local = manifest.version;
            let store_version = store
                .retrieve_manifest(&manifest.bid)
                .map(|m| m.version)
                .unwrap_or(local);
            Err(MeshmsError::Gazumped {
                local,
                store: store_version,
            })
        }
        status @ (FinaliseStatus::Inconsistent | FinaliseStatus::Fake | FinaliseStatus::Invalid) => {
            log::error!("ply {} finalise reported {:?}", manifest.bid, status);
            Err(MeshmsError::StoreInconsistent(format!("{status:?}")))
        }
        FinaliseStatus::Error => Err(MeshmsError::StoreInconsistent("finalise reported ERROR".into())),
    }
}

/// Builds and fills a brand-new ply manifest for `my_sid -> them` (spec
/// §4.F "Creating my_ply"). The zero BID is a core-local placeholder the
/// store is expected to replace in `fill_manifest`.
fn create_my_ply(store: &dyn BundleStore, my_sid: &Sid, them: Sid) -> Result<Manifest> {
    let mut manifest = Manifest {
        bid: Bid::from_bytes([0u8; 32]),
        version: 0,
        service: SERVICE_MESHMS2.to_owned(),
        sender: *my_sid,
        recipient: them,
        filesize: Some(0),
        tail: 0,
        payload_encrypted: true,
        has_secret: false,
        author_authentic: false,
    };
    store.fill_manifest(&mut manifest, my_sid)?;
    Ok(manifest)
}
