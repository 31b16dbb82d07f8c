//! The conversation bundle (spec §4.H): a private, self-addressed bundle
//! holding the owner's persisted conversation cursors, so the index survives
//! between runs without needing a full ply rescan.
use crate::config::MeshmsConfig;
use crate::conversation::ConversationIndex;
use crate::error::{MeshmsError, Result};
use crate::sid::Sid;
use crate::store::{BundleStore, FinaliseStatus, Keyring, Manifest, PayloadStatus, SERVICE_FILE};
use crate::varint;

const VERSION_BYTE: u8 = 0x01;

/// Derives the conversation bundle's deterministic seed string from the
/// owning SID's secret key (spec §4.H "Derivation").
pub fn conversation_bundle_seed(config: &MeshmsConfig, secret_key_hex: &str) -> String {
    format!(
        "{}{}{}",
        config.conversation_bundle_seed_prefix, secret_key_hex, config.conversation_bundle_seed_suffix
    )
}

/// Locates (or creates) `my_sid`'s conversation bundle.
///
/// The service-tag check on an existing bundle is tolerant: a non-`file`
/// service is logged rather than rejected, but `file` is always what gets
/// written back, per spec §9's resolution of the `get_my_conversation_bundle`
/// open question.
pub fn open_conversation_bundle(
    store: &dyn BundleStore,
    keyring: &dyn Keyring,
    config: &MeshmsConfig,
    my_sid: &Sid,
) -> Result<Manifest> {
    let keypair = keyring.find_sid(my_sid).ok_or(MeshmsError::NotFound(*my_sid))?;
    let seed = conversation_bundle_seed(config, &keypair.secret_key_hex);
    let mut manifest = store.new_manifest_from_seed(&seed)?;
    manifest.payload_encrypted = true;

    if manifest.service != SERVICE_FILE {
        if !manifest.service.is_empty() {
            log::warn!(
                "conversation bundle {} has service {:?}, expected {:?}",
                manifest.bid,
                manifest.service,
                SERVICE_FILE
            );
        }
        manifest.service = SERVICE_FILE.to_owned();
        manifest.sender = *my_sid;
        manifest.recipient = *my_sid;
        store.fill_manifest(&mut manifest, my_sid)?;
    }
    Ok(manifest)
}

/// Deserialises the conversation index from a bundle's payload (spec §4.H
/// "Read"). Malformed trailing data stops the scan silently rather than
/// erroring: the persisted index is advisory and can always be rebuilt by
/// discovery, so a truncated tail should not discard the entries that did
/// parse.
pub fn read_known_conversations(store: &dyn BundleStore, manifest: &Manifest) -> Result<ConversationIndex> {
    let mut index = ConversationIndex::new();
    let (status, payload) = store.open_decrypting_reader(manifest)?;
    if status == PayloadStatus::New || payload.is_empty() {
        return Ok(index);
    }
    if payload[0] != VERSION_BYTE {
        return Err(MeshmsError::InvalidPayload(format!(
            "conversation bundle {} has unknown version byte {:#x}",
            manifest.bid, payload[0]
        )));
    }

    let mut offset = 1usize;
    while offset < payload.len() {
        if offset + Sid::BYTES > payload.len() {
            break;
        }
        let mut sid_bytes = [0u8; 32];
        sid_bytes.copy_from_slice(&payload[offset..offset + Sid::BYTES]);
        let them = Sid::from_bytes(sid_bytes);
        let mut cursor = offset + Sid::BYTES;

        let Some((their_last_message, read_offset, their_size, consumed)) = unpack_three(&payload[cursor..]) else {
            break;
        };
        cursor += consumed;

        let conv = index.get_or_create(them);
        conv.their_last_message = their_last_message;
        conv.read_offset = read_offset;
        conv.their_size = their_size;
        offset = cursor;
    }
    Ok(index)
}

fn unpack_three(buf: &[u8]) -> Option<(u64, u64, u64, usize)> {
    let (their_last_message, n1) = varint::unpack(buf).ok()?;
    let (read_offset, n2) = varint::unpack(&buf[n1..]).ok()?;
    let (their_size, n3) = varint::unpack(&buf[n1 + n2..]).ok()?;
    Some((their_last_message, read_offset, their_size, n1 + n2 + n3))
}

/// Serialises `index` and commits it as `manifest`'s payload (spec §4.H
/// "Write"). Status handling mirrors the synchroniser's append path
/// (§4.F): a losing finalise is reported as `Gazumped`, never retried.
pub fn write_known_conversations(
    store: &dyn BundleStore,
    manifest: &mut Manifest,
    index: &ConversationIndex,
) -> Result<()> {
    let mut payload = vec![VERSION_BYTE];
    for conv in index.iter() {
        payload.extend_from_slice(conv.them.as_bytes());
        varint::pack(conv.their_last_message, &mut payload);
        varint::pack(conv.read_offset, &mut payload);
        varint::pack(conv.their_size, &mut payload);
    }

    let mut writer = store.open_write(manifest)?;
    writer.write_all(&payload)?;
    writer.finish()?;

    match store.finalise(manifest)? {
        FinaliseStatus::New => Ok(()),
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
            log::error!("conversation bundle {} finalise reported {:?}", manifest.bid, status);
            Err(MeshmsError::StoreInconsistent(format!("{status:?}")))
        }
        FinaliseStatus::Error => Err(MeshmsError::StoreInconsistent("finalise reported ERROR".into())),
    }
}
