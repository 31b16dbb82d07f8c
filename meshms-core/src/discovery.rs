//! Enumerate conversations from the bundle store (spec §4.E).
use crate::conversation::{ConversationIndex, PlyDescriptor};
use crate::error::Result;
use crate::sid::Sid;
use crate::store::BundleStore;

/// Queries the store for every MeshMS2 manifest involving `my_sid` (and, if
/// `peer` is given, restricted to that peer), folding each row into `index`.
///
/// Rows whose sender/recipient can't be classified are skipped with a
/// warning rather than aborting the whole scan — discovery is best-effort,
/// exactly as spec §4.E specifies.
pub fn discover_conversations(
    store: &dyn BundleStore,
    my_sid: &Sid,
    peer: Option<&Sid>,
    index: &mut ConversationIndex,
) -> Result<()> {
    let peer_or_self = peer.unwrap_or(my_sid);
    let rows = store.query_meshms_manifests(my_sid, peer_or_self)?;
    for row in rows {
        let them = if &row.recipient == my_sid {
            row.sender
        } else if &row.sender == my_sid {
            row.recipient
        } else {
            log::warn!(
                "manifest {} names neither sender nor recipient as {} -- skipping",
                row.bid,
                my_sid
            );
            continue;
        };

        let descriptor = PlyDescriptor {
            bid: row.bid,
            version: row.version,
            tail: row.tail,
            size: row.size,
        };

        let conv = index.get_or_create(them);
        if row.recipient == *my_sid {
            conv.their_ply = Some(descriptor);
        } else {
            conv.my_ply = Some(descriptor);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshms_mock::MockStore;

    #[test]
    fn discovery_assigns_plies_by_direction() {
        let store = MockStore::new();
        let alice = store.add_identity();
        let bob = store.add_identity();
        store.seed_ply(alice, bob, b"hello");
        store.seed_ply(bob, alice, b"hi back");

        let mut index = ConversationIndex::new();
        discover_conversations(&store, &alice, None, &mut index).unwrap();

        let conv = index.get(&bob).unwrap();
        assert!(conv.found_my_ply());
        assert!(conv.found_their_ply());
    }
}
