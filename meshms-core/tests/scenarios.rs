//! The six literal end-to-end scenarios a MeshMS exchange must satisfy,
//! run against the in-memory mock store.
use meshms_core::bundle::{open_conversation_bundle, read_known_conversations, write_known_conversations};
use meshms_core::config::MeshmsConfig;
use meshms_core::conversation::ConversationIndex;
use meshms_core::discovery::discover_conversations;
use meshms_core::iterator::{Direction, MessageIterator};
use meshms_core::record::RecordType;
use meshms_core::store::BundleStore;
use meshms_core::sync::{send_message, synchronise_conversation, SyncOutcome};
use meshms_mock::MockStore;

#[test]
fn s1_first_send_creates_a_ply_with_expected_filesize() {
    let store = MockStore::new();
    let alice = store.add_identity();
    let bob = store.add_identity();

    let mut index = ConversationIndex::new();
    let conv = index.get_or_create(bob);
    send_message(&store, &store, &alice, conv, "hi").unwrap();

    let descriptor = conv.my_ply.expect("ply should have been created");
    assert_eq!(descriptor.size, 5); // "hi\0" (3 bytes) + 2-byte footer.
    let manifest = store.retrieve_manifest(&descriptor.bid).unwrap();
    assert_eq!(manifest.sender, alice);
    assert_eq!(manifest.recipient, bob);
}

#[test]
fn s2_reply_and_ack_leaves_hi_undelivered() {
    let store = MockStore::new();
    let alice = store.add_identity();
    let bob = store.add_identity();

    let mut alice_index = ConversationIndex::new();
    let alice_conv = alice_index.get_or_create(bob);
    send_message(&store, &store, &alice, alice_conv, "hi").unwrap();

    let mut bob_index = ConversationIndex::new();
    let bob_conv = bob_index.get_or_create(alice);
    send_message(&store, &store, &bob, bob_conv, "ok").unwrap();

    // Alice discovers Bob's ply and synchronises: she must append an ACK
    // covering her own "hi" message's end offset (5), footer byte 0x11.
    let mut index = ConversationIndex::new();
    discover_conversations(&store, &alice, None, &mut index).unwrap();
    let conv = index.get_mut(&bob).unwrap();
    let config = MeshmsConfig::default();
    let outcome = synchronise_conversation(&store, &store, &config, &alice, conv);
    assert!(matches!(outcome, SyncOutcome::Dirty));

    let my_bid = conv.my_ply.unwrap().bid;
    let payload = store.payload_of(&my_bid).unwrap();
    assert_eq!(&payload[payload.len() - 2..], &[0x00, 0x11]);

    let iter = MessageIterator::open(&store, conv).unwrap();
    let messages: Vec<_> = iter.collect::<meshms_core::error::Result<Vec<_>>>().unwrap();
    let hi = messages
        .iter()
        .find(|m| m.direction == Direction::Sent)
        .expect("hi should be present");
    assert_eq!(hi.text, "hi");
    assert!(!hi.delivered);
}

#[test]
fn s3_bobs_ack_marks_hi_delivered() {
    let store = MockStore::new();
    let alice = store.add_identity();
    let bob = store.add_identity();
    let config = MeshmsConfig::default();

    let mut alice_index = ConversationIndex::new();
    let alice_conv = alice_index.get_or_create(bob);
    send_message(&store, &store, &alice, alice_conv, "hi").unwrap();

    let mut bob_index = ConversationIndex::new();
    let bob_conv = bob_index.get_or_create(alice);
    send_message(&store, &store, &bob, bob_conv, "ok").unwrap();

    // Bob discovers alice's ply and acks her message (covering offset 5).
    let mut bob_full_index = ConversationIndex::new();
    discover_conversations(&store, &bob, None, &mut bob_full_index).unwrap();
    let bob_conv = bob_full_index.get_mut(&alice).unwrap();
    synchronise_conversation(&store, &store, &config, &bob, bob_conv);

    // Alice resyncs and sees her own message marked delivered.
    let mut alice_full_index = ConversationIndex::new();
    discover_conversations(&store, &alice, None, &mut alice_full_index).unwrap();
    let alice_conv = alice_full_index.get_mut(&bob).unwrap();
    synchronise_conversation(&store, &store, &config, &alice, alice_conv);

    let iter = MessageIterator::open(&store, alice_conv).unwrap();
    let messages: Vec<_> = iter.collect::<meshms_core::error::Result<Vec<_>>>().unwrap();
    let hi = messages.iter().find(|m| m.text == "hi").unwrap();
    assert!(hi.delivered);
    let ok = messages.iter().find(|m| m.text == "ok").unwrap();
    assert!(!ok.read);
}

#[test]
fn s4_read_messages_advances_read_offset_and_marks_ok_read() {
    let store = MockStore::new();
    let alice = store.add_identity();
    let bob = store.add_identity();
    let config = MeshmsConfig::default();

    let mut alice_index = ConversationIndex::new();
    let alice_conv = alice_index.get_or_create(bob);
    send_message(&store, &store, &alice, alice_conv, "hi").unwrap();

    let mut bob_index = ConversationIndex::new();
    let bob_conv = bob_index.get_or_create(alice);
    send_message(&store, &store, &bob, bob_conv, "ok").unwrap();

    let mut bob_full_index = ConversationIndex::new();
    discover_conversations(&store, &bob, None, &mut bob_full_index).unwrap();
    synchronise_conversation(&store, &store, &config, &bob, bob_full_index.get_mut(&alice).unwrap());

    let mut alice_full_index = ConversationIndex::new();
    discover_conversations(&store, &alice, None, &mut alice_full_index).unwrap();
    let conv = alice_full_index.get_mut(&bob).unwrap();
    synchronise_conversation(&store, &store, &config, &alice, conv);

    assert_eq!(conv.their_last_message, 5);
    conv.mark_read(5);
    assert_eq!(conv.read_offset, 5);

    let iter = MessageIterator::open(&store, conv).unwrap();
    let messages: Vec<_> = iter.collect::<meshms_core::error::Result<Vec<_>>>().unwrap();
    let ok = messages.iter().find(|m| m.text == "ok").unwrap();
    assert!(ok.read);
    let hi = messages.iter().find(|m| m.text == "hi").unwrap();
    assert!(hi.delivered);
}

#[test]
fn s5_gazumped_write_is_reported_and_not_retried() {
    use meshms_core::record::append_record;
    use meshms_core::store::FinaliseStatus;

    let store = MockStore::new();
    let alice = store.add_identity();
    let bob = store.add_identity();

    let mut index = ConversationIndex::new();
    let conv = index.get_or_create(bob);
    send_message(&store, &store, &alice, conv, "hi").unwrap();
    let descriptor = conv.my_ply.unwrap();

    // Two processes retrieve the same base manifest before either commits.
    let mut winner_manifest = store.retrieve_manifest(&descriptor.bid).unwrap();
    let mut loser_manifest = store.retrieve_manifest(&descriptor.bid).unwrap();
    assert_eq!(winner_manifest.version, loser_manifest.version);

    let mut winner_bytes = Vec::new();
    append_record(&mut winner_bytes, RecordType::Message, b"again\0");
    store.append_journal(&mut winner_manifest, &winner_bytes).unwrap();
    assert_eq!(store.finalise(&mut winner_manifest).unwrap(), FinaliseStatus::New);

    // The loser staged its write against the same base version, but the
    // store has already moved on.
    let mut loser_bytes = Vec::new();
    append_record(&mut loser_bytes, RecordType::Message, b"late\0");
    store.append_journal(&mut loser_manifest, &loser_bytes).unwrap();
    let status = store.finalise(&mut loser_manifest).unwrap();
    assert!(matches!(status, FinaliseStatus::Old));

    // The next pass observes the winner's version without double-writing.
    let current = store.retrieve_manifest(&descriptor.bid).unwrap();
    assert_eq!(current.version, winner_manifest.version);
}

#[test]
fn s6_truncated_cursor_file_yields_partial_index() {
    let store = MockStore::new();
    let alice = store.add_identity();
    let bob = store.add_identity();
    let carol = store.add_identity();
    let config = MeshmsConfig::default();

    let mut index = ConversationIndex::new();
    let bob_conv = index.get_or_create(bob);
    bob_conv.their_last_message = 5;
    bob_conv.read_offset = 5;
    bob_conv.their_size = 5;
    let carol_conv = index.get_or_create(carol);
    carol_conv.their_last_message = 9;
    carol_conv.read_offset = 1;
    carol_conv.their_size = 9;

    let mut manifest = open_conversation_bundle(&store, &store, &config, &alice).unwrap();
    write_known_conversations(&store, &mut manifest, &index).unwrap();

    // Truncate mid-record, corrupting the second (carol's) conversation only.
    let mut payload = store.payload_of(&manifest.bid).unwrap();
    payload.truncate(payload.len() - 5);
    let mut corrupt = store.retrieve_manifest(&manifest.bid).unwrap();
    let mut writer = store.open_write(&corrupt).unwrap();
    writer.write_all(&payload).unwrap();
    writer.finish().unwrap();
    store.finalise(&mut corrupt).unwrap();

    let partial = read_known_conversations(&store, &corrupt).unwrap();
    assert!(partial.get(&bob).is_some());
    assert!(partial.get(&carol).is_none());

    // Discovery can still repopulate whatever the persisted index lost.
    let mut rediscovered = ConversationIndex::new();
    discover_conversations(&store, &alice, None, &mut rediscovered).unwrap();
}
