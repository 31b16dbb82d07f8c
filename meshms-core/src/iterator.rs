//! The message iterator (spec §4.G): an interleaved, reverse-chronological
//! walk over a conversation's two plies, with synthetic delivery/read state.
use crate::conversation::Conversation;
use crate::error::Result;
use crate::ply::{PlyRead, PlyReader};
use crate::record::{decode_ack_payload, RecordType};
use crate::store::BundleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub offset: u64,
    pub text: String,
    pub direction: Direction,
    pub delivered: bool,
    pub read: bool,
}

/// Presents a conversation's messages from newest to oldest, from the local
/// sender's point of view.
pub struct MessageIterator<'a> {
    sender_reader: Option<PlyReader>,
    recipient_reader: Option<PlyReader>,
    in_ack: bool,
    end_range: u64,
    sent_ack_offset: u64,
    recipient_ack_offset: u64,
    received_read_offset: u64,
    store: &'a dyn BundleStore,
}

impl<'a> MessageIterator<'a> {
    /// Opens the iterator over `conv` (spec §4.G "Open").
    pub fn open(store: &'a dyn BundleStore, conv: &Conversation) -> Result<Self> {
        let received_read_offset = conv.read_offset;

        let sender_reader = match conv.my_ply {
            Some(descriptor) => Some(PlyReader::open(store, &descriptor.bid)?),
            None => None,
        };

        let mut recipient_reader = None;
        let mut sent_ack_offset = 0;
        let mut recipient_ack_offset = 0;

        if conv.my_ply.is_some() {
            if let Some(their_descriptor) = conv.their_ply {
                let mut reader = PlyReader::open(store, &their_descriptor.bid)?;
                if let PlyRead::Record = reader.find_prev(RecordType::Ack)? {
                    let (ack_offset, _) = decode_ack_payload(reader.record()).unwrap_or((0, None));
                    sent_ack_offset = ack_offset;
                    recipient_ack_offset = reader.record_end_offset;
                }
                reader.seek_to_end();
                recipient_reader = Some(reader);
            }
        }

        Ok(Self {
            sender_reader,
            recipient_reader,
            in_ack: false,
            end_range: 0,
            sent_ack_offset,
            recipient_ack_offset,
            received_read_offset,
            store,
        })
    }

    fn advance(&mut self) -> Result<Option<Message>> {
        loop {
            if self.in_ack {
                if let Some(reader) = self.recipient_reader.as_mut() {
                    match reader.find_prev(RecordType::Message) {
                        Ok(PlyRead::Record) if reader.offset >= self.end_range => {
                            let text = decode_message_text(reader.record());
                            let offset = reader.record_end_offset;
                            return Ok(Some(Message {
                                offset,
                                text,
                                direction: Direction::Received,
                                delivered: true,
                                read: offset <= self.received_read_offset,
                            }));
                        }
                        Ok(_) => {
                            self.in_ack = false;
                        }
                        Err(e) => {
                            // A decode error on the recipient ply inside an ack
                            // window is swallowed, not propagated: the original
                            // overwrites this read's result with the next
                            // sender-ply read before ever checking it (see
                            // examples/original_source/meshms.c:793-806).
                            log::trace!("recipient ply decode error inside ack window: {e}");
                            self.in_ack = false;
                        }
                    }
                } else {
                    self.in_ack = false;
                }
            }

            let Some(sender_reader) = self.sender_reader.as_mut() else {
                return Ok(None);
            };
            match sender_reader.read_prev()? {
                PlyRead::EndOfPly => return Ok(None),
                PlyRead::Record => match sender_reader.record_type {
                    Some(RecordType::Ack) => {
                        let (ack_offset, delta) = decode_ack_payload(sender_reader.record())
                            .unwrap_or((0, None));
                        if let Some(reader) = self.recipient_reader.as_mut() {
                            reader.seek(ack_offset);
                        }
                        self.end_range = match delta {
                            Some(delta) => ack_offset.saturating_sub(delta),
                            None => 0,
                        };
                        self.in_ack = true;
                    }
                    Some(RecordType::Message) => {
                        let text = decode_message_text(sender_reader.record());
                        let offset = sender_reader.record_end_offset;
                        return Ok(Some(Message {
                            offset,
                            text,
                            direction: Direction::Sent,
                            delivered: self.sent_ack_offset != 0 && offset <= self.sent_ack_offset,
                            read: false,
                        }));
                    }
                    Some(RecordType::BidReference) | None => {
                        // Reserved / unrecognised record kind: skip and keep walking.
                        continue;
                    }
                },
            }
        }
    }

    /// The ACK record end offset that set the current acknowledged range, if
    /// the iterator is presently inside one (used to draw the "delivered"
    /// separator in a CLI listing).
    pub fn recipient_ack_offset(&self) -> u64 {
        self.recipient_ack_offset
    }

    /// `conv.read_offset` as it stood when the iterator was opened (used to
    /// draw the "read" separator in a CLI listing).
    pub fn received_read_offset(&self) -> u64 {
        self.received_read_offset
    }
}

fn decode_message_text(record: &[u8]) -> String {
    let bytes = record.strip_suffix(&[0u8]).unwrap_or(record);
    String::from_utf8_lossy(bytes).into_owned()
}

impl<'a> Iterator for MessageIterator<'a> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationIndex;
    use crate::sync::{synchronise_conversation, SyncOutcome};
    use meshms_mock::MockStore;

    #[test]
    fn sent_message_surfaces_as_undelivered_before_ack() {
        let store = MockStore::new();
        let alice = store.add_identity();
        let bob = store.add_identity();

        // Alice sends "hi" by seeding her own ply directly.
        store.seed_ply(alice, bob, b"hi");

        let mut index = ConversationIndex::new();
        crate::discovery::discover_conversations(&store, &alice, None, &mut index).unwrap();
        let conv = index.get(&bob).unwrap().clone();

        let iter = MessageIterator::open(&store, &conv).unwrap();
        let messages: Vec<Message> = iter.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, Direction::Sent);
        assert_eq!(messages[0].text, "hi");
        assert!(!messages[0].delivered);
    }

    #[test]
    fn acked_message_is_marked_delivered() {
        let store = MockStore::new();
        let alice = store.add_identity();
        let bob = store.add_identity();

        store.seed_ply(alice, bob, b"hi");

        let mut index = ConversationIndex::new();
        crate::discovery::discover_conversations(&store, &bob, None, &mut index).unwrap();
        let config = crate::config::MeshmsConfig::default();
        let conv = index.get_mut(&alice).unwrap();
        let outcome = synchronise_conversation(&store, &store, &config, &bob, conv);
        assert!(matches!(outcome, SyncOutcome::Dirty));

        // Alice re-discovers to pick up Bob's ACK ply, then lists her own view.
        let mut alice_index = ConversationIndex::new();
        crate::discovery::discover_conversations(&store, &alice, None, &mut alice_index).unwrap();
        let alice_conv = alice_index.get(&bob).unwrap().clone();
        let iter = MessageIterator::open(&store, &alice_conv).unwrap();
        let messages: Vec<Message> = iter.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].delivered);
    }
}
