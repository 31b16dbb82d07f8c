//! Row-format helpers capturing the CLI's output contract (spec §6), kept as
//! a library surface so the contract is locked down by tests even though no
//! `bin/` front-end ships in this crate.
use crate::conversation::Conversation;
use crate::iterator::{Direction, Message};

/// `meshms list conversations` row: `_id:recipient:read:last_message:read_offset`.
/// `read` is the literal `"unread"` when the peer has sent more than has been
/// marked read, empty otherwise.
pub fn format_conversation_row(id: usize, conv: &Conversation) -> String {
    let unread = if conv.read_offset < conv.their_last_message {
        "unread"
    } else {
        ""
    };
    format!(
        "{}:{}:{}:{}:{}",
        id, conv.them, unread, conv.their_last_message, conv.read_offset
    )
}

/// `meshms list messages` row: `_id:offset:type:message`.
pub fn format_message_row(id: usize, offset: u64, row_type: &str, message: &str) -> String {
    format!("{id}:{offset}:{row_type}:{message}")
}

/// Renders a top-down (newest-first) message listing, inserting the two
/// synthetic marker rows spec §6 describes: `ACK/delivered` at the first
/// undelivered-to-delivered boundary among sent messages, and `MARK/read` at
/// the first unread-to-read boundary among received messages. Each boundary
/// fires at most once, at the first (topmost) message on the delivered/read
/// side of it.
///
/// The marker rows print `recipient_ack_offset`/`received_read_offset` — the
/// fixed offsets the iterator captured once at open, not the triggering
/// message's own offset (`examples/original_source/meshms.c:980,994`).
pub fn render_message_rows(
    messages: &[Message],
    recipient_ack_offset: u64,
    received_read_offset: u64,
) -> Vec<String> {
    let mut rows = Vec::new();
    let mut id = 0usize;
    let mut last_delivered = Some(false);
    let mut last_read = Some(false);

    for message in messages {
        match message.direction {
            Direction::Sent => {
                if last_delivered == Some(false) && message.delivered {
                    rows.push(format_message_row(id, recipient_ack_offset, "ACK", "delivered"));
                    id += 1;
                }
                last_delivered = Some(message.delivered);
            }
            Direction::Received => {
                if last_read == Some(false) && message.read {
                    rows.push(format_message_row(id, received_read_offset, "MARK", "read"));
                    id += 1;
                }
                last_read = Some(message.read);
            }
        }
        let row_type = match message.direction {
            Direction::Sent => ">",
            Direction::Received => "<",
        };
        rows.push(format_message_row(id, message.offset, row_type, &message.text));
        id += 1;
    }
    rows
}
