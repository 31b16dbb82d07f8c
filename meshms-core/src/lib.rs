//! Store-and-forward mesh messaging over a content-addressed bundle store.
//!
//! This crate implements the MeshMS protocol layer: two peers exchange
//! messages by each maintaining an append-only journal ("ply") addressed to
//! the other, and periodically synchronising acknowledgement records so both
//! sides agree on what has been delivered. The bundle store and keyring
//! themselves are out of scope; callers supply implementations of
//! [`store::BundleStore`] and [`store::Keyring`] (see `meshms-mock` for a
//! test double).

pub mod bundle;
pub mod cli_format;
pub mod config;
pub mod conversation;
pub mod discovery;
pub mod error;
pub mod iterator;
pub mod ply;
pub mod record;
pub mod sid;
pub mod store;
pub mod sync;
pub mod varint;

pub mod prelude {
    pub use crate::config::MeshmsConfig;
    pub use crate::conversation::{Conversation, ConversationIndex, PlyDescriptor};
    pub use crate::error::{MeshmsError, Result};
    pub use crate::iterator::{Direction, Message, MessageIterator};
    pub use crate::sid::{Bid, Sid};
    pub use crate::store::{BundleStore, Keyring};
    pub use crate::sync::{send_message, synchronise_all, synchronise_conversation, SyncOutcome};
}
