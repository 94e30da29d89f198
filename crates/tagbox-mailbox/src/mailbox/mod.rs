//! Mailbox views and the contract they present to a protocol front end.
//!
//! A mailbox is opened against the live store, takes a snapshot of its
//! membership, and then serves sequence numbers from that snapshot until
//! [`reload`](TagMailbox::reload) is called. Counts that depend on flags
//! (`unseen`) are computed against live flag state but only over the
//! snapshot's members, matching what a client believes is in the folder.

use std::collections::HashMap;

use tagbox_store::{Message, MessageId, MessageStore};

use crate::error::{Error, Result};
use crate::flags::{Flag, StoreMode};
use crate::sets::MessageSet;

mod query;
mod tag;
mod write;

pub use query::QueryMailbox;
pub use tag::TagMailbox;

/// The operations a mailbox offers to its hosting protocol server.
///
/// Methods that deal in "references" accept either sequence numbers
/// (positions in the snapshot, starting at 1) or UIDs, selected by the
/// `by_uid` argument, mirroring the protocol's two addressing modes.
#[allow(async_fn_in_trait)]
pub trait Mailbox {
    /// The UIDVALIDITY value for this mailbox.
    ///
    /// Paired with a UID it forms a durable message identity: whenever
    /// UIDs might refer to different messages than before, this value
    /// changes.
    fn uid_validity(&self) -> i64;

    /// A UID strictly greater than any UID ever used in this mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn uid_next(&self) -> Result<i64>;

    /// Translates a sequence number into a UID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `seq` is outside the snapshot.
    async fn uid(&self, seq: i64) -> Result<i64>;

    /// Number of messages in the snapshot.
    fn message_count(&self) -> usize;

    /// Number of snapshot messages carrying `\Recent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn recent_count(&self) -> Result<usize>;

    /// Number of snapshot messages not carrying `\Seen`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn unseen_count(&self) -> Result<usize>;

    /// Whether flag stores and copies may target this mailbox.
    fn is_writeable(&self) -> bool;

    /// The flag namespace advertised for this mailbox: the reserved system
    /// flags, every tag name, and the keyword wildcard.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn flags(&self) -> Result<Vec<String>>;

    /// Empties the mailbox by dropping its membership associations.
    ///
    /// Messages survive, as does the backing tag row or folder
    /// definition; this is the "expunge everything" end of a folder's
    /// life, not the deletion of its name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn destroy(self) -> Result<()>
    where
        Self: Sized;

    /// Loads the messages selected by `set`, in set order.
    ///
    /// References that do not resolve to a snapshot member are skipped
    /// rather than reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    async fn fetch(&self, set: &MessageSet, by_uid: bool) -> Result<Vec<Message>>;

    /// Applies a flag mutation to the messages selected by `set`.
    ///
    /// The whole mutation is one store transaction: on any failure no
    /// message keeps a partial change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] if the mailbox is not writeable, or an
    /// error if the store fails.
    async fn store(
        &self,
        set: &MessageSet,
        flags: &[Flag],
        mode: StoreMode,
        by_uid: bool,
    ) -> Result<()>;

    /// Adds an existing message to this mailbox and returns the UID it
    /// gets here. Copying a message already present changes nothing and
    /// returns its current UID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] if the mailbox is not writeable, or an
    /// error if the store fails.
    async fn copy(&self, message: &Message) -> Result<i64>;

    /// Content search inside messages.
    ///
    /// # Errors
    ///
    /// Search is delegated to the indexing collaborator; the engine
    /// always returns [`Error::NotImplemented`].
    async fn search(&self, _query: &str, _by_uid: bool) -> Result<Vec<i64>> {
        Err(Error::NotImplemented("SEARCH"))
    }
}

/// Looks a sequence number up in the snapshot, 1-based.
pub(crate) fn seq_entry(snapshot: &[MessageId], seq: i64) -> Result<MessageId> {
    usize::try_from(seq)
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| snapshot.get(i))
        .copied()
        .ok_or_else(|| Error::NotFound(format!("sequence number {seq}")))
}

/// Expands `set` as sequence numbers and maps them through the snapshot,
/// silently dropping out-of-range positions.
pub(crate) fn resolve_positions(snapshot: &[MessageId], set: &MessageSet) -> Vec<MessageId> {
    let last = i64::try_from(snapshot.len()).unwrap_or(i64::MAX);
    set.expand(last)
        .into_iter()
        .filter_map(|seq| {
            usize::try_from(seq)
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| snapshot.get(i))
                .copied()
        })
        .collect()
}

/// Loads `ids` from the store and returns them in the order given,
/// skipping ids with no backing row.
pub(crate) async fn load_in_order(store: &MessageStore, ids: &[MessageId]) -> Result<Vec<Message>> {
    let mut by_id: HashMap<MessageId, Message> = store
        .messages(ids)
        .await?
        .into_iter()
        .map(|message| (message.id, message))
        .collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// Counts snapshot members carrying `flag`'s tag. A flag whose tag was
/// never created counts as carried by nobody.
pub(crate) async fn count_snapshot_tagged(
    store: &MessageStore,
    snapshot: &[MessageId],
    flag: &Flag,
) -> Result<usize> {
    let Some(tag) = store.tag_by_name(flag.as_str()).await? else {
        return Ok(0);
    };
    Ok(store.count_tagged(snapshot, tag.id).await?)
}
