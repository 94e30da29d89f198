//! Mailboxes backed directly by one tag.

use tagbox_store::{AssociationId, Message, MessageId, MessageStore, Tag};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::flags::{Flag, StoreMode};
use crate::mailbox::{
    Mailbox, count_snapshot_tagged, load_in_order, resolve_positions, seq_entry, write,
};
use crate::registry;
use crate::sets::MessageSet;

/// A mailbox whose membership is exactly the messages carrying one tag.
///
/// UIDs are association row ids: globally monotonic, not contiguous within
/// any one mailbox, and never reused. UIDVALIDITY is the tag id, so
/// deleting a tag and recreating the name invalidates clients' cached
/// UIDs, as it must. Tag mailboxes are always writeable.
#[derive(Debug)]
pub struct TagMailbox {
    store: MessageStore,
    tag: Tag,
    snapshot: Vec<MessageId>,
}

impl TagMailbox {
    /// Opens the mailbox for `tag`, snapshotting its current membership.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn open(store: MessageStore, tag: Tag) -> Result<Self> {
        let snapshot = store.message_ids_with_tag(tag.id).await?;
        debug!(tag = %tag.name, messages = snapshot.len(), "opened tag mailbox");
        Ok(Self {
            store,
            tag,
            snapshot,
        })
    }

    /// Re-snapshots the membership from live store state. Sequence numbers
    /// handed out before this call refer to the old snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn reload(&mut self) -> Result<()> {
        self.snapshot = self.store.message_ids_with_tag(self.tag.id).await?;
        Ok(())
    }

    /// The backing tag.
    #[must_use]
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    // TODO: materialize a message-to-uid map at snapshot time instead of
    // rescanning the association list on every lookup.
    async fn uid_for_message(&self, message: MessageId) -> Result<Option<AssociationId>> {
        let assocs = self.store.associations_for_tag(self.tag.id).await?;
        Ok(assocs
            .into_iter()
            .find(|assoc| assoc.message_id == message)
            .map(|assoc| assoc.id))
    }

    async fn resolve(&self, set: &MessageSet, by_uid: bool) -> Result<Vec<MessageId>> {
        if !by_uid {
            return Ok(resolve_positions(&self.snapshot, set));
        }
        let assocs = self.store.associations_for_tag(self.tag.id).await?;
        let last = match self.snapshot.last() {
            Some(&newest) => assocs
                .iter()
                .find(|assoc| assoc.message_id == newest)
                .map_or(0, |assoc| assoc.id.0),
            None => 0,
        };
        let mut targets = Vec::new();
        for assoc in &assocs {
            if set.contains(assoc.id.0, last)
                && self.snapshot.binary_search(&assoc.message_id).is_ok()
                && !targets.contains(&assoc.message_id)
            {
                targets.push(assoc.message_id);
            }
        }
        Ok(targets)
    }
}

impl Mailbox for TagMailbox {
    fn uid_validity(&self) -> i64 {
        self.tag.id.0
    }

    async fn uid_next(&self) -> Result<i64> {
        let max = self.store.max_association_id(self.tag.id).await?;
        Ok(max.map_or(1, |assoc| assoc.0 + 1))
    }

    async fn uid(&self, seq: i64) -> Result<i64> {
        let message = seq_entry(&self.snapshot, seq)?;
        self.uid_for_message(message)
            .await?
            .map(|assoc| assoc.0)
            .ok_or_else(|| Error::NotFound(format!("association for message {message}")))
    }

    fn message_count(&self) -> usize {
        self.snapshot.len()
    }

    // Nothing tracks delivery into a tag, so no member is ever recent
    // here.
    async fn recent_count(&self) -> Result<usize> {
        Ok(0)
    }

    async fn unseen_count(&self) -> Result<usize> {
        let seen = count_snapshot_tagged(&self.store, &self.snapshot, &Flag::Seen).await?;
        Ok(self.snapshot.len().saturating_sub(seen))
    }

    fn is_writeable(&self) -> bool {
        true
    }

    async fn flags(&self) -> Result<Vec<String>> {
        registry::flag_namespace(&self.store).await
    }

    async fn destroy(self) -> Result<()> {
        let removed = write::clear_tag(&self.store, self.tag.id).await?;
        debug!(tag = %self.tag.name, removed, "destroyed tag mailbox");
        Ok(())
    }

    async fn fetch(&self, set: &MessageSet, by_uid: bool) -> Result<Vec<Message>> {
        let targets = self.resolve(set, by_uid).await?;
        load_in_order(&self.store, &targets).await
    }

    async fn store(
        &self,
        set: &MessageSet,
        flags: &[Flag],
        mode: StoreMode,
        by_uid: bool,
    ) -> Result<()> {
        let targets = self.resolve(set, by_uid).await?;
        let result = write::apply_store(&self.store, self.tag.id, &targets, flags, mode).await;
        if let Err(error) = &result {
            warn!(%error, tag = %self.tag.name, "flag store failed; nothing was applied");
        }
        result
    }

    async fn copy(&self, message: &Message) -> Result<i64> {
        let assoc = write::copy_into(&self.store, self.tag.id, message.id).await?;
        Ok(assoc.0)
    }
}
