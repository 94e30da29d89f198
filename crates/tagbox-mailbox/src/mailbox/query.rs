//! Mailboxes backed by a saved query.

use tagbox_store::{Message, MessageId, MessageStore, Tag, TagId};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::flags::{Flag, StoreMode};
use crate::mailbox::{
    Mailbox, count_snapshot_tagged, load_in_order, resolve_positions, seq_entry, write,
};
use crate::query::{Query, evaluate};
use crate::registry;
use crate::sets::MessageSet;

/// A mailbox whose membership is the result of a query over tags.
///
/// UIDs are message ids. An atomic query (one tag) makes the mailbox
/// writeable, with flag stores and copies applied through that tag; a
/// compound query has no single tag to write through, so the mailbox is
/// read-only.
#[derive(Debug)]
pub struct QueryMailbox {
    store: MessageStore,
    query: Query,
    own_tag: Option<Tag>,
    snapshot: Vec<MessageId>,
}

impl QueryMailbox {
    /// Opens a mailbox for `query`, snapshotting the messages it matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the query references a tag that does
    /// not exist, [`Error::InvalidQuery`] if it is malformed, or an error
    /// if the store fails.
    pub async fn open(store: MessageStore, query: Query) -> Result<Self> {
        let own_tag = resolve_own_tag(&store, &query).await?;
        let snapshot: Vec<MessageId> = evaluate(&store, &query).await?.into_iter().collect();
        debug!(%query, messages = snapshot.len(), "opened query mailbox");
        Ok(Self {
            store,
            query,
            own_tag,
            snapshot,
        })
    }

    /// Re-runs the query against live store state and re-resolves the
    /// write-through tag, so a tag deleted and recreated under the same
    /// name is picked up. Sequence numbers handed out before this call
    /// refer to the old snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the query names a tag that no longer
    /// exists, or an error if evaluation fails.
    pub async fn reload(&mut self) -> Result<()> {
        self.own_tag = resolve_own_tag(&self.store, &self.query).await?;
        self.snapshot = evaluate(&self.store, &self.query).await?.into_iter().collect();
        Ok(())
    }

    /// The query this mailbox was opened from.
    #[must_use]
    pub fn query(&self) -> &Query {
        &self.query
    }

    fn resolve(&self, set: &MessageSet, by_uid: bool) -> Vec<MessageId> {
        if by_uid {
            let last = self.snapshot.last().map_or(0, |id| id.0);
            self.snapshot
                .iter()
                .copied()
                .filter(|id| set.contains(id.0, last))
                .collect()
        } else {
            resolve_positions(&self.snapshot, set)
        }
    }

    fn read_only(&self) -> Error {
        Error::ReadOnly(self.query.to_string())
    }
}

impl Mailbox for QueryMailbox {
    // Message ids are primary keys and never renumbered, so a UID here can
    // never silently point at a different message. One constant validity
    // value is enough.
    fn uid_validity(&self) -> i64 {
        1
    }

    async fn uid_next(&self) -> Result<i64> {
        let max = self.store.max_message_id().await?;
        Ok(max.map_or(1, |id| id.0 + 1))
    }

    async fn uid(&self, seq: i64) -> Result<i64> {
        Ok(seq_entry(&self.snapshot, seq)?.0)
    }

    fn message_count(&self) -> usize {
        self.snapshot.len()
    }

    async fn recent_count(&self) -> Result<usize> {
        count_snapshot_tagged(&self.store, &self.snapshot, &Flag::Recent).await
    }

    async fn unseen_count(&self) -> Result<usize> {
        let seen = count_snapshot_tagged(&self.store, &self.snapshot, &Flag::Seen).await?;
        Ok(self.snapshot.len().saturating_sub(seen))
    }

    fn is_writeable(&self) -> bool {
        self.own_tag.is_some()
    }

    async fn flags(&self) -> Result<Vec<String>> {
        registry::flag_namespace(&self.store).await
    }

    async fn destroy(self) -> Result<()> {
        let Some(tag) = self.own_tag else {
            return Err(Error::ReadOnly(self.query.to_string()));
        };
        let removed = write::clear_tag(&self.store, tag.id).await?;
        debug!(query = %self.query, removed, "destroyed query mailbox");
        Ok(())
    }

    async fn fetch(&self, set: &MessageSet, by_uid: bool) -> Result<Vec<Message>> {
        let targets = self.resolve(set, by_uid);
        load_in_order(&self.store, &targets).await
    }

    async fn store(
        &self,
        set: &MessageSet,
        flags: &[Flag],
        mode: StoreMode,
        by_uid: bool,
    ) -> Result<()> {
        let Some(own) = &self.own_tag else {
            return Err(self.read_only());
        };
        let targets = self.resolve(set, by_uid);
        let result = write::apply_store(&self.store, own.id, &targets, flags, mode).await;
        if let Err(error) = &result {
            warn!(%error, query = %self.query, "flag store failed; nothing was applied");
        }
        result
    }

    async fn copy(&self, message: &Message) -> Result<i64> {
        let Some(own) = &self.own_tag else {
            return Err(self.read_only());
        };
        write::copy_into(&self.store, own.id, message.id).await?;
        Ok(message.id.0)
    }
}

/// The tag an atomic query writes through. Resolved fresh at open and
/// reload so a recreated tag is picked up.
async fn resolve_own_tag(store: &MessageStore, query: &Query) -> Result<Option<Tag>> {
    match query {
        Query::Name(name) => Ok(Some(
            store
                .tag_by_name(name)
                .await?
                .ok_or_else(|| Error::NotFound(format!("tag '{name}'")))?,
        )),
        Query::Id(id) => Ok(Some(
            store
                .tag_by_id(TagId::new(*id))
                .await?
                .ok_or_else(|| Error::NotFound(format!("tag id {id}")))?,
        )),
        Query::Compound(_) => Ok(None),
    }
}
