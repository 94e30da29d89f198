//! Write paths shared by the mailbox kinds: flag stores, copies, and
//! mailbox destruction.
//!
//! Every entry point here opens one store transaction and commits it only
//! after the full batch has been staged, so a failure anywhere leaves no
//! trace of the operation. While that transaction is open all reads go
//! through it as well, both for a consistent view and because the store
//! may sit on a single-connection pool.

use tagbox_store::{AssociationId, MessageId, MessageStore, StoreTx, TagId};
use tracing::debug;

use crate::error::Result;
use crate::flags::{Flag, StoreMode};

/// Applies `flags` to every message in `targets` under `mode`.
///
/// `\Deleted` never touches the tag tables: it is routed to the deletion
/// attribute of each target's association with `own_tag`, the tag backing
/// the mailbox the client is looking at.
pub(crate) async fn apply_store(
    store: &MessageStore,
    own_tag: TagId,
    targets: &[MessageId],
    flags: &[Flag],
    mode: StoreMode,
) -> Result<()> {
    if targets.is_empty() {
        return Ok(());
    }
    let deletion = flags.contains(&Flag::Deleted);
    let names: Vec<&str> = flags
        .iter()
        .filter(|flag| **flag != Flag::Deleted)
        .map(Flag::as_str)
        .collect();

    debug!(
        ?mode,
        targets = targets.len(),
        flags = flags.len(),
        "applying flag store"
    );

    let mut tx = store.begin().await?;
    let tag_ids = resolve_flag_tags(&mut tx, &names, mode).await?;

    match mode {
        StoreMode::Remove => {
            for &message in targets {
                for &tag in &tag_ids {
                    tx.delete_association(message, tag).await?;
                }
                if deletion {
                    tx.set_deletion_flag(message, own_tag, false).await?;
                }
            }
        }
        StoreMode::Replace => {
            for &message in targets {
                tx.delete_associations_except(message, &tag_ids).await?;
                if !deletion {
                    tx.set_deletion_flag(message, own_tag, false).await?;
                }
            }
            add_pass(&mut tx, targets, &tag_ids, own_tag, deletion).await?;
        }
        StoreMode::Add => {
            add_pass(&mut tx, targets, &tag_ids, own_tag, deletion).await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Maps flag names to tag ids inside the transaction.
///
/// Adding or replacing creates missing tags (a new keyword comes into
/// existence by being stored); removing a flag nobody ever stored must
/// not, so those names are skipped.
async fn resolve_flag_tags(
    tx: &mut StoreTx,
    names: &[&str],
    mode: StoreMode,
) -> Result<Vec<TagId>> {
    let mut tag_ids = Vec::with_capacity(names.len());
    match mode {
        StoreMode::Remove => {
            for name in names {
                if let Some(tag) = tx.tag_by_name(name).await? {
                    tag_ids.push(tag.id);
                }
            }
        }
        StoreMode::Add | StoreMode::Replace => {
            for name in names {
                tag_ids.push(tx.get_or_create_tag(name).await?.id);
            }
        }
    }
    Ok(tag_ids)
}

async fn add_pass(
    tx: &mut StoreTx,
    targets: &[MessageId],
    tags: &[TagId],
    own_tag: TagId,
    deletion: bool,
) -> Result<()> {
    for &message in targets {
        for &tag in tags {
            if tx.association(message, tag).await?.is_none() {
                tx.insert_association(message, tag).await?;
            }
        }
        if deletion {
            tx.set_deletion_flag(message, own_tag, true).await?;
        }
    }
    Ok(())
}

/// Puts `message` into the mailbox backed by `own_tag`, returning the
/// association id. A message already present keeps its existing row, so
/// copies are idempotent and UIDs stable.
pub(crate) async fn copy_into(
    store: &MessageStore,
    own_tag: TagId,
    message: MessageId,
) -> Result<AssociationId> {
    let mut tx = store.begin().await?;
    let id = match tx.association(message, own_tag).await? {
        Some(existing) => existing.id,
        None => tx.insert_association(message, own_tag).await?,
    };
    tx.commit().await?;
    Ok(id)
}

/// Drops every association carrying `tag`, leaving the tag row itself in
/// place. Returns the number of memberships removed.
pub(crate) async fn clear_tag(store: &MessageStore, tag: TagId) -> Result<u64> {
    let mut tx = store.begin().await?;
    let removed = tx.delete_associations_for_tag(tag).await?;
    tx.commit().await?;
    Ok(removed)
}
