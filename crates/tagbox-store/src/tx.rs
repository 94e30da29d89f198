//! Write transactions over the store.

use sqlx::Transaction;
use sqlx::sqlite::Sqlite;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{AssociationId, MessageId, MessageTag, Tag, TagId};
use crate::store::{placeholders, row_to_association, row_to_tag};

/// An open write transaction.
///
/// Statements issued through a `StoreTx` become visible to the rest of the
/// store only after [`StoreTx::commit`]. Dropping the value without
/// committing rolls everything back, so an early return with `?` aborts the
/// whole batch.
///
/// While a transaction is open all reads it depends on must go through it
/// too. On a single-connection pool a read through the store would wait on
/// the connection the transaction holds.
#[derive(Debug)]
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    /// Commits the transaction, making every statement visible at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Commit`] if the commit fails; the transaction is
    /// rolled back in that case.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(Error::Commit)
    }

    /// Looks a tag up by name inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn tag_by_name(&mut self, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(row_to_tag))
    }

    /// Returns the tag named `name`, creating it if it does not exist.
    ///
    /// The creation is part of the transaction. If the batch later fails,
    /// the tag row is rolled back with everything else.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn get_or_create_tag(&mut self, name: &str) -> Result<Tag> {
        if let Some(tag) = self.tag_by_name(name).await? {
            return Ok(tag);
        }
        let result = sqlx::query("INSERT INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&mut *self.tx)
            .await?;
        let tag = Tag {
            id: TagId::new(result.last_insert_rowid()),
            name: name.to_string(),
        };
        debug!(id = %tag.id, name, "created tag in transaction");
        Ok(tag)
    }

    /// Returns the association between `message` and `tag` as seen by this
    /// transaction, oldest row first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn association(
        &mut self,
        message: MessageId,
        tag: TagId,
    ) -> Result<Option<MessageTag>> {
        let row = sqlx::query(
            "SELECT id, message_id, tag_id, deleted FROM message_tags
             WHERE message_id = ? AND tag_id = ? ORDER BY id LIMIT 1",
        )
        .bind(message.0)
        .bind(tag.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.as_ref().map(row_to_association))
    }

    /// Associates `message` with `tag` and returns the new row's id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert_association(
        &mut self,
        message: MessageId,
        tag: TagId,
    ) -> Result<AssociationId> {
        let result = sqlx::query("INSERT INTO message_tags (message_id, tag_id) VALUES (?, ?)")
            .bind(message.0)
            .bind(tag.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(AssociationId::new(result.last_insert_rowid()))
    }

    /// Removes every association between `message` and `tag`. Returns the
    /// number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_association(&mut self, message: MessageId, tag: TagId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM message_tags WHERE message_id = ? AND tag_id = ?")
            .bind(message.0)
            .bind(tag.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Removes every association of `message` whose tag is not in `keep`.
    /// An empty `keep` removes them all. Returns the number of rows
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_associations_except(
        &mut self,
        message: MessageId,
        keep: &[TagId],
    ) -> Result<u64> {
        if keep.is_empty() {
            let result = sqlx::query("DELETE FROM message_tags WHERE message_id = ?")
                .bind(message.0)
                .execute(&mut *self.tx)
                .await?;
            return Ok(result.rows_affected());
        }
        let sql = format!(
            "DELETE FROM message_tags WHERE message_id = ? AND tag_id NOT IN ({})",
            placeholders(keep.len())
        );
        let mut query = sqlx::query(&sql).bind(message.0);
        for tag in keep {
            query = query.bind(tag.0);
        }
        let result = query.execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    /// Removes every association carrying `tag`, leaving the tag row and
    /// the messages in place. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_associations_for_tag(&mut self, tag: TagId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM message_tags WHERE tag_id = ?")
            .bind(tag.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Sets or clears the deletion attribute on the association between
    /// `message` and `tag`. A missing association leaves nothing to update
    /// and is not an error. Returns the number of rows touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_deletion_flag(
        &mut self,
        message: MessageId,
        tag: TagId,
        deleted: bool,
    ) -> Result<u64> {
        let result =
            sqlx::query("UPDATE message_tags SET deleted = ? WHERE message_id = ? AND tag_id = ?")
                .bind(deleted)
                .bind(message.0)
                .bind(tag.0)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected())
    }
}
