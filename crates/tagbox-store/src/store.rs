//! Pooled SQLite store for messages, tags, associations, and folders.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{
    AssociationId, Folder, FolderId, Header, Message, MessageId, MessageTag, NewMessage, Tag, TagId,
};
use crate::tx::StoreTx;

/// The shared message store.
///
/// One store holds every message; mailboxes are tag associations and saved
/// queries over it, never copies. Reads and single-statement writes go
/// through the pool directly. Multi-statement writes go through [`StoreTx`],
/// obtained from [`MessageStore::begin`].
#[derive(Debug, Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Opens (creating if necessary) a store backed by the given database
    /// file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub async fn open(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.initialize().await?;
        debug!(path = database_path, "opened message store");
        Ok(store)
    }

    /// Opens an in-memory store, for tests.
    ///
    /// The pool is capped at one connection because each in-memory SQLite
    /// connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT NOT NULL DEFAULT '',
                length INTEGER NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS headers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                position INTEGER NOT NULL,
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                field TEXT NOT NULL,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_headers_message
             ON headers(message_id, position)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS message_tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                deleted INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_message_tags_tag
             ON message_tags(tag_id, message_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_message_tags_message
             ON message_tags(message_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                query TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Begins a write transaction.
    ///
    /// Dropping the returned [`StoreTx`] without committing rolls every
    /// statement back.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be checked out.
    pub async fn begin(&self) -> Result<StoreTx> {
        Ok(StoreTx::new(self.pool.begin().await?))
    }

    // ----- messages -----

    /// Appends a message and its headers, atomically.
    ///
    /// Headers are stored at their position in `message.headers`, so order
    /// and repeats survive the round trip.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails or the transaction cannot
    /// commit.
    pub async fn append_message(&self, message: &NewMessage) -> Result<MessageId> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO messages (body, length, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&message.body)
        .bind(message.length)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let id = MessageId::new(result.last_insert_rowid());

        for (position, (field, value)) in (0_i64..).zip(&message.headers) {
            sqlx::query(
                "INSERT INTO headers (position, message_id, field, value)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(position)
            .bind(id.0)
            .bind(field)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.map_err(Error::Commit)?;
        debug!(%id, headers = message.headers.len(), "appended message");
        Ok(id)
    }

    /// Loads one message with its headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn message(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.messages(&[id]).await?.into_iter().next())
    }

    /// Loads the given messages with their headers, in ascending id order.
    ///
    /// Ids with no matching row are skipped and repeated ids load once.
    /// The list may be arbitrarily large; lookups are issued in batches.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn messages(&self, ids: &[MessageId]) -> Result<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut unique: Vec<i64> = ids.iter().map(|id| id.0).collect();
        unique.sort_unstable();
        unique.dedup();

        let mut messages: Vec<Message> = Vec::new();
        for chunk in unique.chunks(ID_CHUNK) {
            let sql = format!(
                "SELECT id, body, length, deleted, created_at, updated_at
                 FROM messages WHERE id IN ({}) ORDER BY id",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for &id in chunk {
                query = query.bind(id);
            }
            let rows = query.fetch_all(&self.pool).await?;
            messages.extend(rows.iter().map(row_to_message));
        }

        let mut headers: HashMap<i64, Vec<Header>> = HashMap::new();
        for chunk in unique.chunks(ID_CHUNK) {
            let sql = format!(
                "SELECT message_id, position, field, value
                 FROM headers WHERE message_id IN ({}) ORDER BY message_id, position",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for &id in chunk {
                query = query.bind(id);
            }
            let rows = query.fetch_all(&self.pool).await?;
            for row in &rows {
                headers.entry(row.get("message_id")).or_default().push(Header {
                    position: row.get("position"),
                    field: row.get("field"),
                    value: row.get("value"),
                });
            }
        }
        for message in &mut messages {
            if let Some(list) = headers.remove(&message.id.0) {
                message.headers = list;
            }
        }
        Ok(messages)
    }

    /// Deletes a message row. Headers and associations go with it through
    /// foreign key cascade.
    ///
    /// Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_message(&self, id: MessageId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns the highest message id ever assigned to a live row, or
    /// `None` if the store holds no messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn max_message_id(&self) -> Result<Option<MessageId>> {
        let row = sqlx::query("SELECT MAX(id) AS max_id FROM messages")
            .fetch_one(&self.pool)
            .await?;
        let max: Option<i64> = row.get("max_id");
        Ok(max.map(MessageId::new))
    }

    // ----- tags -----

    /// Creates a tag. The name must not already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including on a name collision.
    pub async fn create_tag(&self, name: &str) -> Result<Tag> {
        let result = sqlx::query("INSERT INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let tag = Tag {
            id: TagId::new(result.last_insert_rowid()),
            name: name.to_string(),
        };
        debug!(id = %tag.id, name, "created tag");
        Ok(tag)
    }

    /// Looks a tag up by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_tag))
    }

    /// Looks a tag up by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn tag_by_id(&self, id: TagId) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name FROM tags WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_tag))
    }

    /// Lists every tag, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn tags(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_tag).collect())
    }

    /// Deletes a tag row. Its associations go with it through foreign key
    /// cascade; messages are untouched.
    ///
    /// Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_tag(&self, id: TagId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ----- associations -----

    /// Returns the names of every tag on `message`, in the order the tags
    /// were first applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn tag_names_for(&self, message: MessageId) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT t.name AS name FROM tags t
             JOIN message_tags mt ON mt.tag_id = t.id
             WHERE mt.message_id = ?
             GROUP BY t.name ORDER BY MIN(mt.id)",
        )
        .bind(message.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    /// Returns the distinct ids of every message carrying `tag`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn message_ids_with_tag(&self, tag: TagId) -> Result<Vec<MessageId>> {
        let rows = sqlx::query(
            "SELECT DISTINCT message_id FROM message_tags
             WHERE tag_id = ? ORDER BY message_id",
        )
        .bind(tag.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| MessageId::new(row.get("message_id")))
            .collect())
    }

    /// Returns every association row for `tag`, in ascending association id
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn associations_for_tag(&self, tag: TagId) -> Result<Vec<MessageTag>> {
        let rows = sqlx::query(
            "SELECT id, message_id, tag_id, deleted FROM message_tags
             WHERE tag_id = ? ORDER BY id",
        )
        .bind(tag.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_association).collect())
    }

    /// Returns the association between `message` and `tag`, if any. When
    /// duplicates exist the oldest row wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn association(&self, message: MessageId, tag: TagId) -> Result<Option<MessageTag>> {
        let row = sqlx::query(
            "SELECT id, message_id, tag_id, deleted FROM message_tags
             WHERE message_id = ? AND tag_id = ? ORDER BY id LIMIT 1",
        )
        .bind(message.0)
        .bind(tag.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_association))
    }

    /// Returns the highest association id ever assigned for `tag`, or
    /// `None` if the tag has no associations.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn max_association_id(&self, tag: TagId) -> Result<Option<AssociationId>> {
        let row = sqlx::query("SELECT MAX(id) AS max_id FROM message_tags WHERE tag_id = ?")
            .bind(tag.0)
            .fetch_one(&self.pool)
            .await?;
        let max: Option<i64> = row.get("max_id");
        Ok(max.map(AssociationId::new))
    }

    /// Counts how many of `messages` carry `tag`.
    ///
    /// The list may be arbitrarily large; lookups are issued in batches.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn count_tagged(&self, messages: &[MessageId], tag: TagId) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }
        let mut unique: Vec<i64> = messages.iter().map(|id| id.0).collect();
        unique.sort_unstable();
        unique.dedup();

        let mut total: i64 = 0;
        for chunk in unique.chunks(ID_CHUNK) {
            let sql = format!(
                "SELECT COUNT(DISTINCT message_id) AS tagged FROM message_tags
                 WHERE tag_id = ? AND message_id IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql).bind(tag.0);
            for &id in chunk {
                query = query.bind(id);
            }
            let row = query.fetch_one(&self.pool).await?;
            total += row.get::<i64, _>("tagged");
        }
        Ok(usize::try_from(total).unwrap_or(0))
    }

    // ----- folders -----

    /// Saves a folder definition. The path must not already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including on a path collision.
    pub async fn insert_folder(&self, path: &str, query: &str) -> Result<Folder> {
        let result = sqlx::query("INSERT INTO folders (path, query) VALUES (?, ?)")
            .bind(path)
            .bind(query)
            .execute(&self.pool)
            .await?;
        let folder = Folder {
            id: FolderId::new(result.last_insert_rowid()),
            path: path.to_string(),
            query: query.to_string(),
        };
        debug!(id = %folder.id, path, "saved folder");
        Ok(folder)
    }

    /// Looks a folder definition up by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn folder_by_path(&self, path: &str) -> Result<Option<Folder>> {
        let row = sqlx::query("SELECT id, path, query FROM folders WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_folder))
    }

    /// Lists every folder definition, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn folders(&self) -> Result<Vec<Folder>> {
        let rows = sqlx::query("SELECT id, path, query FROM folders ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_folder).collect())
    }

    /// Deletes a folder definition. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_folder(&self, id: FolderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// SQLite caps bind variables per statement at 999 in its oldest default
// build. Chunks of this size leave room for the non-id binds.
const ID_CHUNK: usize = 900;

pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn row_to_message(row: &SqliteRow) -> Message {
    Message {
        id: MessageId::new(row.get("id")),
        body: row.get("body"),
        length: row.get("length"),
        deleted: row.get("deleted"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at")),
        headers: Vec::new(),
    }
}

pub(crate) fn row_to_tag(row: &SqliteRow) -> Tag {
    Tag {
        id: TagId::new(row.get("id")),
        name: row.get("name"),
    }
}

pub(crate) fn row_to_association(row: &SqliteRow) -> MessageTag {
    MessageTag {
        id: AssociationId::new(row.get("id")),
        message_id: MessageId::new(row.get("message_id")),
        tag_id: TagId::new(row.get("tag_id")),
        deleted: row.get("deleted"),
    }
}

fn row_to_folder(row: &SqliteRow) -> Folder {
    Folder {
        id: FolderId::new(row.get("id")),
        path: row.get("path"),
        query: row.get("query"),
    }
}

// Timestamps are written by this store, so a malformed value only shows up
// if the file was edited by hand. Fall back to the epoch rather than losing
// the row.
fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
