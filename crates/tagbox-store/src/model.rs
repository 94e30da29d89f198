//! Row types for messages, headers, tags, associations, and folders.

use chrono::{DateTime, Utc};

/// Unique identifier for a message.
///
/// Drawn from an `AUTOINCREMENT` column, so ids grow monotonically and are
/// never reused after deletion. Query-backed mailboxes expose this value
/// directly as the protocol UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Creates a new message ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a tag.
///
/// Doubles as the UIDVALIDITY of the mailbox backed by that tag, which is
/// why deleting and recreating a tag must yield a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagId(pub i64);

impl TagId {
    /// Creates a new tag ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message/tag association.
///
/// Tag-backed mailboxes expose this value as the protocol UID, so the same
/// monotonic, never-reused guarantee applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssociationId(pub i64);

impl AssociationId {
    /// Creates a new association ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AssociationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a saved folder definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FolderId(pub i64);

impl FolderId {
    /// Creates a new folder ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single message header field.
///
/// Headers keep their original order and may repeat (`Received`, for one),
/// so they are a positioned list rather than a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Zero-based position within the message's header block.
    pub position: i64,
    /// Field name as it appeared in the message, case preserved.
    pub field: String,
    /// Field value.
    pub value: String,
}

/// A stored message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message ID.
    pub id: MessageId,
    /// Message body.
    pub body: String,
    /// Total size of the original message in bytes.
    pub length: i64,
    /// Deletion marker on the message row itself.
    pub deleted: bool,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
    /// When the message row was last modified.
    pub updated_at: DateTime<Utc>,
    /// Ordered headers.
    pub headers: Vec<Header>,
}

impl Message {
    /// Returns the value of the first header named `field`, matched
    /// case-insensitively.
    #[must_use]
    pub fn header(&self, field: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.field.eq_ignore_ascii_case(field))
            .map(|h| h.value.as_str())
    }

    /// Returns every value of the header named `field`, in message order.
    #[must_use]
    pub fn header_values(&self, field: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| h.field.eq_ignore_ascii_case(field))
            .map(|h| h.value.as_str())
            .collect()
    }
}

/// A message to be appended to the store.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    /// Message body.
    pub body: String,
    /// Total size of the original message in bytes, as counted by the
    /// caller (the body alone does not determine it).
    pub length: i64,
    /// Header fields in original order.
    pub headers: Vec<(String, String)>,
}

/// A named tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag ID.
    pub id: TagId,
    /// Unique tag name.
    pub name: String,
}

/// A message/tag association row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTag {
    /// Association ID.
    pub id: AssociationId,
    /// The tagged message.
    pub message_id: MessageId,
    /// The tag applied to it.
    pub tag_id: TagId,
    /// Per-association deletion attribute. This is protocol state scoped to
    /// one mailbox view, not a tag of its own.
    pub deleted: bool,
}

/// A saved folder definition: a path bound to a serialized query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Folder ID.
    pub id: FolderId,
    /// Unique folder path.
    pub path: String,
    /// Serialized query expression (JSON).
    pub query: String,
}
