//! # tagbox-mailbox
//!
//! Virtual mailboxes over a shared, tagged message store, shaped for an
//! IMAP-style front end.
//!
//! This crate provides:
//! - A boolean query language over tags and its evaluator
//! - Tag-backed mailboxes (the messages carrying one tag)
//! - Query-backed mailboxes (saved searches that act like folders)
//! - Sequence-number and UID addressing over immutable open snapshots
//! - Flag stores where flags are tags, applied in one transaction
//! - The [`TagRegistry`] and [`FolderCatalog`] management surfaces
//!
//! The hosting protocol server owns parsing, sessions, and message
//! ingestion; this crate owns what a mailbox *is*.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod catalog;
mod error;
mod flags;
mod mailbox;
mod query;
mod registry;
mod sets;

pub use catalog::FolderCatalog;
pub use error::{Error, Result};
pub use flags::{Flag, KEYWORD_WILDCARD, StoreMode};
pub use mailbox::{Mailbox, QueryMailbox, TagMailbox};
pub use query::{Query, evaluate};
pub use registry::TagRegistry;
pub use sets::MessageSet;

pub use tagbox_store::{
    AssociationId, Folder, FolderId, Header, Message, MessageId, MessageStore, MessageTag,
    NewMessage, Tag, TagId,
};
