//! # tagbox-store
//!
//! SQLite persistence layer for the tagbox mailbox engine.
//!
//! This crate provides:
//! - A shared message table with ordered headers
//! - Tags and message/tag associations (the folder membership primitive)
//! - Saved folder queries
//! - `MessageStore` for pooled reads and single-statement writes
//! - `StoreTx` for multi-statement writes with all-or-nothing commit
//!
//! All primary keys are `AUTOINCREMENT`, so ids are monotonic and never
//! reused. Callers treat them as stable identities (protocol UIDs).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
mod model;
mod store;
mod tx;

pub use error::{Error, Result};
pub use model::{
    AssociationId, Folder, FolderId, Header, Message, MessageId, MessageTag, NewMessage, Tag, TagId,
};
pub use store::MessageStore;
pub use tx::StoreTx;
