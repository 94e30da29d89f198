//! The tag registry: named-tag CRUD and the advertised flag namespace.

use tagbox_store::{MessageStore, Tag, TagId};
use tracing::debug;

use crate::error::{Error, Result};
use crate::flags::{Flag, KEYWORD_WILDCARD};
use crate::mailbox::TagMailbox;

/// Creation, lookup, and deletion of tags, and the door to tag-backed
/// mailboxes.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    store: MessageStore,
}

impl TagRegistry {
    /// Creates a registry over `store`.
    #[must_use]
    pub const fn new(store: MessageStore) -> Self {
        Self { store }
    }

    /// Creates a tag with a name not yet in use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if the name exists, including when
    /// a concurrent create wins the race, or an error if the store fails.
    pub async fn create(&self, name: &str) -> Result<Tag> {
        if self.store.tag_by_name(name).await?.is_some() {
            return Err(Error::DuplicateName(name.to_string()));
        }
        match self.store.create_tag(name).await {
            Ok(tag) => Ok(tag),
            Err(error) if error.is_unique_violation() => {
                Err(Error::DuplicateName(name.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Looks a tag up by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no tag has this name, or an error if
    /// the store fails.
    pub async fn get(&self, name: &str) -> Result<Tag> {
        self.store
            .tag_by_name(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tag '{name}'")))
    }

    /// Looks a tag up by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no tag has this id, or an error if
    /// the store fails.
    pub async fn get_by_id(&self, id: TagId) -> Result<Tag> {
        self.store
            .tag_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tag id {id}")))
    }

    /// Lists every tag, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list(&self) -> Result<Vec<Tag>> {
        Ok(self.store.tags().await?)
    }

    /// Deletes a tag outright: the name, the id, and every membership
    /// association go away. Recreating the name later yields a fresh id,
    /// which is what moves the UIDVALIDITY of the corresponding mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the tag no longer exists, or an
    /// error if the store fails.
    pub async fn delete(&self, tag: &Tag) -> Result<()> {
        if !self.store.delete_tag(tag.id).await? {
            return Err(Error::NotFound(format!("tag '{}'", tag.name)));
        }
        debug!(tag = %tag.name, "deleted tag");
        Ok(())
    }

    /// Opens the mailbox backed by the named tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no tag has this name, or an error if
    /// the store fails.
    pub async fn open(&self, name: &str) -> Result<TagMailbox> {
        let tag = self.get(name).await?;
        TagMailbox::open(self.store.clone(), tag).await
    }

    /// The flag namespace: reserved system flags first, then every tag
    /// name, then the keyword wildcard.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn flags(&self) -> Result<Vec<String>> {
        flag_namespace(&self.store).await
    }
}

pub(crate) async fn flag_namespace(store: &MessageStore) -> Result<Vec<String>> {
    let mut flags: Vec<String> = Flag::RESERVED
        .iter()
        .map(|flag| flag.as_str().to_string())
        .collect();
    for tag in store.tags().await? {
        if !flags.contains(&tag.name) {
            flags.push(tag.name);
        }
    }
    if !flags.iter().any(|existing| existing == KEYWORD_WILDCARD) {
        flags.push(KEYWORD_WILDCARD.to_string());
    }
    Ok(flags)
}
