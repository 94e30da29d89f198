//! The folder catalog: queries saved under protocol paths.

use tagbox_store::{Folder, MessageStore};
use tracing::debug;

use crate::error::{Error, Result};
use crate::mailbox::QueryMailbox;
use crate::query::Query;

/// Saved folder definitions, each binding a path to a query.
///
/// The catalog stores queries as JSON and does not judge them: a query
/// that is malformed or references missing tags fails when the folder is
/// opened, not when it is saved.
#[derive(Debug, Clone)]
pub struct FolderCatalog {
    store: MessageStore,
}

impl FolderCatalog {
    /// Creates a catalog over `store`.
    #[must_use]
    pub const fn new(store: MessageStore) -> Self {
        Self { store }
    }

    /// Saves `query` under `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if the path is taken, including
    /// when a concurrent save wins the race, or an error if the store
    /// fails.
    pub async fn save(&self, path: &str, query: &Query) -> Result<Folder> {
        if self.store.folder_by_path(path).await?.is_some() {
            return Err(Error::DuplicateName(path.to_string()));
        }
        let json = serde_json::to_string(query)
            .map_err(|e| Error::InvalidQuery(format!("cannot serialize query: {e}")))?;
        let folder = match self.store.insert_folder(path, &json).await {
            Ok(folder) => folder,
            Err(error) if error.is_unique_violation() => {
                return Err(Error::DuplicateName(path.to_string()));
            }
            Err(error) => return Err(error.into()),
        };
        debug!(path, query = %query, "saved folder");
        Ok(folder)
    }

    /// Opens the mailbox for the folder saved under `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no folder has this path or its query
    /// references missing tags, [`Error::InvalidQuery`] if the stored
    /// query does not decode or is malformed, or an error if the store
    /// fails.
    pub async fn open(&self, path: &str) -> Result<QueryMailbox> {
        let folder = self.lookup(path).await?;
        let query: Query = serde_json::from_str(&folder.query)
            .map_err(|e| Error::InvalidQuery(format!("stored query for '{path}': {e}")))?;
        QueryMailbox::open(self.store.clone(), query).await
    }

    /// Lists every saved folder, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list(&self) -> Result<Vec<Folder>> {
        Ok(self.store.folders().await?)
    }

    /// Removes the folder saved under `path`. The tags its query mentions
    /// are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no folder has this path, or an error
    /// if the store fails.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let folder = self.lookup(path).await?;
        self.store.delete_folder(folder.id).await?;
        debug!(path, "deleted folder");
        Ok(())
    }

    async fn lookup(&self, path: &str) -> Result<Folder> {
        self.store
            .folder_by_path(path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("folder '{path}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Query {
        Query::Name(s.to_string())
    }

    async fn catalog() -> (FolderCatalog, MessageStore) {
        let store = MessageStore::in_memory().await.unwrap();
        (FolderCatalog::new(store.clone()), store)
    }

    #[tokio::test]
    async fn saved_queries_round_trip_through_json() {
        let (catalog, store) = catalog().await;
        store.create_tag("work").await.unwrap();
        store.create_tag("urgent").await.unwrap();

        let query = Query::Compound(vec![name("work"), name("&"), name("urgent")]);
        catalog.save("flagged/work", &query).await.unwrap();

        let mailbox = catalog.open("flagged/work").await.unwrap();
        assert_eq!(mailbox.query(), &query);
    }

    #[tokio::test]
    async fn duplicate_paths_are_rejected() {
        let (catalog, store) = catalog().await;
        store.create_tag("a").await.unwrap();
        catalog.save("inbox", &name("a")).await.unwrap();
        let err = catalog.save("inbox", &name("a")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateName(_)), "got {err}");
    }

    #[tokio::test]
    async fn concurrent_saves_yield_one_folder_and_one_duplicate_error() {
        let (catalog, store) = catalog().await;
        store.create_tag("a").await.unwrap();
        let query = name("a");
        let (x, y) = tokio::join!(
            catalog.save("inbox", &query),
            catalog.save("inbox", &query),
        );
        let (folder, err) = match (x, y) {
            (Ok(folder), Err(err)) | (Err(err), Ok(folder)) => (folder, err),
            other => panic!("expected exactly one success, got {other:?}"),
        };
        assert_eq!(folder.path, "inbox");
        assert!(matches!(err, Error::DuplicateName(_)), "got {err}");
        assert_eq!(catalog.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_ordered_by_path() {
        let (catalog, _) = catalog().await;
        catalog.save("b", &name("x")).await.unwrap();
        catalog.save("a", &name("x")).await.unwrap();
        let paths: Vec<String> = catalog
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(paths, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn missing_paths_are_not_found() {
        let (catalog, _) = catalog().await;
        assert!(matches!(
            catalog.open("nope").await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            catalog.delete("nope").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn undecodable_stored_queries_surface_as_invalid() {
        let (catalog, store) = catalog().await;
        store.insert_folder("broken", "not json at all").await.unwrap();
        let err = catalog.open("broken").await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)), "got {err}");
    }

    #[tokio::test]
    async fn deleting_a_folder_spares_its_tags() {
        let (catalog, store) = catalog().await;
        store.create_tag("keep").await.unwrap();
        catalog.save("view", &name("keep")).await.unwrap();
        catalog.delete("view").await.unwrap();
        assert!(store.tag_by_name("keep").await.unwrap().is_some());
        assert!(catalog.list().await.unwrap().is_empty());
    }
}
