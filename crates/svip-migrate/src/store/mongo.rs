//! MongoDB document store.
//!
//! Uses the official driver. Destination collection handles are cached by
//! name since the per-year set is small and reused by every worker.

use async_trait::async_trait;
use bson::{doc, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::options::{Hint, ReadPreference, SelectionCriteria};
use mongodb::{Client, Collection, Database};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::store::{DocumentStore, DocumentStream};

/// MongoDB-backed store bound to a single database.
pub struct MongoStore {
    client: Client,
    database: Database,
    collections: RwLock<HashMap<String, Collection<Document>>>,
}

impl MongoStore {
    /// Creates the client for `config`.
    ///
    /// The driver connects lazily; call [`DocumentStore::ping`] to verify
    /// the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceConnection`] if the URI is invalid or cannot be resolved.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| Error::SourceConnection(format!("MongoDB connect failed: {e}")))?;
        let database = client.database(&config.database);

        info!(database = %config.database, "MongoDB client created");

        Ok(Self {
            client,
            database,
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the cached handle for `name`, creating it on first use.
    fn collection(&self, name: &str) -> Collection<Document> {
        if let Some(collection) = self.collections.read().get(name) {
            return collection.clone();
        }
        self.collections
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(collection = name, "Opening collection handle");
                self.database.collection(name)
            })
            .clone()
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn store_type(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .selection_criteria(SelectionCriteria::ReadPreference(ReadPreference::Primary))
            .await
            .map_err(|e| Error::SourceConnection(format!("MongoDB ping failed: {e}")))?;
        Ok(())
    }

    async fn count(&self, collection: &str, hint: Option<&str>) -> Result<u64> {
        let handle = self.collection(collection);
        let mut action = handle.count_documents(doc! {});
        if let Some(index) = hint {
            action = action.hint(Hint::Name(index.to_string()));
        }
        action.await.map_err(|e| Error::Count {
            collection: collection.to_string(),
            message: e.to_string(),
        })
    }

    async fn stream_all(&self, collection: &str) -> Result<DocumentStream> {
        let cursor = self
            .collection(collection)
            .find(doc! {})
            .await
            .map_err(|e| Error::CursorOpen {
                collection: collection.to_string(),
                message: e.to_string(),
            })?;

        Ok(cursor
            .map_err(|e| Error::CursorRead(e.to_string()))
            .boxed())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        self.collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| Error::insert(collection, e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.collections.write().clear();
        self.client.clone().shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on port 1; server selection gives up after 100ms.
    fn unreachable() -> SourceConfig {
        SourceConfig {
            uri: "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=100&connectTimeoutMS=100"
                .to_string(),
            ..SourceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_count_against_unreachable_server() {
        // Arrange
        let store = MongoStore::connect(&unreachable()).await.unwrap();

        // Act
        let hinted = store.count("cierre", Some("_id_")).await;
        let plain = store.count("cierre", None).await;

        // Assert
        assert!(matches!(hinted, Err(Error::Count { ref collection, .. }) if collection == "cierre"));
        assert!(matches!(plain, Err(Error::Count { .. })));
    }

    #[tokio::test]
    async fn test_collection_handles_are_cached() {
        let store = MongoStore::connect(&unreachable()).await.unwrap();

        store.collection("checkins_2021");
        store.collection("checkins_2021");
        store.collection("cierres_2021");

        assert_eq!(store.collections.read().len(), 2);
        store.close().await.unwrap();
        assert!(store.collections.read().is_empty());
    }
}
