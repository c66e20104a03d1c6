//! Document store abstraction.
//!
//! The migration engine only needs four operations from the store: a health
//! check, an (approximate) count, a streaming read of a whole collection, and
//! single-document inserts into a collection chosen by name at call time.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Stream of raw documents read from a collection.
///
/// The underlying cursor is released when the stream is dropped.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// Trait for document stores the engine reads from and writes to.
///
/// Implementations must tolerate concurrent calls from every worker.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get the store type name.
    fn store_type(&self) -> &'static str;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Count documents in `collection`, using the `hint` index when given.
    async fn count(&self, collection: &str, hint: Option<&str>) -> Result<u64>;

    /// Open a streaming cursor over every document in `collection`.
    async fn stream_all(&self, collection: &str) -> Result<DocumentStream>;

    /// Insert a single document into `collection`.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<()>;

    /// Close the connection and cleanup resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Store wrapper that reads from the inner store and discards every write.
pub struct DryRunStore {
    inner: Arc<dyn DocumentStore>,
}

impl DryRunStore {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DocumentStore for DryRunStore {
    fn store_type(&self) -> &'static str {
        self.inner.store_type()
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn count(&self, collection: &str, hint: Option<&str>) -> Result<u64> {
        self.inner.count(collection, hint).await
    }

    async fn stream_all(&self, collection: &str) -> Result<DocumentStream> {
        self.inner.stream_all(collection).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        debug!(
            collection,
            id = ?document.get("_id"),
            "Dry run: skipping insert"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_dry_run_reads_but_does_not_write() {
        // Arrange
        let inner = Arc::new(
            MemoryStore::new().with_documents("cierre", vec![doc! { "_id": "c-1" }]),
        );
        let store = DryRunStore::new(inner.clone());

        // Act
        let docs: Vec<Document> = store
            .stream_all("cierre")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        store
            .insert_one("cierres_2022", doc! { "_id": "c-1" })
            .await
            .unwrap();

        // Assert
        assert_eq!(docs.len(), 1);
        assert_eq!(store.count("cierre", None).await.unwrap(), 1);
        assert!(inner.documents("cierres_2022").is_empty());
        assert!(inner.insert_attempts().is_empty());
    }
}
