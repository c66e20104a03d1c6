//! Streaming reader over the source collection.

use futures::StreamExt;
use tracing::warn;

use crate::error::{Error, Result};
use crate::record::ClosureRecord;
use crate::store::{DocumentStore, DocumentStream};

/// One position of the source cursor.
#[derive(Debug)]
pub enum ReadItem {
    /// A decoded closure record.
    Record(ClosureRecord),
    /// The document could not be decoded and was skipped.
    Skipped(Error),
}

/// Decodes closure records lazily from a server-side cursor.
///
/// The cursor is owned by the reader and released when the reader is
/// dropped, whichever way the read loop ends.
pub struct SourceReader {
    stream: DocumentStream,
    pulled: u64,
}

impl SourceReader {
    /// Opens a cursor over `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be opened.
    pub async fn open(store: &dyn DocumentStore, collection: &str) -> Result<Self> {
        let stream = store.stream_all(collection).await?;
        Ok(Self { stream, pulled: 0 })
    }

    /// Advances the cursor.
    ///
    /// Returns `Ok(None)` at the end of the stream. Record-scoped failures
    /// (see [`Error::is_fatal`]) are logged and yielded as
    /// [`ReadItem::Skipped`].
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor itself fails.
    pub async fn next_record(&mut self) -> Result<Option<ReadItem>> {
        let Some(document) = self.stream.next().await.transpose()? else {
            return Ok(None);
        };
        self.pulled += 1;

        match ClosureRecord::from_document(document) {
            Ok(record) => Ok(Some(ReadItem::Record(record))),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable closure record");
                Ok(Some(ReadItem::Skipped(e)))
            }
        }
    }

    /// Number of documents pulled from the cursor so far.
    #[must_use]
    pub fn pulled(&self) -> u64 {
        self.pulled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use bson::doc;

    #[tokio::test]
    async fn test_reader_skips_undecodable_records() {
        // Arrange
        let store = MemoryStore::new().with_documents(
            "cierre",
            vec![
                doc! { "_id": "c-1" },
                doc! { "_id": "c-2", "envio": "garbage" },
                doc! { "_id": "c-3" },
            ],
        );
        let mut reader = SourceReader::open(&store, "cierre").await.unwrap();

        // Act
        let mut decoded = Vec::new();
        let mut skipped = 0;
        while let Some(item) = reader.next_record().await.unwrap() {
            match item {
                ReadItem::Record(record) => decoded.push(record.id),
                ReadItem::Skipped(_) => skipped += 1,
            }
        }

        // Assert
        assert_eq!(decoded, vec!["c-1", "c-3"]);
        assert_eq!(skipped, 1);
        assert_eq!(reader.pulled(), 3);
    }

    #[tokio::test]
    async fn test_reader_releases_cursor_on_drop() {
        let store = MemoryStore::new().with_documents("cierre", vec![doc! { "_id": "c-1" }]);

        let reader = SourceReader::open(&store, "cierre").await.unwrap();
        assert_eq!(store.open_cursors(), 1);

        drop(reader);
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_reader_surfaces_cursor_failure() {
        let store = MemoryStore::new()
            .with_documents("cierre", vec![doc! { "_id": "c-1" }, doc! { "_id": "c-2" }])
            .failing_stream_after(1);
        let mut reader = SourceReader::open(&store, "cierre").await.unwrap();

        assert!(matches!(
            reader.next_record().await,
            Ok(Some(ReadItem::Record(_)))
        ));
        assert!(matches!(reader.next_record().await, Err(Error::CursorRead(_))));
        assert_eq!(reader.pulled(), 1);
    }

    #[tokio::test]
    async fn test_reader_open_failure() {
        let store = MemoryStore::new().failing_stream_open();
        let result = SourceReader::open(&store, "cierre").await;
        assert!(matches!(result, Err(Error::CursorOpen { .. })));
    }
}
