//! In-memory document store.
//!
//! Collections are plain vectors and inserts append without enforcing `_id`
//! uniqueness. Failure injection and concurrency instrumentation make it the
//! store of choice for engine tests and benchmarks.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::store::{DocumentStore, DocumentStream};

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<String, Vec<Document>>,
    insert_attempts: Vec<(String, Option<Bson>)>,
    failing_inserts: HashSet<(Option<String>, String)>,
    stalled_inserts: HashSet<String>,
}

/// Store keeping every collection in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    insert_latency: Duration,
    fail_ping: bool,
    fail_count: bool,
    fail_stream_open: bool,
    fail_stream_after: Option<usize>,
    open_cursors: Arc<AtomicUsize>,
    inserts_in_flight: AtomicUsize,
    peak_inserts_in_flight: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `collection` with `documents`.
    #[must_use]
    pub fn with_documents(self, collection: &str, documents: Vec<Document>) -> Self {
        self.state
            .lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
        self
    }

    /// Delays every insert by `latency`.
    #[must_use]
    pub fn with_insert_latency(mut self, latency: Duration) -> Self {
        self.insert_latency = latency;
        self
    }

    /// Makes `ping` fail.
    #[must_use]
    pub fn failing_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    /// Makes `count` fail.
    #[must_use]
    pub fn failing_count(mut self) -> Self {
        self.fail_count = true;
        self
    }

    /// Makes `stream_all` fail to open.
    #[must_use]
    pub fn failing_stream_open(mut self) -> Self {
        self.fail_stream_open = true;
        self
    }

    /// Makes every stream fail after yielding `n` documents.
    #[must_use]
    pub fn failing_stream_after(mut self, n: usize) -> Self {
        self.fail_stream_after = Some(n);
        self
    }

    /// Rejects inserts of the document with `_id == id` into `collection`.
    #[must_use]
    pub fn failing_insert(self, collection: &str, id: &str) -> Self {
        self.state
            .lock()
            .failing_inserts
            .insert((Some(collection.to_string()), id.to_string()));
        self
    }

    /// Rejects inserts of the document with `_id == id` into any collection.
    #[must_use]
    pub fn failing_insert_id(self, id: &str) -> Self {
        self.state
            .lock()
            .failing_inserts
            .insert((None, id.to_string()));
        self
    }

    /// Makes inserts of the document with `_id == id` never complete.
    #[must_use]
    pub fn stalled_insert_id(self, id: &str) -> Self {
        self.state.lock().stalled_inserts.insert(id.to_string());
        self
    }

    /// Documents currently stored in `collection`.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// String `_id`s stored in `collection`, in insertion order.
    #[must_use]
    pub fn ids(&self, collection: &str) -> Vec<String> {
        self.documents(collection)
            .iter()
            .filter_map(|doc| doc.get_str("_id").ok().map(String::from))
            .collect()
    }

    /// Names of all non-empty collections.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.state
            .lock()
            .collections
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Every insert attempt as `(collection, _id)`, in call order.
    #[must_use]
    pub fn insert_attempts(&self) -> Vec<(String, Option<Bson>)> {
        self.state.lock().insert_attempts.clone()
    }

    /// Number of streams that have not been dropped yet.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Highest number of inserts observed running at the same time.
    #[must_use]
    pub fn peak_inserts_in_flight(&self) -> usize {
        self.peak_inserts_in_flight.load(Ordering::SeqCst)
    }
}

struct CursorGuard(Arc<AtomicUsize>);

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn store_type(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        if self.fail_ping {
            return Err(Error::SourceConnection("ping failed".to_string()));
        }
        Ok(())
    }

    async fn count(&self, collection: &str, _hint: Option<&str>) -> Result<u64> {
        if self.fail_count {
            return Err(Error::Count {
                collection: collection.to_string(),
                message: "count failed".to_string(),
            });
        }
        Ok(self
            .state
            .lock()
            .collections
            .get(collection)
            .map_or(0, |docs| docs.len() as u64))
    }

    async fn stream_all(&self, collection: &str) -> Result<DocumentStream> {
        if self.fail_stream_open {
            return Err(Error::CursorOpen {
                collection: collection.to_string(),
                message: "cursor open failed".to_string(),
            });
        }

        let mut items: Vec<Result<Document>> = self
            .documents(collection)
            .into_iter()
            .map(Ok)
            .collect();
        if let Some(n) = self.fail_stream_after {
            items.truncate(n);
            items.push(Err(Error::CursorRead("connection reset".to_string())));
        }

        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        let guard = CursorGuard(Arc::clone(&self.open_cursors));
        let stream = futures::stream::iter(items).map(move |item| {
            let _cursor = &guard;
            item
        });
        Ok(stream.boxed())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        let now = self.inserts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_inserts_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlightGuard(&self.inserts_in_flight);

        if !self.insert_latency.is_zero() {
            tokio::time::sleep(self.insert_latency).await;
        }

        let id = document.get("_id").cloned();
        let id_str = id.as_ref().and_then(Bson::as_str).map(String::from);

        let stalled = {
            let mut state = self.state.lock();
            state.insert_attempts.push((collection.to_string(), id.clone()));
            id_str
                .as_ref()
                .is_some_and(|id| state.stalled_inserts.contains(id))
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        if let Some(id) = id_str {
            let rejected = state
                .failing_inserts
                .contains(&(Some(collection.to_string()), id.clone()))
                || state.failing_inserts.contains(&(None, id.clone()));
            if rejected {
                return Err(Error::insert(
                    collection,
                    format!("injected failure for _id {id}"),
                ));
            }
        }
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }
}
