//! Migration of a single closure record.

use bson::Document;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::ClosureRecord;
use crate::report::{FailedInsert, WorkerOutcome};
use crate::store::DocumentStore;
use crate::transform::MigrationPlan;

/// Shared, cheaply clonable state handed to every worker.
#[derive(Clone)]
pub struct WorkerContext {
    store: Arc<dyn DocumentStore>,
    insert_timeout: Option<Duration>,
}

impl WorkerContext {
    /// Creates a context writing to `store`.
    pub fn new(store: Arc<dyn DocumentStore>, insert_timeout: Option<Duration>) -> Self {
        Self {
            store,
            insert_timeout,
        }
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<()> {
        let insert = self.store.insert_one(collection, document);
        match self.insert_timeout {
            Some(timeout) => tokio::time::timeout(timeout, insert)
                .await
                .map_err(|_| Error::InsertTimeout {
                    collection: collection.to_string(),
                    timeout,
                })?,
            None => insert.await,
        }
    }
}

/// Copies every checkin of `record` into its year collection, then writes
/// the reduced closure.
///
/// Each write is attempted exactly once. A failed checkin is left out of the
/// closure's reference list; the closure write is attempted regardless.
/// Nothing already written is rolled back.
pub async fn migrate_closure(ctx: &WorkerContext, record: ClosureRecord) -> WorkerOutcome {
    let mut plan = MigrationPlan::from_record(record);
    let mut outcome = WorkerOutcome {
        closure_id: plan.closure_id.clone(),
        ..Default::default()
    };

    let checkins = std::mem::take(&mut plan.checkins);
    let mut migrated_ids = Vec::with_capacity(checkins.len());
    for write in checkins {
        match ctx.insert(&write.collection, write.document).await {
            Ok(()) => {
                outcome.checkins_migrated += 1;
                migrated_ids.push(write.checkin_id);
            }
            Err(e) => {
                warn!(
                    closure_id = %plan.closure_id,
                    checkin_id = %write.checkin_id,
                    collection = %write.collection,
                    error = %e,
                    "Failed to insert checkin"
                );
                outcome.failures.push(FailedInsert {
                    closure_id: plan.closure_id.clone(),
                    checkin_id: Some(write.checkin_id),
                    collection: write.collection,
                    error: e.to_string(),
                });
            }
        }
    }

    let reduced = plan.reduced(migrated_ids);
    let result = match reduced.to_document() {
        Ok(document) => ctx.insert(&plan.closure_collection, document).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            outcome.closure_migrated = true;
            debug!(
                closure_id = %plan.closure_id,
                collection = %plan.closure_collection,
                checkins = reduced.checkin_ids.len(),
                "Closure migrated"
            );
        }
        Err(e) => {
            warn!(
                closure_id = %plan.closure_id,
                collection = %plan.closure_collection,
                error = %e,
                "Failed to insert closure"
            );
            outcome.failures.push(FailedInsert {
                closure_id: plan.closure_id.clone(),
                checkin_id: None,
                collection: plan.closure_collection.clone(),
                error: e.to_string(),
            });
        }
    }

    outcome
}
