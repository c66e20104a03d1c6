//! Migration pipeline orchestration.
//!
//! One control loop pulls closure records off the source cursor and hands
//! each to a worker task once an admission slot is free. Workers run on a
//! [`JoinSet`] owned by the loop; the run only reports completion after that
//! set has been drained.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::admission::AdmissionGate;
use crate::config::{MigrationConfig, SourceConfig};
use crate::error::Result;
use crate::reader::{ReadItem, SourceReader};
use crate::report::{group_thousands, MigrationReport, WorkerOutcome};
use crate::retry::{with_retry, RetryConfig};
use crate::store::{DocumentStore, DryRunStore};
use crate::worker::{migrate_closure, WorkerContext};

/// Migration pipeline.
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    source: SourceConfig,
    concurrency: usize,
    insert_timeout: Option<Duration>,
    strict_count: bool,
    setup_retry: RetryConfig,
    progress: Option<ProgressBar>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a new migration pipeline over `store`.
    ///
    /// In dry-run mode the store is wrapped so that no write reaches it.
    pub fn new(store: Arc<dyn DocumentStore>, config: &MigrationConfig) -> Self {
        let store: Arc<dyn DocumentStore> = if config.options.dry_run {
            info!("Dry run mode - not writing to destination");
            Arc::new(DryRunStore::new(store))
        } else {
            store
        };

        Self {
            store,
            source: config.source.clone(),
            concurrency: config.options.concurrency.max(1),
            insert_timeout: config.options.insert_timeout(),
            strict_count: config.options.strict_count,
            setup_retry: RetryConfig::for_setup(config.options.setup_retries),
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `progress` instead of a terminal progress bar.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Override the per-insert timeout.
    #[must_use]
    pub fn with_insert_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.insert_timeout = timeout;
        self
    }

    /// Override the retry policy for setup steps.
    #[must_use]
    pub fn with_setup_retry(mut self, retry: RetryConfig) -> Self {
        self.setup_retry = retry;
        self
    }

    /// Token that stops new dispatches when cancelled.
    ///
    /// Workers already running finish normally and are waited for.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the migration pipeline.
    ///
    /// Per-record failures are collected in the returned report and never
    /// abort the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be counted (strict mode only),
    /// the cursor cannot be opened, or the cursor fails mid-stream. In the
    /// last case every dispatched worker is still waited for first.
    pub async fn run(&self) -> Result<MigrationReport> {
        let start = Instant::now();
        let mut report = MigrationReport::default();

        info!(
            collection = %self.source.collection,
            concurrency = self.concurrency,
            store = self.store.store_type(),
            "Starting migration pipeline"
        );

        let total = self.count_source().await?;
        let progress = self
            .progress
            .clone()
            .unwrap_or_else(|| create_progress_bar(total));

        let mut reader = SourceReader::open(self.store.as_ref(), &self.source.collection).await?;
        let gate = AdmissionGate::new(self.concurrency);
        let ctx = WorkerContext::new(Arc::clone(&self.store), self.insert_timeout);
        let mut workers: JoinSet<WorkerOutcome> = JoinSet::new();

        // Cancellation closes the gate, which wakes a dispatch blocked on a
        // full pool. The guard ends the watcher on every exit path.
        let watcher = self.cancel.child_token();
        let _watcher_guard = watcher.clone().drop_guard();
        tokio::spawn({
            let gate = gate.clone();
            let cancel = self.cancel.clone();
            async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => gate.close(),
                    () = watcher.cancelled() => {}
                }
            }
        });

        let stream_result = loop {
            while let Some(joined) = workers.try_join_next() {
                report.absorb(joined);
            }

            let item = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    report.cancelled = true;
                    break Ok(());
                }
                item = reader.next_record() => item,
            };

            let record = match item {
                Ok(Some(ReadItem::Record(record))) => record,
                Ok(Some(ReadItem::Skipped(_))) => {
                    report.skipped += 1;
                    progress.inc(1);
                    continue;
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            progress.inc(1);

            let Ok(slot) = gate.acquire().await else {
                report.cancelled = true;
                report.abandoned += 1;
                break Ok(());
            };

            let ctx = ctx.clone();
            workers.spawn(async move {
                let _slot = slot;
                migrate_closure(&ctx, record).await
            });
            report.dispatched += 1;
        };

        report.pulled = reader.pulled();
        drop(reader);

        if report.cancelled {
            warn!(
                in_flight = workers.len(),
                "Cancelled - no new records will be dispatched, waiting for in-flight workers"
            );
        }
        while let Some(joined) = workers.join_next().await {
            report.absorb(joined);
        }

        report.peak_in_flight = gate.peak();
        report.duration_secs = start.elapsed().as_secs_f64();

        match &stream_result {
            Ok(()) if report.cancelled => progress.abandon_with_message("Migration cancelled"),
            Ok(()) => progress.finish_with_message("Migration complete"),
            Err(e) => {
                progress.abandon_with_message("Migration aborted");
                error!(error = %e, "Source cursor failed");
            }
        }
        report.log_summary();

        stream_result.map(|()| report)
    }

    async fn count_source(&self) -> Result<Option<u64>> {
        let collection = self.source.collection.as_str();
        let hint = self.source.count_hint.as_deref();
        let start = Instant::now();

        info!(collection, "Counting documents to migrate");
        let counted = with_retry(&self.setup_retry, "count", || {
            self.store.count(collection, hint)
        })
        .await;

        match counted {
            Ok(total) => {
                info!(
                    elapsed = ?start.elapsed(),
                    "Total documents to migrate: {}",
                    group_thousands(total)
                );
                Ok(Some(total))
            }
            Err(e) if self.strict_count => {
                error!(error = %e, "Count failed");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Count failed, progress will be indeterminate");
                Ok(None)
            }
        }
    }
}

fn create_progress_bar(total: Option<u64>) -> ProgressBar {
    let pb = match total {
        Some(total) if total > 0 => ProgressBar::new(total),
        _ => ProgressBar::new_spinner(),
    };

    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    pb
}
