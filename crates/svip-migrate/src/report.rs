//! Run report: counters plus the list of writes that failed.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::error::Result;

/// An insert that did not make it into its destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedInsert {
    /// Closure the write belongs to.
    pub closure_id: String,
    /// Checkin id, `None` for the reduced closure write.
    pub checkin_id: Option<String>,
    /// Destination collection.
    pub collection: String,
    /// Store error message.
    pub error: String,
}

/// What one worker did with one closure record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// Closure identifier.
    pub closure_id: String,
    /// Checkins inserted successfully.
    pub checkins_migrated: u64,
    /// Whether the reduced closure was inserted.
    pub closure_migrated: bool,
    /// Writes that failed.
    pub failures: Vec<FailedInsert>,
}

/// Aggregated result of a migration run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Documents pulled from the source cursor.
    pub pulled: u64,
    /// Documents skipped because they could not be decoded.
    pub skipped: u64,
    /// Records pulled but never dispatched because the run was cancelled.
    pub abandoned: u64,
    /// Records handed to a worker.
    pub dispatched: u64,
    /// Workers that finished (including panicked ones).
    pub completed: u64,
    /// Checkin copies inserted.
    pub checkins_migrated: u64,
    /// Checkin copies that failed.
    pub checkins_failed: u64,
    /// Reduced closures inserted.
    pub closures_migrated: u64,
    /// Reduced closures that failed.
    pub closures_failed: u64,
    /// Workers that panicked.
    pub worker_panics: u64,
    /// Highest number of workers running at the same time.
    pub peak_in_flight: usize,
    /// Whether the run was cancelled before the stream ended.
    pub cancelled: bool,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Failed writes, for follow-up.
    pub failed_inserts: Vec<FailedInsert>,
}

impl MigrationReport {
    /// Folds a finished worker into the report.
    pub fn absorb(&mut self, joined: std::result::Result<WorkerOutcome, JoinError>) {
        self.completed += 1;
        match joined {
            Ok(outcome) => self.record(outcome),
            Err(e) => {
                self.worker_panics += 1;
                error!(error = %e, "Worker task failed");
            }
        }
    }

    /// Adds a worker outcome to the counters.
    pub fn record(&mut self, outcome: WorkerOutcome) {
        self.checkins_migrated += outcome.checkins_migrated;
        if outcome.closure_migrated {
            self.closures_migrated += 1;
        }
        for failure in outcome.failures {
            if failure.checkin_id.is_some() {
                self.checkins_failed += 1;
            } else {
                self.closures_failed += 1;
            }
            self.failed_inserts.push(failure);
        }
    }

    /// Workers dispatched but not yet completed.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.dispatched.saturating_sub(self.completed)
    }

    /// `true` if nothing was skipped, failed, panicked or cancelled.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped == 0
            && self.failed_inserts.is_empty()
            && self.worker_panics == 0
            && !self.cancelled
    }

    /// Calculate throughput (closures per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.completed as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// Logs the run summary.
    pub fn log_summary(&self) {
        info!(
            pulled = self.pulled,
            skipped = self.skipped,
            dispatched = self.dispatched,
            completed = self.completed,
            checkins_migrated = self.checkins_migrated,
            checkins_failed = self.checkins_failed,
            closures_migrated = self.closures_migrated,
            closures_failed = self.closures_failed,
            worker_panics = self.worker_panics,
            peak_in_flight = self.peak_in_flight,
            cancelled = self.cancelled,
            "Migration finished in {:.2}s ({:.0} closures/sec)",
            self.duration_secs,
            self.throughput()
        );
    }

    /// Writes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Formats `n` with thousands separators (`1234567` -> `1,234,567`).
#[must_use]
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(checkin_id: Option<&str>, collection: &str) -> FailedInsert {
        FailedInsert {
            closure_id: "c-1".to_string(),
            checkin_id: checkin_id.map(String::from),
            collection: collection.to_string(),
            error: "boom".to_string(),
        }
    }

    #[test]
    fn test_record_splits_failures_by_kind() {
        // Arrange
        let mut report = MigrationReport::default();
        let outcome = WorkerOutcome {
            closure_id: "c-1".to_string(),
            checkins_migrated: 2,
            closure_migrated: false,
            failures: vec![
                failure(Some("k-3"), "checkins_2022"),
                failure(None, "cierres_2022"),
            ],
        };

        // Act
        report.record(outcome);

        // Assert
        assert_eq!(report.checkins_migrated, 2);
        assert_eq!(report.checkins_failed, 1);
        assert_eq!(report.closures_migrated, 0);
        assert_eq!(report.closures_failed, 1);
        assert_eq!(report.failed_inserts.len(), 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_outstanding() {
        let report = MigrationReport {
            dispatched: 5,
            completed: 3,
            ..Default::default()
        };
        assert_eq!(report.outstanding(), 2);
    }

    #[test]
    fn test_throughput() {
        let report = MigrationReport {
            completed: 1000,
            duration_secs: 2.0,
            ..Default::default()
        };
        assert!((report.throughput() - 500.0).abs() < 0.001);
        assert_eq!(MigrationReport::default().throughput(), 0.0);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = MigrationReport {
            pulled: 3,
            ..Default::default()
        };
        report.failed_inserts.push(failure(Some("k-1"), "checkins_2021"));

        report.write_json(&path).unwrap();

        let parsed: MigrationReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.pulled, 3);
        assert_eq!(parsed.failed_inserts, report.failed_inserts);
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
