//! Admission gate bounding the number of in-flight workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Counting gate with a fixed number of admission slots.
///
/// Also tracks how many slots are held and the highest number ever held at
/// once, so the concurrency bound can be checked after a run.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// A held admission slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl AdmissionGate {
    /// Creates a gate with `capacity` slots (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// Returns an error only if the gate was closed.
    pub async fn acquire(&self) -> Result<AdmissionSlot, AcquireError> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(AdmissionSlot {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Stops admitting; pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots held at the same time.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        // Runs before the permit field is dropped, so the gauge never
        // exceeds capacity.
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
