//! Concurrency slots.
//!
//! A [`Slot`] is the RAII form of one semaphore permit. It is held for a
//! connection's whole lifetime and returns the permit on every exit path,
//! including panics and task cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use crate::observability::metrics;

/// Live slot accounting shared by the pool and every slot it hands out.
#[derive(Debug, Default)]
pub struct SlotStats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlotStats {
    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A permit representing one connection slot.
///
/// When dropped, the slot is released back to the pool. The in-flight count
/// is decremented before the permit is returned, so it can never exceed the
/// pool size.
#[derive(Debug)]
pub struct Slot {
    stats: Arc<SlotStats>,
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    pub(crate) fn new(permit: OwnedSemaphorePermit, stats: Arc<SlotStats>) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak.fetch_max(now, Ordering::SeqCst);
        metrics::set_in_flight(now);

        Self {
            stats,
            _permit: permit,
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let now = self.stats.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_in_flight(now);
    }
}
