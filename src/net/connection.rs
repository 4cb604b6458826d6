//! Upstream connection slots and in-flight tracking.
//!
//! # Responsibilities
//! - Bound concurrent upstream requests via semaphore
//! - Generate unique slot IDs for tracing
//! - Count in-flight upstream requests so leaks are observable
//! - Release everything on drop, including cancellation and timeouts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

/// Global atomic counter for slot IDs.
static SLOT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one upstream checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

impl SlotId {
    /// Generate a new unique slot ID.
    pub fn new() -> Self {
        Self(SLOT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// Bounded set of upstream slots shared by every invocation.
///
/// Checkout waits when all slots are taken; the wait is an ordinary future,
/// so it is cancelled by whatever timeout wraps it.
#[derive(Debug, Clone)]
pub struct UpstreamSlots {
    limit: Arc<Semaphore>,
    in_flight: Arc<AtomicU64>,
}

impl UpstreamSlots {
    pub fn new(max: usize) -> Self {
        Self {
            limit: Arc::new(Semaphore::new(max)),
            in_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wait for a free slot. Returns a guard that frees it on drop.
    pub async fn checkout(&self) -> Option<SlotGuard> {
        let permit = self.limit.clone().acquire_owned().await.ok()?;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_in_flight(current);

        let id = SlotId::new();
        tracing::trace!(slot = %id, in_flight = current, "Upstream slot checked out");
        Some(SlotGuard {
            in_flight: Arc::clone(&self.in_flight),
            id,
            _permit: permit,
        })
    }

    /// Upstream requests currently running.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.limit.available_permits()
    }
}

/// Guard for one checked-out slot.
#[derive(Debug)]
pub struct SlotGuard {
    in_flight: Arc<AtomicU64>,
    id: SlotId,
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    pub fn id(&self) -> SlotId {
        self.id
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let current = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_in_flight(current);
        tracing::trace!(slot = %self.id, "Upstream slot released");
    }
}
