//! Control thread → audio thread handoff
//!
//! Two mechanisms, both wait-free on the audio side:
//! - [`OrderSelector`]: a single atomic order index
//! - [`snapshot_channel`]: whole-object exchange of rebuilt converters over
//!   rtrb rings; the audio thread never drops a snapshot, it hands the old
//!   one back so deallocation happens on the control thread

use portable_atomic::{AtomicUsize, Ordering};
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use std::sync::Arc;

// ============================================================================
// ORDER SELECTOR
// ============================================================================

/// Atomically published oversampling order. Clones share the same value.
#[derive(Debug, Clone)]
pub struct OrderSelector {
    order: Arc<AtomicUsize>,
}

impl OrderSelector {
    pub fn new(order: usize) -> Self {
        Self {
            order: Arc::new(AtomicUsize::new(order)),
        }
    }

    /// Publish a new order (control thread)
    #[inline]
    pub fn request(&self, order: usize) {
        self.order.store(order, Ordering::Release);
    }

    /// Latest published order
    #[inline]
    pub fn get(&self) -> usize {
        self.order.load(Ordering::Acquire)
    }
}

// ============================================================================
// SNAPSHOT EXCHANGE
// ============================================================================

/// Control-side handle: publishes new snapshots, collects retired ones.
pub struct SnapshotPublisher<T> {
    pending: Producer<T>,
    retired: Consumer<T>,
}

/// Audio-side handle: swaps in the newest snapshot.
pub struct SnapshotReceiver<T> {
    pending: Consumer<T>,
    retired: Producer<T>,
}

/// Create a handoff pair holding up to `capacity` in-flight snapshots.
pub fn snapshot_channel<T>(capacity: usize) -> (SnapshotPublisher<T>, SnapshotReceiver<T>) {
    let capacity = capacity.max(1);
    let (pending_tx, pending_rx) = RingBuffer::new(capacity);
    // Room for every pending snapshot plus the one it replaces
    let (retired_tx, retired_rx) = RingBuffer::new(capacity + 1);
    (
        SnapshotPublisher {
            pending: pending_tx,
            retired: retired_rx,
        },
        SnapshotReceiver {
            pending: pending_rx,
            retired: retired_tx,
        },
    )
}

impl<T> SnapshotPublisher<T> {
    /// Queue a snapshot for the audio thread. Returns it back when the queue
    /// is full.
    pub fn publish(&mut self, snapshot: T) -> Result<(), T> {
        self.collect();
        match self.pending.push(snapshot) {
            Ok(()) => Ok(()),
            Err(PushError::Full(snapshot)) => {
                log::warn!("SnapshotPublisher: queue full, snapshot not published");
                Err(snapshot)
            }
        }
    }

    /// Drop snapshots retired by the audio thread. Returns how many.
    pub fn collect(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(old) = self.retired.pop() {
            drop(old);
            dropped += 1;
        }
        dropped
    }

    /// Snapshots published but not yet picked up
    pub fn in_flight(&self) -> usize {
        self.pending.buffer().capacity() - self.pending.slots()
    }
}

impl<T> SnapshotReceiver<T> {
    /// Swap in the newest pending snapshot, retiring the replaced ones.
    /// Returns `true` if `current` changed. Never allocates or frees.
    pub fn poll(&mut self, current: &mut T) -> bool {
        let mut swapped = false;
        while self.retired.slots() > 0 {
            let Ok(next) = self.pending.pop() else {
                break;
            };
            let old = std::mem::replace(current, next);
            let pushed = self.retired.push(old);
            debug_assert!(pushed.is_ok());
            swapped = true;
        }
        swapped
    }
}
