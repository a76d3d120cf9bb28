//! Ready queue — messages cleared for dispatch, ordered by descending
//! effective priority, then proximity to expiry, then insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use attune_core::types::{ArtifactHandle, FilteredMessage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// One dispatchable message with its rendered artifact.
#[derive(Debug, Clone)]
pub struct ReadyItem {
    pub filtered: FilteredMessage,
    pub artifact: ArtifactHandle,
    pub effective_priority: u8,
    pub enqueued_at: DateTime<Utc>,
    seq: u64,
}

impl ReadyItem {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        self.filtered.message.expires_at
    }
}

impl PartialEq for ReadyItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReadyItem {}

impl PartialOrd for ReadyItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyItem {
    // Greater = dispatched first. Priority wins; among equal priorities the
    // item closest to expiry wins (no expiry sorts last); remaining ties are
    // FIFO by insertion sequence.
    fn cmp(&self, other: &Self) -> Ordering {
        self.effective_priority
            .cmp(&other.effective_priority)
            .then_with(|| match (self.expiry(), other.expiry()) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of ready-to-send messages. Single-writer discipline: only
/// the scheduler mutates it, from within its own ticks.
pub struct ReadyQueue {
    heap: Mutex<BinaryHeap<ReadyItem>>,
    seq: AtomicU64,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn push(&self, filtered: FilteredMessage, artifact: ArtifactHandle, effective_priority: u8) {
        let item = ReadyItem {
            filtered,
            artifact,
            effective_priority,
            enqueued_at: Utc::now(),
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
        };
        self.heap.lock().push(item);
    }

    /// Put a popped item back without disturbing its queue position.
    pub fn requeue(&self, item: ReadyItem) {
        self.heap.lock().push(item);
    }

    pub fn pop(&self) -> Option<ReadyItem> {
        self.heap.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
