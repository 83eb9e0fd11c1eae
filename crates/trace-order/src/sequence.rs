use crate::error::{AccumulatorError, Result};
use crate::span::SpanId;
use crossbeam_utils::CachePadded;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// START-ORDER PROTOCOL
// =============================================================================
//
// The start path is the hottest call in the system (every instrumented method
// entry) so it never touches the accumulator's structural lock:
//
// 1. `fetch_add` on `next` with SeqCst. The RMW total order on a single atomic
//    means that if one `record_start` returns before another is invoked, the
//    first one drew the smaller number.
// 2. Insert `span_id -> sequence` into a sharded map. Contention is limited
//    to the shard the id hashes to.
//
// `sequence_of` reads the map only. Because the end of a span is causally
// after its start, the insert is visible by the time `on_end` looks it up.
//
// =============================================================================

/// Global start-order number assigned to a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    /// Wraps a raw counter value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues monotonic start-order numbers, keyed by span id.
///
/// Safe to share between any number of producer threads.
#[derive(Debug, Default)]
pub struct SequenceAssigner {
    /// Next number to hand out (padded, every producer hammers it)
    next: CachePadded<AtomicU64>,
    /// span id -> assigned number
    orders: DashMap<SpanId, Sequence>,
}

impl SequenceAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of `span_id` and returns the number it was given.
    ///
    /// Producers must call this at most once per span: a repeated call draws
    /// a fresh number and overwrites the previous mapping.
    #[inline]
    pub fn record_start(&self, span_id: SpanId) -> Sequence {
        let sequence = Sequence(self.next.fetch_add(1, Ordering::SeqCst));
        self.orders.insert(span_id, sequence);
        sequence
    }

    /// Looks up the number assigned when `span_id` started.
    #[inline]
    pub fn sequence_of(&self, span_id: SpanId) -> Result<Sequence> {
        self.orders
            .get(&span_id)
            .map(|entry| *entry.value())
            .ok_or(AccumulatorError::SpanNotStarted { span_id })
    }

    /// Number of spans with a recorded start.
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Returns true if no start has been recorded.
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Total numbers handed out since the last clear.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Forgets every mapping and restarts numbering at zero.
    ///
    /// Not meant to race with in-flight producers.
    pub fn clear(&self) {
        self.orders.clear();
        self.next.store(0, Ordering::SeqCst);
    }
}
