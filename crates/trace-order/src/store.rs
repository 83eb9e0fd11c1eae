//! Per-trace record storage.
//!
//! A `SpanStore` is copy-on-write: `snapshot()` hands out the current
//! record vector behind an `Arc`, and the next `append` clones the vector
//! only if such a snapshot is still alive. Readers iterate a frozen vector
//! while producers keep appending to a private one, so an append can never
//! invalidate an iteration in progress or expose a half-written element.

use crate::sequence::Sequence;
use crate::span::{SpanId, SpanIdentity, TraceId};
use std::sync::Arc;

/// A completed span together with its start order. Immutable once built.
#[derive(Debug)]
pub struct SpanRecord<S> {
    identity: SpanIdentity,
    sequence: Sequence,
    payload: S,
}

impl<S> SpanRecord<S> {
    pub fn new(identity: SpanIdentity, sequence: Sequence, payload: S) -> Self {
        Self {
            identity,
            sequence,
            payload,
        }
    }

    #[inline]
    pub fn identity(&self) -> SpanIdentity {
        self.identity
    }

    #[inline]
    pub fn trace_id(&self) -> TraceId {
        self.identity.trace_id
    }

    #[inline]
    pub fn span_id(&self) -> SpanId {
        self.identity.span_id
    }

    #[inline]
    pub fn parent_span_id(&self) -> SpanId {
        self.identity.parent_span_id
    }

    /// Start order of the span.
    #[inline]
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// The opaque payload exactly as it was recorded.
    #[inline]
    pub fn payload(&self) -> &S {
        &self.payload
    }
}

/// Frozen view of a store's records, in raw insertion order.
pub type RecordSnapshot<S> = Arc<Vec<Arc<SpanRecord<S>>>>;

/// Insertion-ordered records of one trace.
#[derive(Debug)]
pub struct SpanStore<S> {
    trace_id: TraceId,
    records: RecordSnapshot<S>,
    min_sequence: Option<Sequence>,
}

impl<S> SpanStore<S> {
    pub fn new(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            records: Arc::new(Vec::new()),
            min_sequence: None,
        }
    }

    #[inline]
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// Appends a record. Returns true if it lowered the trace's earliest
    /// start, which can move the trace in the cross-trace ordering.
    pub fn append(&mut self, record: Arc<SpanRecord<S>>) -> bool {
        debug_assert_eq!(record.trace_id(), self.trace_id);

        let sequence = record.sequence();
        Arc::make_mut(&mut self.records).push(record);

        match self.min_sequence {
            Some(min) if min <= sequence => false,
            _ => {
                self.min_sequence = Some(sequence);
                true
            }
        }
    }

    /// Returns a view that later appends will never touch.
    #[inline]
    pub fn snapshot(&self) -> RecordSnapshot<S> {
        Arc::clone(&self.records)
    }

    /// Records in raw insertion order (before causal sorting).
    #[inline]
    pub fn records(&self) -> &[Arc<SpanRecord<S>>] {
        &self.records
    }

    /// Earliest start among the stored records.
    #[inline]
    pub fn min_sequence(&self) -> Option<Sequence> {
        self.min_sequence
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
