//! trace-order - Deterministic Trace Reconstruction for Concurrent Spans
//!
//! Collects spans that many worker threads end in arbitrary order and serves
//! them back as traces whose order is reproducible: traces by when their
//! earliest span started, spans within a trace in causal preorder with
//! siblings by start order.
//!
//! # Key Features
//!
//! - Lock-free start path (atomic counter + sharded map)
//! - One structural lock for topology, never held across user work except
//!   in the explicit `inspect` hook
//! - Lazy, per-trace re-sort on read; unchanged reads are an `Arc` clone
//! - Copy-on-write snapshots that later spans never mutate
//! - Blocking wait for N complete traces with a deadline
//!
//! # Example
//!
//! ```
//! use trace_order::{SpanAccumulator, SpanIdentity};
//! use std::time::Duration;
//!
//! let acc = SpanAccumulator::<SpanIdentity>::default();
//!
//! let root = SpanIdentity::root(1, 1);
//! let child = SpanIdentity::new(1, 2, 1);
//! acc.record_start(&root);
//! acc.record_start(&child);
//!
//! // ends arrive out of causal order
//! acc.record_end(child).unwrap();
//! acc.record_end(root).unwrap();
//!
//! acc.wait_for_traces_timeout(1, Duration::from_secs(1)).unwrap();
//! let traces = acc.get_traces();
//! assert_eq!(traces[0].span_ids(), vec![1, 2]);
//! ```

mod accumulator;
mod assertions;
mod config;
mod error;
mod invariants;
mod metrics;
mod root;
mod sequence;
mod span;
mod store;
mod tree;
mod waiter;

pub use accumulator::{SpanAccumulator, SpanListener, TraceView, Traces};
pub use assertions::{dump_traces, exclude_none};
pub use config::AccumulatorConfig;
pub use error::{AccumulatorError, Result};
pub use metrics::Metrics;
pub use root::RootPolicy;
pub use sequence::{Sequence, SequenceAssigner};
pub use span::{
    AttributeValue, Span, SpanId, SpanIdentity, SpanKind, SpanPayload, SpanStatus, TraceId,
    INVALID_SPAN_ID,
};
pub use store::{RecordSnapshot, SpanRecord, SpanStore};
pub use tree::{Trace, TraceTreeBuilder};
