use crate::config::AccumulatorConfig;
use crate::error::Result;
use crate::invariants::debug_assert_completed_bound;
#[cfg(debug_assertions)]
use crate::invariants::debug_assert_trace_order;
use crate::root::RootPolicy;
use crate::sequence::{Sequence, SequenceAssigner};
use crate::span::{Span, SpanIdentity, SpanPayload, TraceId};
use crate::store::{SpanRecord, SpanStore};
use crate::tree::{Trace, TraceTreeBuilder};
use crate::Metrics;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

// =============================================================================
// LOCKING & PUBLICATION STRATEGY
// =============================================================================
//
// Two independent synchronization domains:
//
// - `sequences`: lock-free start path (atomic counter + sharded map). Never
//   waits on the structural lock.
// - `state`: one mutex guarding trace topology (stores, dirty flags, the
//   published list). The condvar `changed` is paired with it; every append
//   broadcasts so blocked waiters re-check their predicate.
//
// Reads are copy-on-write. The published list is an `Arc<[Trace]>` and each
// `Trace` wraps its own `Arc<[record]>`. A re-sort builds new slices and swaps
// the `Arc`; it never writes into one that was handed out. A caller holding a
// previous result keeps an immutable snapshot for as long as it likes.
//
// Re-sorting is lazy. `record_end` only flips dirty flags; `get_traces` pays
// for the list sort (if the list is dirty) and one tree build per dirty trace.
// With nothing dirty, `get_traces` is an `Arc` clone.
//
// =============================================================================

/// Ordered snapshot of every trace, earliest-started first.
pub type Traces<S> = Arc<[Trace<S>]>;

/// Lifecycle callbacks the instrumentation layer drives.
pub trait SpanListener<S>: Send + Sync {
    /// Called once per span, before its end.
    fn on_start(&self, identity: &SpanIdentity);

    /// Called once per span with the completed payload.
    fn on_end(&self, span: S) -> Result<()>;
}

#[derive(Debug)]
struct TraceEntry<S> {
    store: SpanStore<S>,
    /// Last tree-builder output, `None` until first built
    sorted: Option<Trace<S>>,
    /// Needs a span re-sort before next publication
    dirty: bool,
    roots: usize,
}

#[derive(Debug)]
pub(crate) struct State<S> {
    entries: HashMap<TraceId, TraceEntry<S>>,
    /// Trace ids in published order (valid when `list_dirty` is false)
    order: Vec<TraceId>,
    published: Traces<S>,
    list_dirty: bool,
    dirty: Vec<TraceId>,
    completed: usize,
    spans: usize,
    pub(crate) metrics: Metrics,
    pub(crate) metrics_enabled: bool,
}

impl<S> State<S> {
    fn new(metrics_enabled: bool) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            published: Arc::from(Vec::new()),
            list_dirty: false,
            dirty: Vec::new(),
            completed: 0,
            spans: 0,
            metrics: Metrics::new(),
            metrics_enabled,
        }
    }

    fn append(&mut self, record: Arc<SpanRecord<S>>, is_root: bool) {
        let trace_id = record.trace_id();

        let entry = match self.entries.entry(trace_id) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                debug!(trace_id = %format!("{:032x}", trace_id), "new trace");
                self.order.push(trace_id);
                self.list_dirty = true;
                if self.metrics_enabled {
                    self.metrics.traces_created += 1;
                }
                e.insert(TraceEntry {
                    store: SpanStore::new(trace_id),
                    sorted: None,
                    dirty: false,
                    roots: 0,
                })
            }
        };

        if entry.store.append(record) {
            // earliest start moved, so may the trace's list position
            self.list_dirty = true;
        }
        if is_root {
            entry.roots += 1;
            if entry.roots == 1 {
                self.completed += 1;
            }
        }
        if !entry.dirty {
            entry.dirty = true;
            self.dirty.push(trace_id);
        }

        self.spans += 1;
        if self.metrics_enabled {
            self.metrics.spans_recorded += 1;
        }
        debug_assert_completed_bound!(self.completed, self.entries.len());
    }

    /// Brings the published list up to date. Returns true if any work ran.
    fn refresh(&mut self, policy: &RootPolicy) -> bool {
        let mut changed = false;

        if self.list_dirty {
            self.order
                .sort_by_key(|id| (self.entries[id].store.min_sequence(), *id));
            self.list_dirty = false;
            if self.metrics_enabled {
                self.metrics.list_sorts += 1;
            }
            trace!(traces = self.order.len(), "re-sorted trace list");

            #[cfg(debug_assertions)]
            for pair in self.order.windows(2) {
                debug_assert_trace_order!(
                    self.entries[&pair[0]].store.min_sequence(),
                    self.entries[&pair[1]].store.min_sequence()
                );
            }
            changed = true;
        }

        if !self.dirty.is_empty() {
            let builder = TraceTreeBuilder::new(policy);
            for trace_id in self.dirty.drain(..) {
                if let Some(entry) = self.entries.get_mut(&trace_id) {
                    entry.sorted = Some(builder.build(trace_id, entry.store.records()));
                    entry.dirty = false;
                    if self.metrics_enabled {
                        self.metrics.span_sorts += 1;
                    }
                    trace!(
                        trace_id = %format!("{:032x}", trace_id),
                        spans = entry.store.len(),
                        "re-sorted trace"
                    );
                }
            }
            changed = true;
        }

        if changed {
            self.published = self
                .order
                .iter()
                .filter_map(|id| self.entries.get(id).and_then(|e| e.sorted.clone()))
                .collect();
        }
        changed
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed
    }

    pub(crate) fn total(&self) -> usize {
        self.entries.len()
    }

    /// Complete traces whose raw records the predicate does not exclude.
    /// The predicate sees each store's current snapshot in arrival order.
    pub(crate) fn completed_excluding<E>(&self, excludes: E) -> usize
    where
        E: Fn(&[Arc<SpanRecord<S>>]) -> bool,
    {
        self.entries
            .values()
            .filter(|e| e.roots > 0)
            .filter(|e| !excludes(e.store.snapshot().as_slice()))
            .count()
    }
}

/// Point-in-time view handed to [`SpanAccumulator::inspect`].
#[derive(Debug)]
pub struct TraceView<'a, S> {
    traces: &'a Traces<S>,
    completed: usize,
    spans: usize,
}

impl<'a, S> TraceView<'a, S> {
    /// Ordered traces, identical to what `get_traces` would return now.
    pub fn traces(&self) -> &'a Traces<S> {
        self.traces
    }

    /// Looks up one trace by id.
    pub fn trace(&self, trace_id: TraceId) -> Option<&'a Trace<S>> {
        self.traces.iter().find(|t| t.trace_id() == trace_id)
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.traces.len()
    }

    pub fn span_count(&self) -> usize {
        self.spans
    }
}

/// Collects spans from many threads and serves them as ordered traces.
///
/// One instance per test run or agent session; share it by `Arc`.
pub struct SpanAccumulator<S = Span> {
    pub(crate) sequences: SequenceAssigner,
    pub(crate) state: Mutex<State<S>>,
    pub(crate) changed: Condvar,
    pub(crate) config: AccumulatorConfig,
}

impl<S: SpanPayload> SpanAccumulator<S> {
    /// Creates an empty accumulator.
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            sequences: SequenceAssigner::new(),
            state: Mutex::new(State::new(config.enable_metrics)),
            changed: Condvar::new(),
            config,
        }
    }

    /// Returns the accumulator configuration.
    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    /// Returns the start-order assigner.
    pub fn sequences(&self) -> &SequenceAssigner {
        &self.sequences
    }

    /// Records the start of a span. Never takes the structural lock.
    #[inline]
    pub fn record_start(&self, identity: &SpanIdentity) -> Sequence {
        self.sequences.record_start(identity.span_id)
    }

    /// Records a completed span and wakes every waiter.
    ///
    /// Fails with `SpanNotStarted` if the span's start was never recorded;
    /// nothing is stored in that case.
    pub fn record_end(&self, span: S) -> Result<()> {
        let identity = span.identity();
        let sequence = self.sequences.sequence_of(identity.span_id)?;
        let is_root = self.config.root_policy.is_root(&identity);
        let record = Arc::new(SpanRecord::new(identity, sequence, span));

        let mut state = self.state.lock();
        state.append(record, is_root);
        self.changed.notify_all();
        Ok(())
    }

    /// Returns every trace in deterministic order.
    ///
    /// Traces are listed by earliest start; spans within a trace in preorder
    /// with siblings by start. The returned slice is never mutated; call
    /// again to observe newer spans.
    pub fn get_traces(&self) -> Traces<S> {
        let mut state = self.state.lock();
        state.refresh(&self.config.root_policy);
        Arc::clone(&state.published)
    }

    /// Runs `f` while holding the structural lock, after bringing the
    /// ordered view up to date.
    ///
    /// `f` must not call back into this accumulator; the lock is not
    /// reentrant.
    pub fn inspect<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&TraceView<'_, S>) -> R,
    {
        let mut state = self.state.lock();
        state.refresh(&self.config.root_policy);
        let view = TraceView {
            traces: &state.published,
            completed: state.completed,
            spans: state.spans,
        };
        f(&view)
    }

    /// Discards every trace and every recorded start.
    ///
    /// Meant for use between test cases, not while producers are running.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        *state = State::new(self.config.enable_metrics);
        self.sequences.clear();
        self.changed.notify_all();
        debug!(traces = dropped, "cleared accumulator");
    }

    /// Number of traces observed so far.
    pub fn trace_count(&self) -> usize {
        self.state.lock().total()
    }

    /// Number of traces holding at least one root.
    pub fn completed_count(&self) -> usize {
        self.state.lock().completed()
    }

    /// Number of recorded (ended) spans.
    pub fn span_count(&self) -> usize {
        self.state.lock().spans
    }

    /// Snapshot of the counters.
    pub fn metrics(&self) -> Metrics {
        let mut metrics = self.state.lock().metrics;
        if self.config.enable_metrics {
            metrics.spans_started = self.sequences.issued();
        }
        metrics
    }
}

impl<S: SpanPayload> Default for SpanAccumulator<S> {
    fn default() -> Self {
        Self::new(AccumulatorConfig::default())
    }
}

impl<S> std::fmt::Debug for SpanAccumulator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanAccumulator")
            .field("config", &self.config)
            .field("started", &self.sequences.len())
            .finish_non_exhaustive()
    }
}

impl<S: SpanPayload> SpanListener<S> for SpanAccumulator<S> {
    fn on_start(&self, identity: &SpanIdentity) {
        self.record_start(identity);
    }

    fn on_end(&self, span: S) -> Result<()> {
        self.record_end(span)
    }
}
