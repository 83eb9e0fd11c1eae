/// Accumulator counters, reset by `clear()`.
///
/// Everything except `spans_started` is counted under the structural lock,
/// so plain integers suffice; `spans_started` comes from the sequence counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub spans_started: u64,
    pub spans_recorded: u64,
    pub traces_created: u64,
    /// Times the trace list was re-sorted by earliest start
    pub list_sorts: u64,
    /// Times a single trace was rebuilt by the tree builder
    pub span_sorts: u64,
    pub waits_satisfied: u64,
    pub waits_timed_out: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total re-sort work (list plus per-trace).
    pub fn sorts(&self) -> u64 {
        self.list_sorts + self.span_sorts
    }
}
