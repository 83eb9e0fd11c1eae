//! Debug assertion macros for accumulator invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so release
//! builds pay nothing for them.
//!
//! Used by `TraceTreeBuilder` and `SpanAccumulator`.

// =============================================================================
// Flattening is a permutation
// =============================================================================

/// Assert that a flattened trace holds exactly the records it was built from.
///
/// **Invariant**: every record appears once in the preorder output
///
/// Used in: `TraceTreeBuilder::order()` after traversal
macro_rules! debug_assert_permutation {
    ($input:expr, $output:expr) => {
        debug_assert!(
            $input == $output,
            "flattened trace has {} records but {} were appended",
            $output,
            $input
        )
    };
}

// =============================================================================
// Cross-trace order
// =============================================================================

/// Assert that published traces are ordered by earliest start.
///
/// **Invariant**: `min_seq(trace[i]) <= min_seq(trace[i + 1])`
///
/// Used in: `SpanAccumulator` after re-sorting the trace list
macro_rules! debug_assert_trace_order {
    ($prev:expr, $next:expr) => {
        debug_assert!(
            $prev <= $next,
            "trace list out of order: earliest start {:?} listed before {:?}",
            $prev,
            $next
        )
    };
}

// =============================================================================
// Completion bookkeeping
// =============================================================================

/// Assert that the complete-trace counter never exceeds the trace count.
///
/// **Invariant**: `completed <= total`
///
/// Used in: `SpanAccumulator::record_end()` after updating counters
macro_rules! debug_assert_completed_bound {
    ($completed:expr, $total:expr) => {
        debug_assert!(
            $completed <= $total,
            "{} complete traces but only {} traces exist",
            $completed,
            $total
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_completed_bound;
pub(crate) use debug_assert_permutation;
pub(crate) use debug_assert_trace_order;
