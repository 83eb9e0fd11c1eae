//! Error types for accumulator operations.

use crate::span::SpanId;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while recording or waiting for traces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccumulatorError {
    /// A span ended (or was looked up) without its start being recorded.
    #[error("span {span_id:016x} ended without a recorded start")]
    SpanNotStarted {
        /// The span whose start is missing.
        span_id: SpanId,
    },

    /// The wait deadline passed before enough traces completed.
    #[error("timed out after {waited:?} waiting for traces: {found} complete of {total} total")]
    Timeout {
        /// Complete traces observed when the deadline passed.
        found: usize,
        /// All traces observed when the deadline passed.
        total: usize,
        /// How long the caller actually waited.
        waited: Duration,
    },

    /// An assertion expected a different number of traces.
    #[error("expected {expected} traces but found {actual}:\n{dump}")]
    TraceCountMismatch {
        expected: usize,
        actual: usize,
        /// JSON rendering of the traces that were found.
        dump: String,
    },
}

impl AccumulatorError {
    /// Returns `true` if the caller can retry (e.g., wait longer).
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the producer broke the start-before-end contract.
    #[inline]
    pub fn is_ordering_violation(&self) -> bool {
        matches!(self, Self::SpanNotStarted { .. })
    }
}

/// Result alias for accumulator operations.
pub type Result<T, E = AccumulatorError> = std::result::Result<T, E>;
