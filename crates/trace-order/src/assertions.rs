//! Assertion support for test code.
//!
//! `assert_traces` combines the three steps tests repeat around the
//! accumulator: wait for enough complete traces, take an ordered snapshot,
//! and check that exactly the expected number survive filtering. When the
//! count is off, the error carries a JSON dump of what was actually seen.

use crate::accumulator::SpanAccumulator;
use crate::error::{AccumulatorError, Result};
use crate::sequence::Sequence;
use crate::span::SpanPayload;
use crate::store::SpanRecord;
use crate::tree::Trace;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize)]
struct TraceDump {
    trace_id: String,
    complete: bool,
    spans: Vec<SpanDump>,
}

#[derive(Serialize)]
struct SpanDump {
    span_id: String,
    parent_span_id: String,
    sequence: Sequence,
}

/// Renders trace and span identities (in order) as pretty JSON.
pub fn dump_traces<S>(traces: &[Trace<S>]) -> String {
    let dump: Vec<TraceDump> = traces
        .iter()
        .map(|trace| TraceDump {
            trace_id: format!("{:032x}", trace.trace_id()),
            complete: trace.is_complete(),
            spans: trace
                .iter()
                .map(|r| SpanDump {
                    span_id: format!("{:016x}", r.span_id()),
                    parent_span_id: format!("{:016x}", r.parent_span_id()),
                    sequence: r.sequence(),
                })
                .collect(),
        })
        .collect();

    serde_json::to_string_pretty(&dump).unwrap_or_else(|e| format!("<unrenderable: {e}>"))
}

/// Never excludes anything.
pub fn exclude_none<S>(_: &[Arc<SpanRecord<S>>]) -> bool {
    false
}

impl<S: SpanPayload> SpanAccumulator<S> {
    /// Waits for `size` complete, non-excluded traces, then runs `check`
    /// over exactly those traces in deterministic order.
    ///
    /// Fails with `Timeout` if they never show up and with
    /// `TraceCountMismatch` if more than `size` remain after filtering.
    pub fn assert_traces<E, F, R>(
        &self,
        size: usize,
        max_wait: Duration,
        excludes: E,
        check: F,
    ) -> Result<R>
    where
        E: Fn(&[Arc<SpanRecord<S>>]) -> bool,
        F: FnOnce(&[Trace<S>]) -> R,
    {
        self.wait_for_traces_excluding(size, max_wait, &excludes)?;

        let kept: Vec<Trace<S>> = self
            .get_traces()
            .iter()
            .filter(|trace| !excludes(trace.spans()))
            .cloned()
            .collect();

        if kept.len() != size {
            return Err(AccumulatorError::TraceCountMismatch {
                expected: size,
                actual: kept.len(),
                dump: dump_traces(&kept),
            });
        }
        Ok(check(&kept))
    }
}
