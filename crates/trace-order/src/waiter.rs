//! Blocking wait for trace completion.
//!
//! Monitor pattern on the accumulator's structural lock: check the predicate,
//! and if it does not hold, sleep on the condvar until the deadline. Every
//! `record_end` broadcasts, so a waiter re-checks after each append instead
//! of polling.

use crate::accumulator::{SpanAccumulator, State};
use crate::error::{AccumulatorError, Result};
use crate::span::SpanPayload;
use crate::store::SpanRecord;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

impl<S: SpanPayload> SpanAccumulator<S> {
    /// Blocks until `count` traces are complete, using the configured
    /// default wait.
    ///
    /// # Panics
    ///
    /// Panics if `count` is 0.
    pub fn wait_for_traces(&self, count: usize) -> Result<()> {
        self.wait_for_traces_timeout(count, self.config.default_wait)
    }

    /// Blocks until `count` traces are complete or `max_wait` elapses.
    ///
    /// A trace is complete once it holds a span the root policy accepts.
    /// On timeout the error carries the last observed complete and total
    /// trace counts.
    ///
    /// # Panics
    ///
    /// Panics if `count` is 0.
    pub fn wait_for_traces_timeout(&self, count: usize, max_wait: Duration) -> Result<()> {
        self.wait_until(count, max_wait, State::completed)
    }

    /// Like [`wait_for_traces_timeout`](Self::wait_for_traces_timeout), but
    /// complete traces for which `excludes` returns true are not counted.
    ///
    /// `excludes` sees a trace's records in arrival order and runs under the
    /// structural lock.
    ///
    /// # Panics
    ///
    /// Panics if `count` is 0.
    pub fn wait_for_traces_excluding<E>(
        &self,
        count: usize,
        max_wait: Duration,
        excludes: E,
    ) -> Result<()>
    where
        E: Fn(&[Arc<SpanRecord<S>>]) -> bool,
    {
        self.wait_until(count, max_wait, |state| state.completed_excluding(&excludes))
    }

    fn wait_until<P>(&self, count: usize, max_wait: Duration, found: P) -> Result<()>
    where
        P: Fn(&State<S>) -> usize,
    {
        assert!(count > 0, "waiting for zero traces is always satisfied");

        let started = Instant::now();
        let deadline = started.checked_add(max_wait);
        let mut state = self.state.lock();

        loop {
            let observed = found(&*state);
            if observed >= count {
                if state.metrics_enabled {
                    state.metrics.waits_satisfied += 1;
                }
                debug!(
                    wanted = count,
                    found = observed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "trace wait satisfied"
                );
                return Ok(());
            }

            match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    let total = state.total();
                    if state.metrics_enabled {
                        state.metrics.waits_timed_out += 1;
                    }
                    let waited = started.elapsed();
                    warn!(
                        wanted = count,
                        found = observed,
                        total,
                        waited_ms = waited.as_millis() as u64,
                        "timed out waiting for traces"
                    );
                    return Err(AccumulatorError::Timeout {
                        found: observed,
                        total,
                        waited,
                    });
                }
                Some(deadline) => {
                    self.changed.wait_until(&mut state, deadline);
                }
                // budget too large to represent: wait for notifications only
                None => self.changed.wait(&mut state),
            }
        }
    }
}
