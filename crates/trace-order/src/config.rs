//! Configuration for the span accumulator.

use crate::root::RootPolicy;
use crate::span::SpanId;
use std::time::Duration;

/// Configuration for a [`SpanAccumulator`](crate::SpanAccumulator).
#[derive(Debug, Clone)]
pub struct AccumulatorConfig {
    /// Which spans count as roots, for both completion and tree building.
    ///
    /// Default: parent is `INVALID_SPAN_ID`
    pub root_policy: RootPolicy,

    /// Budget used by `wait_for_traces` when no explicit timeout is given.
    ///
    /// Default: 20s
    pub default_wait: Duration,

    /// Count sorts, waits and records (slight overhead under the lock).
    ///
    /// Default: true
    pub enable_metrics: bool,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            root_policy: RootPolicy::InvalidParent,
            default_wait: Duration::from_secs(20),
            enable_metrics: true,
        }
    }
}

impl AccumulatorConfig {
    /// Creates a configuration for short-lived unit tests (1s default wait).
    pub fn quick() -> Self {
        Self {
            default_wait: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Creates a configuration that also treats `sentinel` parents as roots.
    pub fn force_root(sentinel: SpanId) -> Self {
        Self {
            root_policy: RootPolicy::Sentinel(sentinel),
            ..Self::default()
        }
    }

    /// Sets the root policy.
    pub fn with_root_policy(mut self, policy: RootPolicy) -> Self {
        self.root_policy = policy;
        self
    }

    /// Sets the default wait budget.
    pub fn with_default_wait(mut self, wait: Duration) -> Self {
        self.default_wait = wait;
        self
    }

    /// Enables or disables metrics.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }
}
