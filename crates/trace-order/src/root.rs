use crate::span::{SpanId, SpanIdentity};
use std::fmt;
use std::sync::Arc;

/// Decides which spans count as roots.
///
/// A trace is complete once it holds at least one root, and the tree
/// builder never links a root under a parent. Tests that want to cut a
/// tree short pick a sentinel parent id instead of baking one into the
/// engine.
#[derive(Clone, Default)]
pub enum RootPolicy {
    /// Root iff the parent is `INVALID_SPAN_ID`.
    #[default]
    InvalidParent,
    /// Root iff the parent is invalid or equals the sentinel.
    Sentinel(SpanId),
    /// Root iff the predicate says so. The predicate alone decides.
    Custom(Arc<dyn Fn(&SpanIdentity) -> bool + Send + Sync>),
}

impl RootPolicy {
    /// Wraps a caller-supplied predicate.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&SpanIdentity) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    #[inline]
    pub fn is_root(&self, identity: &SpanIdentity) -> bool {
        match self {
            Self::InvalidParent => !identity.has_valid_parent(),
            Self::Sentinel(sentinel) => {
                !identity.has_valid_parent() || identity.parent_span_id == *sentinel
            }
            Self::Custom(predicate) => predicate(identity),
        }
    }
}

impl fmt::Debug for RootPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParent => f.write_str("InvalidParent"),
            Self::Sentinel(id) => write!(f, "Sentinel({:016x})", id),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
