use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

/// Trace identifier (128-bit, W3C trace-context width).
pub type TraceId = u128;

/// Span identifier (64-bit).
pub type SpanId = u64;

/// The "no parent" sentinel. A span whose parent is this value is a root.
pub const INVALID_SPAN_ID: SpanId = 0;

/// Identity fields extracted once from a span payload.
///
/// The accumulator never looks at anything else a payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanIdentity {
    /// Trace the span belongs to
    pub trace_id: TraceId,
    /// The span's own id
    pub span_id: SpanId,
    /// Parent span id, `INVALID_SPAN_ID` for a root
    pub parent_span_id: SpanId,
}

impl SpanIdentity {
    /// Creates an identity with an explicit parent.
    pub const fn new(trace_id: TraceId, span_id: SpanId, parent_span_id: SpanId) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id,
        }
    }

    /// Creates an identity for a span without a parent.
    pub const fn root(trace_id: TraceId, span_id: SpanId) -> Self {
        Self::new(trace_id, span_id, INVALID_SPAN_ID)
    }

    /// Returns true if the parent id is a real span id.
    #[inline]
    pub const fn has_valid_parent(&self) -> bool {
        self.parent_span_id != INVALID_SPAN_ID
    }
}

impl fmt::Display for SpanIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:032x}/{:016x}<-{:016x}",
            self.trace_id, self.span_id, self.parent_span_id
        )
    }
}

/// A completed span as handed over by the instrumentation layer.
///
/// Implementors only have to expose the three identity fields; the rest of
/// the payload is stored and returned untouched.
pub trait SpanPayload: Send + Sync + 'static {
    fn trace_id(&self) -> TraceId;

    fn span_id(&self) -> SpanId;

    fn parent_span_id(&self) -> SpanId;

    fn identity(&self) -> SpanIdentity {
        SpanIdentity::new(self.trace_id(), self.span_id(), self.parent_span_id())
    }
}

/// Default payload: an OpenTelemetry-shaped span with timing and attributes.
///
/// Tests that only care about ordering can use [`SpanIdentity`] as the
/// payload instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    /// `INVALID_SPAN_ID` when the span has no parent
    pub parent_span_id: SpanId,
    /// Wall-clock start, nanoseconds since the Unix epoch
    pub started_at: u64,
    /// Wall-clock end, equal to `started_at` until `finish`
    pub ended_at: u64,
    pub name: String,
    pub kind: SpanKind,
    pub status: SpanStatus,
    pub attributes: HashMap<String, AttributeValue>,
}

/// Attribute values, serialized without a type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    StrList(Vec<String>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

/// OpenTelemetry span kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanKind {
    #[default]
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

impl Span {
    /// Creates an unfinished span stamped with the current time.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        parent_span_id: SpanId,
        name: impl Into<String>,
        kind: SpanKind,
    ) -> Self {
        let started_at = now_nanos();
        Self {
            trace_id,
            span_id,
            parent_span_id,
            started_at,
            ended_at: started_at,
            name: name.into(),
            kind,
            status: SpanStatus::default(),
            attributes: HashMap::new(),
        }
    }

    /// Creates an internal span from an identity.
    pub fn from_identity(identity: SpanIdentity, name: impl Into<String>) -> Self {
        Self::new(
            identity.trace_id,
            identity.span_id,
            identity.parent_span_id,
            name,
            SpanKind::Internal,
        )
    }

    /// Stamps the end time and records the outcome.
    pub fn finish(&mut self, status: SpanStatus) {
        self.ended_at = now_nanos();
        self.status = status;
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(key.into(), value);
    }

    /// Elapsed nanoseconds between start and end, 0 if the clock went back.
    pub fn elapsed_nanos(&self) -> u64 {
        self.ended_at.saturating_sub(self.started_at)
    }
}

impl SpanPayload for Span {
    fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    fn span_id(&self) -> SpanId {
        self.span_id
    }

    fn parent_span_id(&self) -> SpanId {
        self.parent_span_id
    }
}

impl SpanPayload for SpanIdentity {
    fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    fn span_id(&self) -> SpanId {
        self.span_id
    }

    fn parent_span_id(&self) -> SpanId {
        self.parent_span_id
    }

    fn identity(&self) -> SpanIdentity {
        *self
    }
}
