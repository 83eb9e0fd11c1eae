use crate::invariants::debug_assert_permutation;
use crate::root::RootPolicy;
use crate::sequence::Sequence;
use crate::store::SpanRecord;
use crate::span::{SpanId, TraceId};
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// PREORDER RECONSTRUCTION
// =============================================================================
//
// Records arrive in end order, which says nothing about causality. The builder
// turns one trace's flat parent pointers back into a forest and flattens it:
//
// 1. Arena: one node per record, addressed by its index in the input slice.
//    A `span_id -> index` map is built first and dropped after linking.
// 2. Link: a record whose parent is present (and which the root policy does
//    not claim) becomes a child of that parent. A missing parent leaves the
//    record a root; partial data is expected, not an error.
// 3. Sort: children and roots by `(sequence, span_id)`. Start order is the
//    only tie-break, so the output depends on the record set and never on
//    the order records were appended.
// 4. Walk: iterative preorder with an explicit stack, so deep chains cannot
//    blow the thread stack. Nodes caught in a parent cycle are never reached
//    from a root; they are appended afterwards in start order so every record
//    is still emitted exactly once.
//
// =============================================================================

/// A causally ordered, immutable snapshot of one trace.
///
/// Cloning is cheap; clones share the same record slice.
#[derive(Debug)]
pub struct Trace<S> {
    trace_id: TraceId,
    spans: Arc<[Arc<SpanRecord<S>>]>,
    roots: usize,
}

impl<S> Clone for Trace<S> {
    fn clone(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            spans: Arc::clone(&self.spans),
            roots: self.roots,
        }
    }
}

impl<S> Trace<S> {
    #[inline]
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// Records in preorder.
    #[inline]
    pub fn spans(&self) -> &[Arc<SpanRecord<S>>] {
        &self.spans
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Arc<SpanRecord<S>>> {
        self.spans.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<SpanRecord<S>>> {
        self.spans.iter()
    }

    /// Payloads in preorder.
    pub fn payloads(&self) -> impl Iterator<Item = &S> + '_ {
        self.spans.iter().map(|r| r.payload())
    }

    /// Span ids in preorder.
    pub fn span_ids(&self) -> Vec<SpanId> {
        self.spans.iter().map(|r| r.span_id()).collect()
    }

    /// Number of records the root policy treats as roots.
    #[inline]
    pub fn root_count(&self) -> usize {
        self.roots
    }

    /// True once the trace holds at least one root.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.roots > 0
    }

    /// Earliest start in the trace.
    pub fn min_sequence(&self) -> Option<Sequence> {
        self.spans.iter().map(|r| r.sequence()).min()
    }
}

impl<'a, S> IntoIterator for &'a Trace<S> {
    type Item = &'a Arc<SpanRecord<S>>;
    type IntoIter = std::slice::Iter<'a, Arc<SpanRecord<S>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.spans.iter()
    }
}

struct Node {
    children: Vec<usize>,
    is_root: bool,
}

/// Rebuilds the parent/child forest of a trace and flattens it.
#[derive(Debug, Clone, Copy)]
pub struct TraceTreeBuilder<'a> {
    policy: &'a RootPolicy,
}

impl<'a> TraceTreeBuilder<'a> {
    pub fn new(policy: &'a RootPolicy) -> Self {
        Self { policy }
    }

    /// Returns the records in deterministic preorder.
    pub fn order<S>(&self, records: &[Arc<SpanRecord<S>>]) -> Vec<Arc<SpanRecord<S>>> {
        let key = |i: usize| (records[i].sequence(), records[i].span_id());

        let index: HashMap<SpanId, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.span_id(), i))
            .collect();

        let mut nodes: Vec<Node> = records
            .iter()
            .map(|_| Node {
                children: Vec::new(),
                is_root: true,
            })
            .collect();

        for (i, record) in records.iter().enumerate() {
            let identity = record.identity();
            if self.policy.is_root(&identity) || !identity.has_valid_parent() {
                continue;
            }
            if let Some(&parent) = index.get(&identity.parent_span_id) {
                nodes[parent].children.push(i);
                nodes[i].is_root = false;
            }
        }
        drop(index);

        for node in &mut nodes {
            node.children.sort_by_key(|&c| key(c));
        }

        let mut roots: Vec<usize> = (0..records.len()).filter(|&i| nodes[i].is_root).collect();
        roots.sort_by_key(|&r| key(r));

        let mut visited = vec![false; records.len()];
        let mut ordered = Vec::with_capacity(records.len());
        let mut stack: Vec<usize> = Vec::new();

        for root in roots {
            stack.push(root);
            while let Some(i) = stack.pop() {
                if visited[i] {
                    continue;
                }
                visited[i] = true;
                ordered.push(Arc::clone(&records[i]));
                stack.extend(nodes[i].children.iter().rev().copied());
            }
        }

        if ordered.len() < records.len() {
            let mut stranded: Vec<usize> = (0..records.len()).filter(|&i| !visited[i]).collect();
            stranded.sort_by_key(|&i| key(i));
            ordered.extend(stranded.into_iter().map(|i| Arc::clone(&records[i])));
        }

        debug_assert_permutation!(records.len(), ordered.len());
        ordered
    }

    /// Builds the ordered snapshot for one trace.
    pub fn build<S>(&self, trace_id: TraceId, records: &[Arc<SpanRecord<S>>]) -> Trace<S> {
        let roots = records
            .iter()
            .filter(|r| self.policy.is_root(&r.identity()))
            .count();

        Trace {
            trace_id,
            spans: self.order(records).into(),
            roots,
        }
    }
}
