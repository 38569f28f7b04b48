//! Field identifier allocation.
//!
//! Every widget rendered into a form gets exactly one field identifier (`w1`, `w2`, ...). The
//! browser posts values back under those names, so the submission must be parsed by a context
//! that performed exactly the same sequence of allocations as the render did. Identifiers are
//! therefore allocated in component construction order and are never reused.
//!
//! Each identifier also remembers which [`FormEntryContext`](crate::FormEntryContext) issued it,
//! so a widget handle that leaks into another context is rejected instead of silently reading
//! somebody else's field.

use crate::constants::FIELD_PREFIX;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one form entry context instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable wire name of a registered widget, scoped to one context.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldIdentifier {
    context: ContextId,
    sequence: u32,
    name: String,
}

impl FieldIdentifier {
    /// The name used in rendered markup and in the submitted key/value pairs.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub(crate) fn context(&self) -> ContextId {
        self.context
    }

    /// Key of a sub-field carried next to this field, such as `w4hours` or `w7_hid`.
    pub fn with_suffix(&self, suffix: &str) -> String {
        format!("{}{}", self.name, suffix)
    }
}

impl fmt::Display for FieldIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Monotonic per-context identifier sequence.
#[derive(Debug)]
pub struct FieldIdentifierAllocator {
    context: ContextId,
    last: u32,
}

impl FieldIdentifierAllocator {
    pub(crate) fn new(context: ContextId) -> Self {
        Self { context, last: 0 }
    }

    /// Returns the next unused identifier. The first identifier is `w1`.
    pub fn allocate(&mut self) -> FieldIdentifier {
        self.last += 1;
        let id = FieldIdentifier {
            context: self.context,
            sequence: self.last,
            name: format!("{FIELD_PREFIX}{}", self.last),
        };
        tracing::trace!(field = %id, "allocated field identifier");
        id
    }

    /// Number of identifiers issued so far.
    pub fn issued(&self) -> u32 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn allocate_is_monotonic_and_never_repeats() {
        let mut allocator = FieldIdentifierAllocator::new(ContextId::next());
        let ids: Vec<_> = (0..50).map(|_| allocator.allocate()).collect();

        assert_eq!(ids[0].as_str(), "w1");
        assert_eq!(ids[49].as_str(), "w50");
        let unique: HashSet<_> = ids.iter().map(|id| id.as_str().to_owned()).collect();
        assert_eq!(unique.len(), 50);
        assert!(ids.windows(2).all(|w| w[0].sequence() < w[1].sequence()));
        assert_eq!(allocator.issued(), 50);
    }

    #[test]
    fn identifiers_from_different_contexts_are_distinct() {
        let mut first = FieldIdentifierAllocator::new(ContextId::next());
        let mut second = FieldIdentifierAllocator::new(ContextId::next());

        let a = first.allocate();
        let b = second.allocate();
        assert_eq!(a.as_str(), b.as_str());
        assert_ne!(a, b);
    }

    #[test]
    fn with_suffix_appends_to_wire_name() {
        let mut allocator = FieldIdentifierAllocator::new(ContextId::next());
        let id = allocator.allocate();
        assert_eq!(id.with_suffix("hours"), "w1hours");
        assert_eq!(id.with_suffix("_hid"), "w1_hid");
    }
}
