//! Completed-schedule prefix.
//!
//! An append-only list of bound operations with two membership tests:
//! exact identity and identity-modulo-stream-binding. Hash indices keep
//! both O(1) as schedules grow; the synchronizer's positional queries
//! walk the underlying slice.

use std::collections::HashSet;

use crate::ops::{BoundOp, OpRef};

#[derive(Clone, Default)]
pub struct Sequence {
    ops: Vec<BoundOp>,
    idents: HashSet<String>,
    unbound_keys: HashSet<(u8, String)>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: BoundOp) {
        self.idents.insert(op.ident());
        self.unbound_keys.insert(op.unbound_key());
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[BoundOp] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BoundOp> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Exact membership: variant, fields and stream binding all match.
    pub fn contains(&self, op: &BoundOp) -> bool {
        self.idents.contains(&op.ident())
    }

    /// Membership ignoring stream bindings: true if any element equals
    /// `op` or has the same underlying unbound operation.
    pub fn contains_unbound(&self, op: &OpRef) -> bool {
        self.unbound_keys.contains(&op.unbound_key())
    }

    /// Index of the last element matching `op` modulo binding.
    pub fn position_unbound(&self, op: &OpRef) -> Option<usize> {
        let key = op.unbound_key();
        self.ops.iter().rposition(|o| o.unbound_key() == key)
    }

    /// The completed (bound) instance of `op`, if any.
    pub fn find_unbound(&self, op: &OpRef) -> Option<&BoundOp> {
        self.position_unbound(op).map(|i| &self.ops[i])
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.ops == other.ops
    }
}
impl Eq for Sequence {}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let descs: Vec<String> = self.ops.iter().map(|o| o.desc()).collect();
        write!(f, "[{}]", descs.join(", "))
    }
}

impl FromIterator<BoundOp> for Sequence {
    fn from_iter<I: IntoIterator<Item = BoundOp>>(iter: I) -> Self {
        let mut seq = Sequence::new();
        for op in iter {
            seq.push(op);
        }
        seq
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a BoundOp;
    type IntoIter = std::slice::Iter<'a, BoundOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
