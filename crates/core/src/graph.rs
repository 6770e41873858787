//! Operation DAG.
//!
//! Bidirectional adjacency over [`OpRef`] vertices with a distinguished
//! `start`. Ordered maps keep iteration deterministic, which in turn
//! keeps frontier generation and searches reproducible under a fixed
//! seed.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{CoreError, Result};
use crate::ops::{BoundOp, OpRef};

#[derive(Clone, Debug)]
pub struct Graph {
    start: OpRef,
    preds: BTreeMap<OpRef, BTreeSet<OpRef>>,
    succs: BTreeMap<OpRef, BTreeSet<OpRef>>,
}

impl Graph {
    pub fn new(start: OpRef) -> Self {
        let mut preds = BTreeMap::new();
        let mut succs = BTreeMap::new();
        preds.insert(start.clone(), BTreeSet::new());
        succs.insert(start.clone(), BTreeSet::new());
        Self { start, preds, succs }
    }

    pub fn start(&self) -> &OpRef {
        &self.start
    }

    pub fn add_vertex(&mut self, op: OpRef) {
        self.preds.entry(op.clone()).or_default();
        self.succs.entry(op).or_default();
    }

    /// Add the edge `u -> v`, inserting either vertex if absent.
    pub fn add_edge(&mut self, u: &OpRef, v: &OpRef) {
        self.add_vertex(u.clone());
        self.add_vertex(v.clone());
        self.succs.get_mut(u).unwrap().insert(v.clone());
        self.preds.get_mut(v).unwrap().insert(u.clone());
    }

    pub fn contains(&self, op: &OpRef) -> bool {
        self.succs.contains_key(op)
    }

    pub fn preds_of(&self, op: &OpRef) -> Option<&BTreeSet<OpRef>> {
        self.preds.get(op)
    }

    pub fn succs_of(&self, op: &OpRef) -> Option<&BTreeSet<OpRef>> {
        self.succs.get(op)
    }

    /// Successors of `op`, falling back to the unbound form when the
    /// bound operation itself is not a vertex. Lets a stream-bound
    /// accelerator op find the successors of the graph's unbound vertex.
    pub fn succs_or_unbound(&self, op: &BoundOp) -> Option<&BTreeSet<OpRef>> {
        let exact = OpRef::Bound(op.clone());
        if let Some(s) = self.succs.get(&exact) {
            return Some(s);
        }
        let unbound = op.unbound()?;
        self.succs.get(&OpRef::Unbound(unbound.clone()))
    }

    /// Predecessors of `op`, with the same unbound fallback.
    pub fn preds_or_unbound(&self, op: &BoundOp) -> Option<&BTreeSet<OpRef>> {
        let exact = OpRef::Bound(op.clone());
        if let Some(p) = self.preds.get(&exact) {
            return Some(p);
        }
        let unbound = op.unbound()?;
        self.preds.get(&OpRef::Unbound(unbound.clone()))
    }

    pub fn vertices(&self) -> impl Iterator<Item = &OpRef> {
        self.succs.keys()
    }

    pub fn len(&self) -> usize {
        self.succs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.succs.is_empty()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&OpRef> {
        self.vertices().find(|op| op.name() == name)
    }

    /// Rewire every edge incident to `old` onto `new`.
    pub fn replace(&mut self, old: &OpRef, new: OpRef) -> Result<()> {
        let preds = self
            .preds
            .remove(old)
            .ok_or_else(|| CoreError::Invariant(format!("replace: {} not in graph", old.desc())))?;
        let succs = self.succs.remove(old).unwrap_or_default();

        for p in &preds {
            if let Some(s) = self.succs.get_mut(p) {
                s.remove(old);
                s.insert(new.clone());
            }
        }
        for s in &succs {
            if let Some(p) = self.preds.get_mut(s) {
                p.remove(old);
                p.insert(new.clone());
            }
        }

        self.preds.insert(new.clone(), preds);
        self.succs.insert(new.clone(), succs);
        if self.start == *old {
            self.start = new;
        }
        Ok(())
    }

    /// Copy of the graph with the unbound form of `op` replaced by `op`
    /// itself. Already-bound vertices pass through unchanged.
    pub fn bind_vertex(&self, op: &BoundOp) -> Result<Graph> {
        let bound = OpRef::Bound(op.clone());
        if self.contains(&bound) {
            return Ok(self.clone());
        }
        let Some(unbound) = op.unbound() else {
            return Err(CoreError::Invariant(format!(
                "{} has no unbound form to bind",
                op.desc()
            )));
        };
        let mut out = self.clone();
        out.replace(&OpRef::Unbound(unbound.clone()), bound)?;
        Ok(out)
    }

    /// Check structural invariants: mirrored edges, a predecessor-free
    /// start vertex, and acyclicity.
    pub fn validate(&self) -> Result<()> {
        for (u, succs) in &self.succs {
            for v in succs {
                if !self.preds.get(v).is_some_and(|p| p.contains(u)) {
                    return Err(CoreError::Invariant(format!(
                        "edge {} -> {} missing its reverse",
                        u.desc(),
                        v.desc()
                    )));
                }
            }
        }
        for (v, preds) in &self.preds {
            for u in preds {
                if !self.succs.get(u).is_some_and(|s| s.contains(v)) {
                    return Err(CoreError::Invariant(format!(
                        "reverse edge {} <- {} missing its forward",
                        v.desc(),
                        u.desc()
                    )));
                }
            }
        }

        if !self.preds.get(&self.start).is_some_and(|p| p.is_empty()) {
            return Err(CoreError::Invariant(format!(
                "start vertex {} has predecessors",
                self.start.desc()
            )));
        }

        // Kahn's algorithm; leftover vertices mean a cycle
        let mut indegree: BTreeMap<&OpRef, usize> =
            self.preds.iter().map(|(op, p)| (op, p.len())).collect();
        let mut queue: VecDeque<&OpRef> =
            indegree.iter().filter(|(_, d)| **d == 0).map(|(op, _)| *op).collect();
        let mut seen = 0usize;
        while let Some(op) = queue.pop_front() {
            seen += 1;
            for succ in &self.succs[op] {
                let d = indegree.get_mut(succ).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push_back(succ);
                }
            }
        }
        if seen != self.len() {
            return Err(CoreError::Invariant("graph contains a cycle".into()));
        }
        Ok(())
    }
}
