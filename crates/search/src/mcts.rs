//! MCTS tree over partial orderings.
//!
//! The tree is an arena: nodes live in one `Vec`, ids are indices, and
//! parents are index back-references. It only grows, so ids stay valid
//! for the whole search. Each node's completed prefix is reconstructed
//! by walking to the root.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use cadence_core::bench::BenchResult;
use cadence_core::error::{CoreError, Result};
use cadence_core::graph::Graph;
use cadence_core::ops::{BoundOp, OpRef};
use cadence_core::platform::Platform;
use cadence_core::sequence::Sequence;

use crate::frontier::frontier;
use crate::strategy::Strategy;

const EXPLORATION: f32 = std::f32::consts::SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

#[derive(Debug)]
pub struct Node<S: Strategy> {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub op: BoundOp,
    /// Children have been generated.
    pub expanded: bool,
    /// No unexplored orderings remain below this node.
    pub fully_visited: bool,
    /// Optimistic value before the first playout.
    pub value_estimate: f32,
    /// Playouts through this node.
    pub n: u64,
    pub state: S::State,
}

impl<S: Strategy> Node<S> {
    fn new(id: NodeId, parent: Option<NodeId>, op: BoundOp) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            op,
            expanded: false,
            fully_visited: false,
            value_estimate: f32::INFINITY,
            n: 0,
            state: S::State::default(),
        }
    }
}

#[derive(Debug)]
pub struct Tree<S: Strategy> {
    pub(crate) nodes: Vec<Node<S>>,
    rng: StdRng,
    stream_budget: usize,
}

/// Move the platform's event allocator past every handle the path
/// already uses. Node ops keep the handles they were created with, and
/// the allocator is rewound between iterations; without re-arming, a
/// fresh allocation could collide with a handle baked into the path.
fn rearm_events(plat: &mut Platform, completed: &Sequence) -> Result<()> {
    let max = completed.iter().filter_map(|op| op.event()).map(|e| e.0).max();
    if let Some(max) = max {
        plat.ensure_events(max as usize + 1)?;
    }
    Ok(())
}

impl<S: Strategy> Tree<S> {
    pub fn new(g: &Graph, seed: u64, stream_budget: usize) -> Result<Self> {
        let root_op = match g.start() {
            OpRef::Bound(b) => b.clone(),
            OpRef::Unbound(u) => {
                return Err(CoreError::Config(format!(
                    "graph start {} must be a bound operation",
                    u.name()
                )))
            }
        };
        Ok(Self {
            nodes: vec![Node::new(NodeId(0), None, root_op)],
            rng: StdRng::seed_from_u64(seed),
            stream_budget,
        })
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node<S> {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_fully_visited(&self) -> bool {
        self.nodes[0].fully_visited
    }

    /// A leaf has no children yet, or a child that has never played.
    pub fn is_leaf(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        node.children.is_empty() || node.children.iter().any(|c| self.nodes[c.0].n == 0)
    }

    /// Terminal nodes carry a graph op with no successors. Inserted
    /// sync ops are never terminal: they exist to unlock a consumer.
    pub fn is_terminal(&self, id: NodeId, g: &Graph) -> bool {
        let op = &self.nodes[id.0].op;
        if op.is_sync() {
            return false;
        }
        g.succs_or_unbound(op).is_none_or(|s| s.is_empty())
    }

    /// The completed prefix along the path from the root to `id`.
    pub fn path(&self, id: NodeId) -> Sequence {
        let mut ops = Vec::new();
        let mut cur = Some(id);
        while let Some(i) = cur {
            ops.push(self.nodes[i.0].op.clone());
            cur = self.nodes[i.0].parent;
        }
        ops.reverse();
        ops.into_iter().collect()
    }

    /// Descend by UCT until a leaf or terminal node.
    pub fn select(&mut self, ctx: &S::Context, g: &Graph) -> NodeId {
        let mut cur = NodeId(0);
        loop {
            if self.is_leaf(cur) || self.is_terminal(cur, g) {
                return cur;
            }

            let parent = &self.nodes[cur.0];
            let mut best: Vec<NodeId> = Vec::new();
            let mut best_uct = f32::NEG_INFINITY;
            for &cid in &parent.children {
                let child = &self.nodes[cid.0];
                if child.fully_visited {
                    // no orderings left below; drop from consideration
                    continue;
                }
                let explore =
                    EXPLORATION * ((parent.n as f32).ln() / (child.n.max(1) as f32)).sqrt();
                let uct = S::select(ctx, parent, child) + explore;
                trace!("uct of {}: {} (n={})", child.op.desc(), uct, child.n);
                if uct > best_uct {
                    best_uct = uct;
                    best.clear();
                }
                if uct >= best_uct {
                    best.push(cid);
                }
            }

            let Some(&pick) = best.first() else {
                // every child fully visited; this subtree is exhausted
                return cur;
            };
            cur = if best.len() == 1 {
                pick
            } else {
                // ties broken uniformly at random
                best[self.rng.random_range(0..best.len())]
            };
        }
    }

    /// Generate children for `id` if needed and return the first child
    /// with no playouts; returns `id` itself at a terminal node.
    pub fn expand(&mut self, id: NodeId, g: &Graph, plat: &mut Platform) -> Result<NodeId> {
        if !self.nodes[id.0].expanded {
            let completed = self.path(id);
            rearm_events(plat, &completed)?;
            let front = frontier(plat, g, &completed, self.stream_budget)?;
            for op in front {
                let exists =
                    self.nodes[id.0].children.iter().any(|c| self.nodes[c.0].op == op);
                if exists {
                    continue;
                }
                let cid = NodeId(self.nodes.len());
                self.nodes.push(Node::new(cid, Some(id), op));
                self.nodes[id.0].children.push(cid);
            }
            self.nodes[id.0].expanded = true;
            debug!(
                "expanded {} children under {}",
                self.nodes[id.0].children.len(),
                self.nodes[id.0].op.desc()
            );
        }

        let node = &self.nodes[id.0];
        if node.children.is_empty() {
            return Ok(id); // terminal
        }
        for &cid in &node.children {
            if self.nodes[cid.0].n == 0 {
                return Ok(cid);
            }
        }
        Err(CoreError::Invariant(format!(
            "expand: every child of {} has already played",
            node.op.desc()
        )))
    }

    /// Complete the schedule from `id` by uniformly random legal moves.
    pub fn simulation_order(
        &mut self,
        id: NodeId,
        g: &Graph,
        plat: &mut Platform,
    ) -> Result<Vec<BoundOp>> {
        let mut seq = self.path(id);
        rearm_events(plat, &seq)?;
        loop {
            let front = frontier(plat, g, &seq, self.stream_budget)?;
            if front.is_empty() {
                break;
            }
            let pick = self.rng.random_range(0..front.len());
            seq.push(front[pick].clone());
        }
        Ok(seq.ops().to_vec())
    }

    /// Fold a benchmark result into the path from `id` to the root.
    pub fn backprop(
        &mut self,
        ctx: &mut S::Context,
        g: &Graph,
        id: NodeId,
        result: &BenchResult,
    ) {
        let mut cur = Some(id);
        while let Some(i) = cur {
            let subtree_done = {
                let node = &self.nodes[i.0];
                if node.children.is_empty() {
                    node.expanded || self.is_terminal(i, g)
                } else {
                    node.children.iter().all(|c| self.nodes[c.0].fully_visited)
                }
            };

            let node = &mut self.nodes[i.0];
            node.n += 1;
            if subtree_done && !node.fully_visited {
                node.fully_visited = true;
                debug!("{} fully visited", node.op.desc());
            }
            S::backprop(ctx, node, result);
            cur = self.nodes[i.0].parent;
        }
    }
}
