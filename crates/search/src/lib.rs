//! Ordering search for heterogeneous operation DAGs.
//!
//! Monte Carlo Tree Search over topological orderings augmented with
//! stream assignments and inserted synchronization: the [`sync`] module
//! decides what synchronization a candidate needs, [`frontier`] turns a
//! partial schedule into the set of legal next moves, [`mcts`] holds
//! the tree, [`strategy`] the pluggable value functions, and [`driver`]
//! the SPMD search loop.

pub mod driver;
pub mod frontier;
pub mod mcts;
pub mod strategy;
pub mod sync;

#[cfg(test)]
pub(crate) mod tests_common;

pub use driver::{search, Measurement, SearchOpts, SearchReport};
pub use frontier::{frontier, make_platform_variations};
pub use mcts::{Node, NodeId, Tree};
pub use strategy::{MinTime, NormalizedRange, Strategy};
pub use sync::EventSynchronizer;
