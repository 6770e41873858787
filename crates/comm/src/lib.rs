//! Distributed coordination for cadence.
//!
//! [`wire`] carries candidate orderings from rank 0 to every other rank
//! by identity string; [`local`] provides an in-process
//! [`Communicator`](cadence_core::comm::Communicator) for single-process
//! runs and thread-backed multi-rank tests.

pub mod local;
pub mod wire;

pub use local::{local_cluster, LocalComm};
pub use wire::broadcast_order;
