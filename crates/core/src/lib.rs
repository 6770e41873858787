//! Core model for the cadence ordering searcher: operation sum, DAG,
//! completed-sequence bookkeeping, the execution platform and the seams
//! (device runtime, communicator, benchmarker) collaborators plug into.

pub mod bench;
pub mod comm;
pub mod config;
pub mod device;
pub mod error;
pub mod graph;
pub mod ops;
pub mod platform;
pub mod sequence;
pub mod serdes;
pub mod types;

pub use bench::{BenchResult, Benchmarker};
pub use error::{CoreError, Result};
pub use graph::Graph;
pub use ops::{BoundOp, CpuRef, CpuTask, GpuRef, GpuTask, OpRef};
pub use platform::Platform;
pub use sequence::Sequence;
pub use types::{Event, ExecResource, Stream};
