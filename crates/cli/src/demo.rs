//! Demo pipeline: a halo-exchange step of the kind the searcher is
//! meant to reorder. Interior work can overlap the exchange; boundary
//! work cannot start before the received halo is in place.

use std::sync::Arc;

use cadence_core::error::Result;
use cadence_core::graph::Graph;
use cadence_core::ops::mpi::{request_slot, Irecv, Isend, MultiWait};
use cadence_core::ops::{CpuTask, GpuTask, NoOp, OpRef};
use cadence_core::platform::Platform;
use cadence_core::types::Stream;

/// Host work with a fixed arithmetic cost.
struct BusyCpu {
    name: String,
    rounds: u64,
}

impl BusyCpu {
    fn new(name: impl Into<String>, rounds: u64) -> Self {
        Self { name: name.into(), rounds }
    }
}

impl CpuTask for BusyCpu {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _plat: &mut Platform) -> Result<()> {
        let mut acc = 0u64;
        for i in 0..self.rounds {
            acc = acc.wrapping_mul(6364136223846793005).wrapping_add(i);
        }
        std::hint::black_box(acc);
        Ok(())
    }
}

/// Accelerator work; issue cost only under the host-only device runtime.
struct DemoKernel {
    name: String,
}

impl DemoKernel {
    fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl GpuTask for DemoKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _plat: &mut Platform, _stream: Stream) -> Result<()> {
        Ok(())
    }
}

/// One halo-exchange step:
///
/// ```text
/// start -> pack -> {send, recv} -> wait -> boundary
///       \-> interior ----------------------------\
///        boundary, interior -> reduce
/// ```
pub fn demo_graph(rank: usize) -> Graph {
    let start = OpRef::cpu(NoOp::new("start"));
    let pack = OpRef::cpu(BusyCpu::new("pack", 200_000));
    let interior = OpRef::gpu(DemoKernel::new("interior"));
    let boundary = OpRef::gpu(DemoKernel::new("boundary"));
    let reduce = OpRef::cpu(BusyCpu::new("reduce", 100_000));

    // exchange with ourselves when running single-rank
    let send_slot = request_slot();
    let recv_slot = request_slot();
    let payload = Arc::new(vec![0u8; 4096]);
    let send = OpRef::cpu(Isend::new("halo-send", rank, 0, payload, send_slot.clone()));
    let recv = OpRef::cpu(Irecv::new("halo-recv", rank, 0, 4096, recv_slot.clone()));
    let mut wait = MultiWait::new("halo-wait");
    wait.add_slot(send_slot);
    wait.add_slot(recv_slot);
    let wait = OpRef::cpu(wait);

    let mut g = Graph::new(start.clone());
    g.add_edge(&start, &pack);
    g.add_edge(&start, &interior);
    g.add_edge(&pack, &send);
    g.add_edge(&pack, &recv);
    g.add_edge(&send, &wait);
    g.add_edge(&recv, &wait);
    g.add_edge(&wait, &boundary);
    g.add_edge(&interior, &reduce);
    g.add_edge(&boundary, &reduce);
    g
}
