use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use cadence_comm::local::LocalComm;
use cadence_core::bench::{BenchResult, Benchmarker};
use cadence_core::device::NullDevice;
use cadence_core::error::Result;
use cadence_core::graph::Graph;
use cadence_core::ops::{BoundOp, GpuTask, NoOp, OpRef};
use cadence_core::platform::Platform;
use cadence_core::sequence::Sequence;
use cadence_core::serdes::op_from_ident;
use cadence_core::types::Stream;

pub struct TestGpu {
    name: String,
}

impl TestGpu {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl GpuTask for TestGpu {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _plat: &mut Platform, _stream: Stream) -> Result<()> {
        Ok(())
    }
}

pub fn cpu(name: &str) -> OpRef {
    OpRef::cpu(NoOp::new(name))
}

pub fn gpu(name: &str) -> OpRef {
    OpRef::gpu(TestGpu::new(name))
}

pub fn cpu_bound(name: &str) -> BoundOp {
    BoundOp::cpu(NoOp::new(name))
}

/// The graph's start vertex as a runnable op.
pub fn start_op(g: &Graph) -> BoundOp {
    g.start().as_bound().expect("start must be bound").clone()
}

/// Bind a graph accelerator op to a stream by identity.
pub fn bound(g: &Graph, name: &str, stream: u32) -> BoundOp {
    op_from_ident(&format!("{name}@{stream}"), g).unwrap()
}

pub fn solo_platform(streams: usize) -> Platform {
    Platform::with_streams(streams, Box::new(NullDevice::new()), Arc::new(LocalComm::solo()))
        .unwrap()
}

/// start -> a -> b -> c, all host ops.
pub fn chain_cpu_graph() -> Graph {
    let start = cpu("start");
    let a = cpu("a");
    let b = cpu("b");
    let c = cpu("c");
    let mut g = Graph::new(start.clone());
    g.add_edge(&start, &a);
    g.add_edge(&a, &b);
    g.add_edge(&b, &c);
    g
}

/// start -> k1 -> k2, both accelerator ops.
pub fn chain_gpu_graph() -> (Graph, Vec<OpRef>) {
    let start = cpu("start");
    let k1 = gpu("k1");
    let k2 = gpu("k2");
    let mut g = Graph::new(start.clone());
    g.add_edge(&start, &k1);
    g.add_edge(&k1, &k2);
    (g, vec![start, k1, k2])
}

/// start -> {b, c} -> d; b and c are accelerator ops, d is host.
pub fn diamond_graph() -> (Graph, Vec<OpRef>) {
    let start = cpu("start");
    let b = gpu("b");
    let c = gpu("c");
    let d = cpu("d");
    let mut g = Graph::new(start.clone());
    g.add_edge(&start, &b);
    g.add_edge(&start, &c);
    g.add_edge(&b, &d);
    g.add_edge(&c, &d);
    (g, vec![start, b, c, d])
}

/// Random DAG of `n` operations beyond the start vertex, mixing host
/// and accelerator ops. Every root hangs off start, so the whole graph
/// is reachable.
pub fn random_dag(rng: &mut StdRng, n: usize) -> Graph {
    let start = cpu("start");
    let mut g = Graph::new(start.clone());

    let mut vertices = vec![start];
    for i in 0..n {
        let name = format!("v{i}");
        let v = if rng.random_bool(0.5) { gpu(&name) } else { cpu(&name) };
        // wire to one or two earlier vertices (possibly start)
        let npreds = 1 + usize::from(rng.random_bool(0.4) && vertices.len() > 1);
        for _ in 0..npreds {
            let p = rng.random_range(0..vertices.len());
            let pred = vertices[p].clone();
            g.add_edge(&pred, &v);
        }
        vertices.push(v);
    }
    g.validate().unwrap();
    g
}

/// Sequence holding just the start vertex, the root of every search path.
pub fn seed_sequence(g: &Graph) -> Sequence {
    let mut seq = Sequence::new();
    seq.push(start_op(g));
    seq
}

/// Benchmarker returning a fixed latency, optionally biased per ordering
/// length so strategies have a gradient to follow.
pub struct ConstBench {
    pub latency: f64,
}

impl Benchmarker for ConstBench {
    fn benchmark(&mut self, order: &[BoundOp], _plat: &mut Platform) -> Result<BenchResult> {
        // mildly penalise longer schedules so results are not all ties
        let t = self.latency * (1.0 + order.len() as f64 / 100.0);
        BenchResult::from_samples(&[t])
    }
}

/// Count graph (non-sync) operations in an ordering.
pub fn graph_ops(order: &[BoundOp]) -> Vec<&BoundOp> {
    order.iter().filter(|op| !op.is_sync()).collect()
}

/// Helper for `Rng` trait methods on seeded rngs in tests.
pub fn seeded(seed: u64) -> StdRng {
    use rand::SeedableRng;
    StdRng::seed_from_u64(seed)
}
