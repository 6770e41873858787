//! Wall-clock benchmarking of candidate orderings.

use std::time::Instant;

use tracing::trace;

use cadence_core::bench::{BenchResult, Benchmarker};
use cadence_core::error::Result;
use cadence_core::ops::BoundOp;
use cadence_core::platform::Platform;

/// Runs an ordering `samples` times and summarises the latency
/// distribution. Before each run the platform's event allocator is
/// rewound and re-armed for the handles the ordering uses, so physical
/// events are reused across runs.
pub struct EmpiricalBenchmarker {
    pub samples: usize,
}

impl EmpiricalBenchmarker {
    pub fn new(samples: usize) -> Self {
        Self { samples: samples.max(1) }
    }
}

impl Default for EmpiricalBenchmarker {
    fn default() -> Self {
        Self::new(30)
    }
}

/// Highest stream and event handles an ordering touches.
fn handle_extent(order: &[BoundOp]) -> (u32, Option<u32>) {
    let mut max_stream = 0u32;
    let mut stream = |s: cadence_core::types::Stream| {
        if s.0 > max_stream {
            max_stream = s.0;
        }
    };
    for op in order {
        match op {
            BoundOp::Cpu(_) | BoundOp::EventSync { .. } => {}
            BoundOp::Gpu { stream: s, .. }
            | BoundOp::EventRecord { stream: s, .. }
            | BoundOp::StreamWaitEvent { stream: s, .. }
            | BoundOp::StreamSync { stream: s } => stream(*s),
            BoundOp::StreamWait { waitee, waiter, .. } => {
                stream(*waitee);
                stream(*waiter);
            }
        }
    }
    let max_event = order.iter().filter_map(|op| op.event()).map(|e| e.0).max();
    (max_stream, max_event)
}

impl Benchmarker for EmpiricalBenchmarker {
    fn benchmark(&mut self, order: &[BoundOp], plat: &mut Platform) -> Result<BenchResult> {
        // the ordering may come from another rank; grow to fit its handles
        let (max_stream, max_event) = handle_extent(order);
        plat.ensure_streams(max_stream as usize)?;

        let mut times = Vec::with_capacity(self.samples);
        for run in 0..self.samples {
            plat.reset_dynamic_resources();
            if let Some(e) = max_event {
                plat.ensure_events(e as usize + 1)?;
            }

            let started = Instant::now();
            for op in order {
                op.run(plat)?;
            }
            plat.sync_all()?;
            let elapsed = started.elapsed().as_secs_f64();
            trace!("run {run}: {elapsed:.3e}s over {} ops", order.len());
            times.push(elapsed);
        }
        BenchResult::from_samples(&times)
    }
}
