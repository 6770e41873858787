//! Top-level search loop.
//!
//! SPMD: every rank calls [`search`]. Rank 0 owns the tree and drives
//! selection, expansion and playout; each candidate ordering is
//! broadcast by identity, benchmarked on every rank, and rank 0's own
//! result feeds backpropagation. Other ranks hold no tree at all; they
//! measure what they are sent until the stop signal. Each rank keeps
//! its local measurements in its report.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use cadence_comm::wire::broadcast_order;
use cadence_core::bench::{BenchResult, Benchmarker};
use cadence_core::config::SearchConfig;
use cadence_core::error::Result;
use cadence_core::graph::Graph;
use cadence_core::ops::BoundOp;
use cadence_core::platform::Platform;

use crate::mcts::Tree;
use crate::strategy::Strategy;

const ROOT: usize = 0;

#[derive(Debug, Clone)]
pub struct SearchOpts {
    /// Iteration budget.
    pub iters: usize,
    /// Cap on streams allocated for platform variations.
    pub stream_budget: usize,
    /// Seed for rank 0's search trajectory.
    pub seed: u64,
    /// Optional wall-clock cutoff, checked between iterations.
    pub wall_limit: Option<Duration>,
}

impl Default for SearchOpts {
    fn default() -> Self {
        Self { iters: 100, stream_budget: 2, seed: 0, wall_limit: None }
    }
}

impl From<&SearchConfig> for SearchOpts {
    fn from(config: &SearchConfig) -> Self {
        Self {
            iters: config.iters,
            stream_budget: config.streams,
            seed: config.seed,
            wall_limit: config.wall_limit_secs.map(Duration::from_secs),
        }
    }
}

/// One measured candidate ordering.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub order: Vec<BoundOp>,
    pub result: BenchResult,
}

/// Rank-local outcome of a search.
#[derive(Debug, Default)]
pub struct SearchReport {
    pub measurements: Vec<Measurement>,
    pub iterations: usize,
}

impl SearchReport {
    /// The measured ordering with the lowest median latency.
    pub fn best(&self) -> Option<&Measurement> {
        self.measurements.iter().min_by(|a, b| {
            a.result
                .pct50
                .partial_cmp(&b.result.pct50)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

/// Run the search to completion on this rank.
pub fn search<S: Strategy, B: Benchmarker>(
    g: &Graph,
    plat: &mut Platform,
    bench: &mut B,
    opts: &SearchOpts,
) -> Result<SearchReport> {
    g.validate()?;
    let comm = plat.comm().clone();
    let mut report = SearchReport::default();

    if comm.rank() == ROOT {
        let mut tree = Tree::<S>::new(g, opts.seed, opts.stream_budget)?;
        let mut ctx = S::Context::default();
        let started = Instant::now();
        info!(
            "searching {} ops with strategy {} ({} iterations max)",
            g.len(),
            S::name(),
            opts.iters
        );

        loop {
            if report.iterations >= opts.iters {
                info!("iteration budget exhausted");
                broadcast_order(comm.as_ref(), g, None, ROOT)?;
                break;
            }
            if tree.root_fully_visited() {
                info!("every ordering explored after {} iterations", report.iterations);
                broadcast_order(comm.as_ref(), g, None, ROOT)?;
                break;
            }
            if let Some(limit) = opts.wall_limit {
                if started.elapsed() >= limit {
                    info!("wall-clock limit reached after {} iterations", report.iterations);
                    broadcast_order(comm.as_ref(), g, None, ROOT)?;
                    break;
                }
            }

            let selected = tree.select(&ctx, g);
            let child = tree.expand(selected, g, plat)?;
            let order = tree.simulation_order(child, g, plat)?;
            debug!(
                "iteration {}: playout of {} ops from {}",
                report.iterations,
                order.len(),
                tree.node(child).op.desc()
            );

            broadcast_order(comm.as_ref(), g, Some(&order), ROOT)?;
            let result = bench.benchmark(&order, plat)?;
            tree.backprop(&mut ctx, g, child, &result);

            report.measurements.push(Measurement { order, result });
            report.iterations += 1;
            plat.reset_dynamic_resources();
        }

        info!(
            "search finished: {} iterations, tree of {} nodes, ctx {:?}",
            report.iterations,
            tree.len(),
            ctx
        );
    } else {
        while let Some(order) = broadcast_order(comm.as_ref(), g, None, ROOT)? {
            let result = bench.benchmark(&order, plat)?;
            report.measurements.push(Measurement { order, result });
            report.iterations += 1;
            plat.reset_dynamic_resources();
        }
        debug!("rank {} measured {} orderings", comm.rank(), report.iterations);
    }

    Ok(report)
}
