//! Benchmark results and the benchmarker seam.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ops::BoundOp;
use crate::platform::Platform;

/// Percentile summary of one candidate ordering's latency distribution,
/// in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchResult {
    pub pct01: f64,
    pub pct10: f64,
    pub pct50: f64,
    pub pct90: f64,
    pub pct99: f64,
    pub stddev: f64,
}

impl BenchResult {
    /// Summarise a set of latency samples. `samples` need not be sorted.
    pub fn from_samples(samples: &[f64]) -> Result<Self> {
        if samples.is_empty() {
            return Err(CoreError::Invariant("no latency samples".into()));
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let pct = |p: f64| -> f64 {
            let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
            sorted[idx]
        };

        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        let var = sorted.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>() / sorted.len() as f64;

        Ok(Self {
            pct01: pct(1.0),
            pct10: pct(10.0),
            pct50: pct(50.0),
            pct90: pct(90.0),
            pct99: pct(99.0),
            stddev: var.sqrt(),
        })
    }
}

impl std::fmt::Display for BenchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "p01={:.3e} p50={:.3e} p99={:.3e} sd={:.3e}",
            self.pct01, self.pct50, self.pct99, self.stddev
        )
    }
}

/// Measures (or looks up) the latency distribution of an ordering.
pub trait Benchmarker {
    fn benchmark(&mut self, order: &[BoundOp], plat: &mut Platform) -> Result<BenchResult>;
}
