//! Value strategies.
//!
//! A strategy supplies the exploitation half of UCT and the accumulator
//! each node keeps across playouts. The driver owns the strategy's
//! context, the aggregated search state such as the global latency range.

use cadence_core::bench::BenchResult;

use crate::mcts::Node;

pub trait Strategy: Sized {
    /// Aggregated search state held by the driver.
    type Context: Default + std::fmt::Debug;
    /// Per-node accumulator.
    type State: Default + std::fmt::Debug;

    fn name() -> &'static str;

    /// Exploitation term for `child` under `parent`.
    fn select(ctx: &Self::Context, parent: &Node<Self>, child: &Node<Self>) -> f32;

    /// Fold one benchmark result into `node` (and the context).
    fn backprop(ctx: &mut Self::Context, node: &mut Node<Self>, result: &BenchResult);
}

/// Sorted latency observations.
#[derive(Debug, Clone, Default)]
pub struct TimesState {
    times: Vec<f64>,
}

impl TimesState {
    pub fn insert(&mut self, t: f64) {
        let i = self.times.partition_point(|x| *x < t);
        self.times.insert(i, t);
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn min(&self) -> Option<f64> {
        self.times.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.times.last().copied()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }
}

/// Running latency range across the whole search.
#[derive(Debug, Clone, Copy)]
pub struct RangeContext {
    pub t_min: f64,
    pub t_max: f64,
}

impl Default for RangeContext {
    fn default() -> Self {
        Self { t_min: f64::INFINITY, t_max: f64::NEG_INFINITY }
    }
}

impl RangeContext {
    pub fn observe(&mut self, t: f64) {
        if t < self.t_min {
            self.t_min = t;
        }
        if t > self.t_max {
            self.t_max = t;
        }
    }

    pub fn span(&self) -> f64 {
        self.t_max - self.t_min
    }
}

/// Prefers children whose observed latency span is wide relative to the
/// global range: a wide spread means the subtree still distinguishes
/// good orderings from bad ones.
#[derive(Debug)]
pub struct NormalizedRange;

impl Strategy for NormalizedRange {
    type Context = RangeContext;
    type State = TimesState;

    fn name() -> &'static str {
        "normalized-range"
    }

    fn select(ctx: &Self::Context, _parent: &Node<Self>, child: &Node<Self>) -> f32 {
        let (Some(min), Some(max)) = (child.state.min(), child.state.max()) else {
            return child.value_estimate;
        };
        let span = ctx.span();
        if !span.is_finite() || span <= 0.0 {
            return 0.0;
        }
        ((max - min) / span) as f32
    }

    fn backprop(ctx: &mut Self::Context, node: &mut Node<Self>, result: &BenchResult) {
        let median = result.pct50;
        node.state.insert(median);
        ctx.observe(median);
    }
}

/// Prefers children with the smallest observed latency; lower is
/// better, so the term is negated.
#[derive(Debug)]
pub struct MinTime;

#[derive(Debug, Default)]
pub struct MinTimeContext;

impl Strategy for MinTime {
    type Context = MinTimeContext;
    type State = TimesState;

    fn name() -> &'static str {
        "min-time"
    }

    fn select(_ctx: &Self::Context, _parent: &Node<Self>, child: &Node<Self>) -> f32 {
        match child.state.min() {
            Some(min) => -(min as f32),
            None => child.value_estimate,
        }
    }

    fn backprop(_ctx: &mut Self::Context, node: &mut Node<Self>, result: &BenchResult) {
        node.state.insert(result.pct01);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_times_state_stays_sorted() {
        let mut st = TimesState::default();
        st.insert(3.0);
        st.insert(1.0);
        st.insert(2.0);

        assert_eq!(st.times(), &[1.0, 2.0, 3.0]);
        assert_eq!(st.min(), Some(1.0));
        assert_eq!(st.max(), Some(3.0));
    }

    #[test]
    fn test_range_context_tracks_extremes() {
        let mut ctx = RangeContext::default();
        assert!(ctx.span().is_infinite() || ctx.span().is_nan());

        ctx.observe(2.0);
        ctx.observe(5.0);
        ctx.observe(3.0);
        assert_eq!(ctx.t_min, 2.0);
        assert_eq!(ctx.t_max, 5.0);
        assert_eq!(ctx.span(), 3.0);
    }
}
