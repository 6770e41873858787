//! Frontier expansion.
//!
//! Given the graph and a completed prefix, produce every operation that
//! may legally run next: graph candidates whose predecessors are all
//! complete, expanded into per-stream variations, each admitted directly
//! if synced or represented by its missing synchronization ops.

use tracing::debug;

use cadence_core::error::Result;
use cadence_core::graph::Graph;
use cadence_core::ops::{BoundOp, OpRef};
use cadence_core::platform::Platform;
use cadence_core::sequence::Sequence;

use crate::sync::EventSynchronizer;

/// All stream assignments worth considering for `candidate`.
///
/// Host and already-bound ops have exactly one variation: themselves.
/// An unbound accelerator op gets one variation per non-default stream;
/// a fresh stream is allocated while the platform is below
/// `stream_budget`, so the search is not exhaustive over assignments
/// beyond that cap.
pub fn make_platform_variations(
    plat: &mut Platform,
    candidate: &OpRef,
    stream_budget: usize,
) -> Result<Vec<BoundOp>> {
    match candidate {
        OpRef::Bound(b) => Ok(vec![b.clone()]),
        OpRef::Unbound(op) => {
            if plat.num_streams() < stream_budget.max(1) {
                plat.new_stream()?;
            }
            Ok(plat
                .streams()
                .iter()
                .filter(|s| !s.is_default())
                .map(|s| BoundOp::Gpu { op: op.clone(), stream: *s })
                .collect())
        }
    }
}

/// The set of operations that may legally be appended to `completed`.
/// Empty iff every operation reachable from the start vertex is done.
pub fn frontier(
    plat: &mut Platform,
    g: &Graph,
    completed: &Sequence,
    stream_budget: usize,
) -> Result<Vec<BoundOp>> {
    // gather: graph roots, plus successors of everything completed
    let mut gathered: Vec<&OpRef> = Vec::new();
    for v in g.vertices() {
        if g.preds_of(v).is_some_and(|p| p.is_empty()) && !gathered.contains(&v) {
            gathered.push(v);
        }
    }
    for c in completed.iter() {
        if let Some(succs) = g.succs_or_unbound(c) {
            for s in succs {
                if !gathered.contains(&s) {
                    gathered.push(s);
                }
            }
        }
    }

    // keep candidates that are new and whose predecessors are all done
    let candidates: Vec<&OpRef> = gathered
        .into_iter()
        .filter(|x| {
            !completed.contains_unbound(x)
                && g.preds_of(x)
                    .is_none_or(|ps| ps.iter().all(|p| completed.contains_unbound(p)))
        })
        .collect();

    let mut result: Vec<BoundOp> = Vec::new();
    for candidate in candidates {
        let variations = make_platform_variations(plat, candidate, stream_budget)?;
        for v in variations {
            if EventSynchronizer::is_synced(&v, g, completed) {
                push_unique(&mut result, v);
            } else {
                // the variation is not runnable yet; its missing syncs are
                for s in EventSynchronizer::make_syncs(&v, g, completed, plat)? {
                    push_unique(&mut result, s);
                }
            }
        }
    }

    debug!("frontier of {} ops for {} completed", result.len(), completed.len());
    Ok(result)
}

fn push_unique(ops: &mut Vec<BoundOp>, op: BoundOp) {
    if !ops.contains(&op) {
        ops.push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_common::*;
    use cadence_core::types::Stream;

    #[test]
    fn test_chain_frontier_is_sequential() {
        let g = chain_cpu_graph();
        let mut plat = solo_platform(1);

        let empty = Sequence::new();
        let f = frontier(&mut plat, &g, &empty, 1).unwrap();
        assert_eq!(f, vec![start_op(&g)]);

        let mut completed = seed_sequence(&g);
        let f = frontier(&mut plat, &g, &completed, 1).unwrap();
        assert_eq!(f, vec![cpu_bound("a")]);

        completed.push(cpu_bound("a"));
        let f = frontier(&mut plat, &g, &completed, 1).unwrap();
        assert_eq!(f, vec![cpu_bound("b")]);

        completed.push(cpu_bound("b"));
        completed.push(cpu_bound("c"));
        assert!(frontier(&mut plat, &g, &completed, 1).unwrap().is_empty());
    }

    #[test]
    fn test_diamond_offers_stream_variations() {
        let (g, _) = diamond_graph();
        let mut plat = solo_platform(2);

        let completed = seed_sequence(&g);
        let f = frontier(&mut plat, &g, &completed, 2).unwrap();

        assert!(f.contains(&bound(&g, "b", 1)));
        assert!(f.contains(&bound(&g, "b", 2)));
        assert!(f.contains(&bound(&g, "c", 1)));
        assert!(f.contains(&bound(&g, "c", 2)));
        assert_eq!(f.len(), 4);
    }

    #[test]
    fn test_unsynced_candidate_contributes_syncs_not_itself() {
        let (g, _) = diamond_graph();
        let mut plat = solo_platform(2);

        let mut completed = seed_sequence(&g);
        completed.push(bound(&g, "b", 1));
        completed.push(bound(&g, "c", 2));

        let f = frontier(&mut plat, &g, &completed, 2).unwrap();
        // d itself is not runnable; its record/sync ops are
        assert!(!f.contains(&cpu_bound("d")));
        assert!(f.iter().all(|op| op.is_sync()));
        assert!(!f.is_empty());
    }

    #[test]
    fn test_sync_completion_unlocks_candidate() {
        let (g, _) = diamond_graph();
        let mut plat = solo_platform(2);

        let mut completed = seed_sequence(&g);
        completed.push(bound(&g, "b", 1));
        completed.push(bound(&g, "c", 2));

        // drain sync ops until d becomes runnable
        loop {
            let f = frontier(&mut plat, &g, &completed, 2).unwrap();
            if f.contains(&cpu_bound("d")) {
                break;
            }
            assert!(!f.is_empty(), "frontier dried up before d became runnable");
            completed.push(f[0].clone());
        }
    }

    #[test]
    fn test_stream_budget_caps_variations() {
        let (g, _) = diamond_graph();
        let mut plat = solo_platform(0);

        let completed = seed_sequence(&g);
        let f = frontier(&mut plat, &g, &completed, 1).unwrap();

        // budget 1: a single stream is allocated, two candidates on it
        assert_eq!(plat.num_streams(), 1);
        assert_eq!(f, vec![bound(&g, "b", 1), bound(&g, "c", 1)]);
    }

    #[test]
    fn test_frontier_legality_and_completeness_on_random_dags() {
        let mut rng = seeded(42);
        for _ in 0..20 {
            let g = random_dag(&mut rng, 8);
            let mut plat = solo_platform(2);
            let mut completed = Sequence::new();

            let total_vertices = g.len();
            let mut done_vertices = 0usize;
            loop {
                let f = frontier(&mut plat, &g, &completed, 2).unwrap();
                if done_vertices == total_vertices {
                    assert!(f.is_empty(), "frontier nonempty after completion");
                    break;
                }
                assert!(!f.is_empty(), "frontier empty before completion");

                for op in &f {
                    if op.is_sync() {
                        continue;
                    }
                    // every graph op offered must have all preds done and be synced
                    let preds = g
                        .preds_or_unbound(op)
                        .expect("frontier op not in graph");
                    for p in preds {
                        assert!(completed.contains_unbound(p), "pred {} missing", p.desc());
                    }
                    assert!(crate::sync::EventSynchronizer::is_synced(op, &g, &completed));
                }

                // take a pseudo-random legal step
                use rand::Rng;
                let pick = rng.random_range(0..f.len());
                if !f[pick].is_sync() {
                    done_vertices += 1;
                }
                completed.push(f[pick].clone());
            }
        }
    }

    #[test]
    fn test_result_is_deduplicated() {
        let (g, _) = diamond_graph();
        let mut plat = solo_platform(2);

        let completed = seed_sequence(&g);
        let f = frontier(&mut plat, &g, &completed, 2).unwrap();
        for (i, a) in f.iter().enumerate() {
            for b in &f[i + 1..] {
                assert_ne!(a, b);
            }
        }
        // no default-stream variations
        assert!(f.iter().all(|op| match op {
            cadence_core::ops::BoundOp::Gpu { stream, .. } => *stream != Stream(0),
            _ => true,
        }));
    }
}
