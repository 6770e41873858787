//! Event synchronizer.
//!
//! Decides whether a candidate operation is ordered after all of its
//! graph predecessors given the completed prefix, and if not, which
//! synchronization operations would make it so. Cross-stream edges get
//! an event record on the producer plus a stream wait on the consumer;
//! stream-to-host edges get a record plus a host-side event sync; edges
//! within one resource (and host-to-stream edges) need nothing, since
//! the host issues stream work in sequence order.

use tracing::debug;

use cadence_core::error::{CoreError, Result};
use cadence_core::graph::Graph;
use cadence_core::ops::{BoundOp, OpRef};
use cadence_core::platform::Platform;
use cadence_core::sequence::Sequence;
use cadence_core::types::{Event, ExecResource, Stream};

pub struct EventSynchronizer;

impl EventSynchronizer {
    /// True iff every predecessor of `op` is completed and its effects
    /// are ordered before `op` on `op`'s resource.
    pub fn is_synced(op: &BoundOp, g: &Graph, completed: &Sequence) -> bool {
        let Some(preds) = g.preds_or_unbound(op) else {
            return true;
        };
        preds.iter().all(|p| pred_synced(op, p, completed))
    }

    /// The smallest set of synchronization ops that, appended in order,
    /// would make `is_synced(op, ..)` true. Empty when already synced.
    pub fn make_syncs(
        op: &BoundOp,
        g: &Graph,
        completed: &Sequence,
        plat: &mut Platform,
    ) -> Result<Vec<BoundOp>> {
        let mut syncs: Vec<BoundOp> = Vec::new();
        let Some(preds) = g.preds_or_unbound(op) else {
            return Ok(syncs);
        };

        for pred in preds {
            if pred_synced(op, pred, completed) {
                continue;
            }
            let Some(pi) = completed.position_unbound(pred) else {
                return Err(CoreError::Invariant(format!(
                    "syncs requested for {} before predecessor {} completed",
                    op.desc(),
                    pred.desc()
                )));
            };
            let done = &completed.ops()[pi];

            match (done.resource(), op.resource()) {
                (ExecResource::Stream(producer), ExecResource::Stream(consumer)) => {
                    plat.validate_stream(producer)?;
                    plat.validate_stream(consumer)?;
                    let event = match reusable_record(completed, pi, producer, &syncs) {
                        Some(event) => event,
                        None => {
                            let event = plat.new_event()?;
                            push_unique(
                                &mut syncs,
                                BoundOp::EventRecord { event, stream: producer },
                            );
                            event
                        }
                    };
                    push_unique(&mut syncs, BoundOp::StreamWaitEvent { stream: consumer, event });
                }
                (ExecResource::Stream(producer), ExecResource::Cpu) => {
                    plat.validate_stream(producer)?;
                    let event = match reusable_record(completed, pi, producer, &syncs) {
                        Some(event) => event,
                        None => {
                            let event = plat.new_event()?;
                            push_unique(
                                &mut syncs,
                                BoundOp::EventRecord { event, stream: producer },
                            );
                            event
                        }
                    };
                    push_unique(&mut syncs, BoundOp::EventSync { event });
                }
                // host-to-anything is ordered by issue order
                _ => {}
            }
        }

        if !syncs.is_empty() {
            debug!(
                "generated {} synchronizers for {}: {}",
                syncs.len(),
                op.desc(),
                syncs.iter().map(|s| s.desc()).collect::<Vec<_>>().join(", ")
            );
        }
        Ok(syncs)
    }
}

fn push_unique(ops: &mut Vec<BoundOp>, op: BoundOp) {
    if !ops.contains(&op) {
        ops.push(op);
    }
}

fn pred_synced(op: &BoundOp, pred: &OpRef, completed: &Sequence) -> bool {
    let Some(pi) = completed.position_unbound(pred) else {
        return false;
    };
    let done = &completed.ops()[pi];

    if op.resource().implicitly_ordered_after(&done.resource()) {
        return true;
    }
    match (done.resource(), op.resource()) {
        (ExecResource::Stream(producer), ExecResource::Stream(consumer)) => {
            stream_ordered(completed, pi, producer, consumer)
        }
        (ExecResource::Stream(producer), ExecResource::Cpu) => {
            host_visible(completed, pi, producer)
        }
        _ => true,
    }
}

/// The event `op` records on `producer`, whether through a plain
/// record or the composite stream-wait.
fn records_on(op: &BoundOp, producer: Stream) -> Option<Event> {
    match op {
        BoundOp::EventRecord { event, stream } if *stream == producer => Some(*event),
        BoundOp::StreamWait { waitee, event, .. } if *waitee == producer => Some(*event),
        _ => None,
    }
}

/// A record on `producer` after index `after`, followed by a wait on
/// `consumer` (or a composite stream-wait covering both).
fn stream_ordered(completed: &Sequence, after: usize, producer: Stream, consumer: Stream) -> bool {
    let ops = completed.ops();
    for (j, op) in ops.iter().enumerate().skip(after + 1) {
        if let BoundOp::StreamWait { waitee, waiter, .. } = op {
            if *waitee == producer && *waiter == consumer {
                return true;
            }
        }
        if let Some(event) = records_on(op, producer) {
            let waited = ops[j + 1..].iter().any(|w| {
                matches!(w, BoundOp::StreamWaitEvent { stream, event: e }
                    if *stream == consumer && *e == event)
            });
            if waited {
                return true;
            }
        }
    }
    false
}

/// The host observes `producer` past index `after`: a full stream sync,
/// or a record followed by a host-side event sync.
fn host_visible(completed: &Sequence, after: usize, producer: Stream) -> bool {
    let ops = completed.ops();
    for (j, op) in ops.iter().enumerate().skip(after + 1) {
        if matches!(op, BoundOp::StreamSync { stream } if *stream == producer) {
            return true;
        }
        if let Some(event) = records_on(op, producer) {
            let synced = ops[j + 1..]
                .iter()
                .any(|w| matches!(w, BoundOp::EventSync { event: e } if *e == event));
            if synced {
                return true;
            }
        }
    }
    false
}

/// An event already recorded on `producer` downstream of the completed
/// predecessor (or queued in `pending` by this very call) that can be
/// waited on instead of recording afresh.
fn reusable_record(
    completed: &Sequence,
    after: usize,
    producer: Stream,
    pending: &[BoundOp],
) -> Option<Event> {
    completed.ops()[after + 1..]
        .iter()
        .find_map(|op| records_on(op, producer))
        .or_else(|| pending.iter().find_map(|op| records_on(op, producer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_common::*;

    #[test]
    fn test_same_stream_needs_no_sync() {
        let (g, _) = chain_gpu_graph();
        let mut plat = solo_platform(2);

        let mut completed = Sequence::new();
        completed.push(start_op(&g));
        completed.push(bound(&g, "k1", 1));

        let candidate = bound(&g, "k2", 1);
        assert!(EventSynchronizer::is_synced(&candidate, &g, &completed));
        let syncs = EventSynchronizer::make_syncs(&candidate, &g, &completed, &mut plat).unwrap();
        assert!(syncs.is_empty());
    }

    #[test]
    fn test_cross_stream_edge_gets_record_and_wait() {
        let (g, _) = chain_gpu_graph();
        let mut plat = solo_platform(2);

        let mut completed = Sequence::new();
        completed.push(start_op(&g));
        completed.push(bound(&g, "k1", 1));

        let candidate = bound(&g, "k2", 2);
        assert!(!EventSynchronizer::is_synced(&candidate, &g, &completed));

        let syncs = EventSynchronizer::make_syncs(&candidate, &g, &completed, &mut plat).unwrap();
        assert_eq!(
            syncs,
            vec![
                BoundOp::EventRecord { event: Event(0), stream: Stream(1) },
                BoundOp::StreamWaitEvent { stream: Stream(2), event: Event(0) },
            ]
        );
    }

    #[test]
    fn test_gpu_to_cpu_edge_gets_record_and_event_sync() {
        let (g, _) = diamond_graph();
        let mut plat = solo_platform(2);

        let mut completed = Sequence::new();
        completed.push(start_op(&g));
        completed.push(bound(&g, "b", 1));
        completed.push(bound(&g, "c", 2));

        let candidate = cpu_bound("d");
        assert!(!EventSynchronizer::is_synced(&candidate, &g, &completed));

        let syncs = EventSynchronizer::make_syncs(&candidate, &g, &completed, &mut plat).unwrap();
        // one record+sync pair per producer stream
        assert_eq!(syncs.len(), 4);
        assert!(syncs.contains(&BoundOp::EventRecord { event: Event(0), stream: Stream(1) }));
        assert!(syncs.contains(&BoundOp::EventSync { event: Event(0) }));
        assert!(syncs.contains(&BoundOp::EventRecord { event: Event(1), stream: Stream(2) }));
        assert!(syncs.contains(&BoundOp::EventSync { event: Event(1) }));
    }

    #[test]
    fn test_cpu_to_gpu_edge_needs_nothing() {
        let (g, _) = diamond_graph();
        let mut plat = solo_platform(2);

        let mut completed = Sequence::new();
        completed.push(start_op(&g));

        let candidate = bound(&g, "b", 1);
        assert!(EventSynchronizer::is_synced(&candidate, &g, &completed));
        assert!(EventSynchronizer::make_syncs(&candidate, &g, &completed, &mut plat)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_syncs_make_candidate_synced_and_are_idempotent() {
        let (g, _) = chain_gpu_graph();
        let mut plat = solo_platform(2);

        let mut completed = Sequence::new();
        completed.push(start_op(&g));
        completed.push(bound(&g, "k1", 1));

        let candidate = bound(&g, "k2", 2);
        let syncs = EventSynchronizer::make_syncs(&candidate, &g, &completed, &mut plat).unwrap();
        for s in syncs {
            completed.push(s);
        }

        assert!(EventSynchronizer::is_synced(&candidate, &g, &completed));
        let again = EventSynchronizer::make_syncs(&candidate, &g, &completed, &mut plat).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_existing_record_is_reused() {
        let (g, _) = chain_gpu_graph();
        let mut plat = solo_platform(3);

        let mut completed = Sequence::new();
        completed.push(start_op(&g));
        completed.push(bound(&g, "k1", 1));
        // someone already recorded stream 1 after k1
        let e = plat.new_event().unwrap();
        completed.push(BoundOp::EventRecord { event: e, stream: Stream(1) });

        let candidate = bound(&g, "k2", 2);
        let syncs = EventSynchronizer::make_syncs(&candidate, &g, &completed, &mut plat).unwrap();
        assert_eq!(syncs, vec![BoundOp::StreamWaitEvent { stream: Stream(2), event: e }]);
    }

    #[test]
    fn test_composite_stream_wait_counts() {
        let (g, _) = chain_gpu_graph();
        let mut plat = solo_platform(2);

        let mut completed = Sequence::new();
        completed.push(start_op(&g));
        completed.push(bound(&g, "k1", 1));
        let e = plat.new_event().unwrap();
        completed.push(BoundOp::StreamWait { waitee: Stream(1), waiter: Stream(2), event: e });

        let candidate = bound(&g, "k2", 2);
        assert!(EventSynchronizer::is_synced(&candidate, &g, &completed));
    }

    #[test]
    fn test_composite_record_is_reused_for_host_edge() {
        let (g, _) = diamond_graph();
        let mut plat = solo_platform(2);

        let mut completed = Sequence::new();
        completed.push(start_op(&g));
        completed.push(bound(&g, "b", 1));
        completed.push(bound(&g, "c", 2));
        // the composite already records b's stream
        let e = plat.new_event().unwrap();
        completed.push(BoundOp::StreamWait { waitee: Stream(1), waiter: Stream(2), event: e });

        let candidate = cpu_bound("d");
        let syncs = EventSynchronizer::make_syncs(&candidate, &g, &completed, &mut plat).unwrap();
        // stream 1 reuses the composite's event; stream 2 needs a fresh pair
        assert!(syncs.contains(&BoundOp::EventSync { event: e }));
        assert!(!syncs.contains(&BoundOp::EventRecord { event: e, stream: Stream(1) }));

        for s in syncs {
            completed.push(s);
        }
        assert!(EventSynchronizer::is_synced(&candidate, &g, &completed));
        assert!(EventSynchronizer::make_syncs(&candidate, &g, &completed, &mut plat)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_stream_sync_satisfies_host_edge() {
        let (g, _) = diamond_graph();
        let mut completed = Sequence::new();
        completed.push(start_op(&g));
        completed.push(bound(&g, "b", 1));
        completed.push(bound(&g, "c", 1));
        completed.push(BoundOp::StreamSync { stream: Stream(1) });

        let candidate = cpu_bound("d");
        assert!(EventSynchronizer::is_synced(&candidate, &g, &completed));
    }
}
