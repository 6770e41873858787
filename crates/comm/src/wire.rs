//! Broadcast wire format for candidate orderings.
//!
//! Rank 0 sends, within one search iteration:
//!   1. `i32` count `N` of operations (−1 signals end of search),
//!   2. `N` × `i32` identity lengths,
//!   3. the concatenated identity bytes.
//!
//! Receivers rebuild the ordering against their local graph by identity;
//! an identity that resolves to nothing is fatal.

use tracing::{debug, trace};

use cadence_core::comm::Communicator;
use cadence_core::error::{CoreError, Result};
use cadence_core::graph::Graph;
use cadence_core::ops::BoundOp;
use cadence_core::serdes::op_from_ident;

const STOP: i32 = -1;

fn bcast_i32(comm: &dyn Communicator, value: i32, root: usize) -> Result<i32> {
    let mut buf = value.to_le_bytes();
    comm.broadcast_bytes(&mut buf, root)?;
    Ok(i32::from_le_bytes(buf))
}

/// One broadcast round.
///
/// On the root rank, pass `Some(order)` to ship it (or `None` to signal
/// the end of the search). On other ranks the argument is ignored; the
/// result is the reconstructed ordering, or `None` on the stop signal.
pub fn broadcast_order(
    comm: &dyn Communicator,
    g: &Graph,
    order: Option<&[BoundOp]>,
    root: usize,
) -> Result<Option<Vec<BoundOp>>> {
    if comm.rank() == root {
        let Some(order) = order else {
            bcast_i32(comm, STOP, root)?;
            debug!("broadcast stop signal");
            return Ok(None);
        };

        let idents: Vec<String> = order.iter().map(|op| op.ident()).collect();
        bcast_i32(comm, idents.len() as i32, root)?;

        let mut lengths = Vec::with_capacity(idents.len() * 4);
        for ident in &idents {
            lengths.extend_from_slice(&(ident.len() as i32).to_le_bytes());
        }
        comm.broadcast_bytes(&mut lengths, root)?;

        let mut names: Vec<u8> = idents.iter().flat_map(|s| s.bytes()).collect();
        comm.broadcast_bytes(&mut names, root)?;

        trace!("broadcast {} operations ({} name bytes)", idents.len(), names.len());
        Ok(Some(order.to_vec()))
    } else {
        let count = bcast_i32(comm, 0, root)?;
        if count == STOP {
            return Ok(None);
        }
        if count < 0 {
            return Err(CoreError::Comm(format!("broadcast carried bad count {count}")));
        }
        let count = count as usize;

        let mut lengths = vec![0u8; count * 4];
        comm.broadcast_bytes(&mut lengths, root)?;
        let lengths: Vec<usize> = lengths
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as usize)
            .collect();

        let mut names = vec![0u8; lengths.iter().sum()];
        comm.broadcast_bytes(&mut names, root)?;

        let mut order = Vec::with_capacity(count);
        let mut off = 0;
        for len in lengths {
            let ident = std::str::from_utf8(&names[off..off + len])
                .map_err(|e| CoreError::Comm(format!("broadcast carried bad utf8: {e}")))?;
            order.push(op_from_ident(ident, g)?);
            off += len;
        }
        trace!("rebuilt ordering of {} operations", order.len());
        Ok(Some(order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::local_cluster;
    use std::thread;

    use cadence_core::ops::{GpuTask, NoOp, OpRef};
    use cadence_core::platform::Platform;
    use cadence_core::types::{Event, Stream};

    struct FakeGpu(&'static str);

    impl GpuTask for FakeGpu {
        fn name(&self) -> &str {
            self.0
        }
        fn run(&self, _plat: &mut Platform, _stream: Stream) -> Result<()> {
            Ok(())
        }
    }

    fn demo_graph() -> Graph {
        let start = OpRef::cpu(NoOp::new("start"));
        let pack = OpRef::cpu(NoOp::new("pack"));
        let halo = OpRef::gpu(FakeGpu("halo"));
        let spmv = OpRef::gpu(FakeGpu("spmv"));
        let reduce = OpRef::cpu(NoOp::new("reduce"));
        let mut g = Graph::new(start.clone());
        g.add_edge(&start, &pack);
        g.add_edge(&pack, &halo);
        g.add_edge(&pack, &spmv);
        g.add_edge(&halo, &reduce);
        g.add_edge(&spmv, &reduce);
        g
    }

    fn demo_order(g: &Graph) -> Vec<BoundOp> {
        let bound_gpu = |name: &str, stream: u32| {
            op_from_ident(&format!("{name}@{stream}"), g).unwrap()
        };
        vec![
            op_from_ident("start", g).unwrap(),
            op_from_ident("pack", g).unwrap(),
            bound_gpu("halo", 1),
            bound_gpu("spmv", 2),
            BoundOp::EventRecord { event: Event(0), stream: Stream(1) },
            BoundOp::EventSync { event: Event(0) },
            op_from_ident("reduce", g).unwrap(),
        ]
    }

    #[test]
    fn test_solo_round_trip() {
        let comm = crate::local::LocalComm::solo();
        let g = demo_graph();
        let order = demo_order(&g);

        let out = broadcast_order(&comm, &g, Some(&order), 0).unwrap().unwrap();
        assert_eq!(out, order);
    }

    #[test]
    fn test_cluster_round_trip_by_name_and_stream() {
        let comms = local_cluster(3);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let g = demo_graph();
                    let order = if comm.rank() == 0 { Some(demo_order(&g)) } else { None };
                    let out =
                        broadcast_order(&comm, &g, order.as_deref(), 0).unwrap().unwrap();
                    out.iter().map(|op| op.ident()).collect::<Vec<_>>()
                })
            })
            .collect();

        let idents: Vec<Vec<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(idents[0], idents[1]);
        assert_eq!(idents[0], idents[2]);
        assert!(idents[0].contains(&"halo@1".to_string()));
    }

    #[test]
    fn test_stop_signal() {
        let comms = local_cluster(2);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let g = demo_graph();
                    broadcast_order(&comm, &g, None, 0).unwrap().is_none()
                })
            })
            .collect();

        for h in handles {
            assert!(h.join().unwrap());
        }
    }

    #[test]
    fn test_unknown_name_is_fatal_on_receiver() {
        let comms = local_cluster(2);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    if comm.rank() == 0 {
                        let g = demo_graph();
                        let order = demo_order(&g);
                        broadcast_order(&comm, &g, Some(&order), 0).map(|_| ())
                    } else {
                        // receiver graph is missing every operation
                        let empty = Graph::new(OpRef::cpu(NoOp::new("other")));
                        broadcast_order(&comm, &empty, None, 0).map(|_| ())
                    }
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(CoreError::Config(_))));
    }
}
