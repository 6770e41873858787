//! In-process communicator.
//!
//! One [`LocalComm`] per rank, all sharing a bus. Rank 0 alone is the
//! degenerate single-process case; [`local_cluster`] wires up `n` ranks
//! for thread-backed SPMD runs and tests. Collective calls must be made
//! in the same order by every rank, as with any SPMD communicator.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use tracing::trace;

use cadence_core::comm::{Communicator, Request};
use cadence_core::error::{CoreError, Result};

type MailKey = (usize, usize, i32); // (dest, source, tag)

#[derive(Default)]
struct BcastState {
    seq: u64,
    data: Vec<u8>,
    taken: usize,
    busy: bool,
}

#[derive(Default)]
struct BarrierState {
    count: usize,
    generation: u64,
}

#[derive(Default)]
struct Bus {
    mail: Mutex<HashMap<MailKey, VecDeque<Vec<u8>>>>,
    mail_cv: Condvar,
    bcast: Mutex<BcastState>,
    bcast_cv: Condvar,
    barrier: Mutex<BarrierState>,
    barrier_cv: Condvar,
    next_req: AtomicU64,
}

enum Pending {
    Sent,
    Recv { source: usize, tag: i32, len: usize },
}

pub struct LocalComm {
    rank: usize,
    size: usize,
    bus: Arc<Bus>,
    /// Sequence number of the next broadcast this rank takes part in.
    bcast_seq: AtomicU64,
    pending: Mutex<HashMap<Request, Pending>>,
}

impl LocalComm {
    /// Single-rank communicator for non-distributed runs.
    pub fn solo() -> Self {
        Self::with_bus(0, 1, Arc::new(Bus::default()))
    }

    fn with_bus(rank: usize, size: usize, bus: Arc<Bus>) -> Self {
        Self { rank, size, bus, bcast_seq: AtomicU64::new(0), pending: Mutex::new(HashMap::new()) }
    }
}

/// Build `n` ranks sharing one bus. Hand each to its own thread.
pub fn local_cluster(n: usize) -> Vec<LocalComm> {
    assert!(n > 0, "cluster needs at least one rank");
    let bus = Arc::new(Bus::default());
    (0..n).map(|rank| LocalComm::with_bus(rank, n, bus.clone())).collect()
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast_bytes(&self, buf: &mut [u8], root: usize) -> Result<()> {
        if root >= self.size {
            return Err(CoreError::Comm(format!("broadcast root {root} out of range")));
        }
        let want = self.bcast_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut st = self.bus.bcast.lock().unwrap();

        if self.rank == root {
            while st.busy {
                st = self.bus.bcast_cv.wait(st).unwrap();
            }
            st.busy = true;
            st.seq = want;
            st.taken = 0;
            st.data = buf.to_vec();
            self.bus.bcast_cv.notify_all();

            while st.taken < self.size - 1 {
                st = self.bus.bcast_cv.wait(st).unwrap();
            }
            st.busy = false;
            st.data.clear();
            self.bus.bcast_cv.notify_all();
            Ok(())
        } else {
            while st.seq < want {
                st = self.bus.bcast_cv.wait(st).unwrap();
            }
            let outcome = if st.data.len() == buf.len() {
                buf.copy_from_slice(&st.data);
                Ok(())
            } else {
                Err(CoreError::Comm(format!(
                    "broadcast length mismatch: root sent {} bytes, rank {} expected {}",
                    st.data.len(),
                    self.rank,
                    buf.len()
                )))
            };
            // take part in the handshake even on mismatch so peers don't hang
            st.taken += 1;
            self.bus.bcast_cv.notify_all();
            outcome
        }
    }

    fn isend(&self, dest: usize, tag: i32, data: &[u8]) -> Result<Request> {
        if dest >= self.size {
            return Err(CoreError::Comm(format!("isend destination {dest} out of range")));
        }
        {
            let mut mail = self.bus.mail.lock().unwrap();
            mail.entry((dest, self.rank, tag)).or_default().push_back(data.to_vec());
            self.bus.mail_cv.notify_all();
        }
        let req = self.bus.next_req.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().insert(req, Pending::Sent);
        trace!("rank {} isend {} bytes to {} (tag {})", self.rank, data.len(), dest, tag);
        Ok(req)
    }

    fn irecv(&self, source: usize, tag: i32, len: usize) -> Result<Request> {
        if source >= self.size {
            return Err(CoreError::Comm(format!("irecv source {source} out of range")));
        }
        let req = self.bus.next_req.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().insert(req, Pending::Recv { source, tag, len });
        Ok(req)
    }

    fn wait(&self, req: Request) -> Result<()> {
        let pending = self
            .pending
            .lock()
            .unwrap()
            .remove(&req)
            .ok_or_else(|| CoreError::Comm(format!("wait on unknown request {req}")))?;

        match pending {
            Pending::Sent => Ok(()), // buffered send completes at start
            Pending::Recv { source, tag, len } => {
                let key = (self.rank, source, tag);
                let mut mail = self.bus.mail.lock().unwrap();
                loop {
                    if let Some(queue) = mail.get_mut(&key) {
                        if let Some(msg) = queue.pop_front() {
                            if msg.len() != len {
                                return Err(CoreError::Comm(format!(
                                    "recv length mismatch: got {} bytes, expected {len}",
                                    msg.len()
                                )));
                            }
                            return Ok(());
                        }
                    }
                    mail = self.bus.mail_cv.wait(mail).unwrap();
                }
            }
        }
    }

    fn barrier(&self) -> Result<()> {
        let mut st = self.bus.barrier.lock().unwrap();
        let generation = st.generation;
        st.count += 1;
        if st.count == self.size {
            st.count = 0;
            st.generation += 1;
            self.bus.barrier_cv.notify_all();
        } else {
            while st.generation == generation {
                st = self.bus.barrier_cv.wait(st).unwrap();
            }
        }
        Ok(())
    }
}
