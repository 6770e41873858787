use crate::error::Result;

/// Opaque handle for an in-flight nonblocking transfer.
pub type Request = u64;

/// Seam to the message-passing layer.
///
/// Mirrors the small slice of an SPMD communicator the searcher needs:
/// identity, an exact-size broadcast, and nonblocking point-to-point
/// transfers completed through [`Request`] handles. Implementations live
/// outside this crate; [`cadence-comm`] provides an in-process one.
pub trait Communicator: Send + Sync {
    /// This process's rank in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of participating ranks.
    fn size(&self) -> usize;

    /// Broadcast `buf` from `root` to every rank. Every rank must pass a
    /// buffer of the same length; non-root buffers are overwritten.
    fn broadcast_bytes(&self, buf: &mut [u8], root: usize) -> Result<()>;

    /// Start a nonblocking send of `data` to `dest`.
    fn isend(&self, dest: usize, tag: i32, data: &[u8]) -> Result<Request>;

    /// Start a nonblocking receive of `len` bytes from `source`.
    fn irecv(&self, source: usize, tag: i32, len: usize) -> Result<Request>;

    /// Block until `req` has completed.
    fn wait(&self, req: Request) -> Result<()>;

    /// Block until every request in `reqs` has completed.
    fn wait_all(&self, reqs: &[Request]) -> Result<()> {
        for req in reqs {
            self.wait(*req)?;
        }
        Ok(())
    }

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<()>;
}
