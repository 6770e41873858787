use serde::{Deserialize, Serialize};

/// Handle for an accelerator stream. `Stream(0)` is the default stream.
///
/// Handles are plain ids; resolution to a physical queue happens inside
/// the [`DeviceRuntime`](crate::device::DeviceRuntime) at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stream(pub u32);

impl Stream {
    pub const DEFAULT: Stream = Stream(0);

    pub fn is_default(&self) -> bool {
        self.0 == 0
    }
}

/// Handle for an accelerator event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Event(pub u32);

/// The resource an operation executes on, as seen by the synchronizer.
/// Work in the same stream (or on the host) is ordered by issue order;
/// anything else needs explicit synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResource {
    Cpu,
    Stream(Stream),
}

impl ExecResource {
    /// True if issue order alone already orders work on `self` after `other`.
    pub fn implicitly_ordered_after(&self, other: &ExecResource) -> bool {
        match (other, self) {
            (ExecResource::Cpu, ExecResource::Cpu) => true,
            // the host thread issues stream work in sequence order
            (ExecResource::Cpu, ExecResource::Stream(_)) => true,
            (ExecResource::Stream(a), ExecResource::Stream(b)) => a == b,
            (ExecResource::Stream(_), ExecResource::Cpu) => false,
        }
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
