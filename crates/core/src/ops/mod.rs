//! Operation model.
//!
//! Operations form a closed sum: host work and message-passing work come
//! in through the [`CpuTask`] capability trait, accelerator work through
//! [`GpuTask`], and the synchronization family is built in. A graph
//! vertex ([`OpRef`]) is either an unbound accelerator operation or a
//! runnable [`BoundOp`]; binding pairs a `GpuTask` with a concrete
//! stream.
//!
//! Equality and ordering are value-based and stable: tag first, then the
//! discriminating fields, so sets and maps keyed on operations iterate
//! deterministically.

pub mod mpi;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::Result;
use crate::platform::Platform;
use crate::types::{Event, ExecResource, Stream};

/// Small-integer discriminants. Stable across runs; used for ordering
/// and as the cheap half of identity keys.
pub mod tag {
    pub const CPU: u8 = 0;
    pub const GPU: u8 = 1;
    pub const BOUND_GPU: u8 = 2;
    pub const EVENT_RECORD: u8 = 3;
    pub const STREAM_WAIT_EVENT: u8 = 4;
    pub const EVENT_SYNC: u8 = 5;
    pub const STREAM_SYNC: u8 = 6;
    pub const STREAM_WAIT: u8 = 7;
    pub const ISEND: u8 = 8;
    pub const IRECV: u8 = 9;
    pub const WAIT: u8 = 10;
    pub const OWNING_WAITALL: u8 = 11;
    pub const MULTI_WAIT: u8 = 12;
}

/// Host-executable work supplied by a collaborator.
///
/// `name` is the operation's stable identity and must be unique within a
/// graph; it must not contain `@` (reserved by the identity encoding).
pub trait CpuTask: Send + Sync {
    fn name(&self) -> &str;

    /// Discriminant; message-passing tasks override this.
    fn tag(&self) -> u8 {
        tag::CPU
    }

    /// JSON `kind` field for the projection.
    fn kind(&self) -> &'static str {
        "cpu"
    }

    fn run(&self, plat: &mut Platform) -> Result<()>;

    /// Variant-specific fields merged into the JSON projection.
    fn json_args(&self) -> Value {
        Value::Null
    }
}

/// Accelerator work not yet assigned to a stream.
pub trait GpuTask: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, plat: &mut Platform, stream: Stream) -> Result<()>;
}

/// Shared handle to a [`CpuTask`]; identity is `(tag, name)`.
#[derive(Clone)]
pub struct CpuRef(pub Arc<dyn CpuTask>);

/// Shared handle to a [`GpuTask`]; identity is the name.
#[derive(Clone)]
pub struct GpuRef(pub Arc<dyn GpuTask>);

impl CpuRef {
    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn tag(&self) -> u8 {
        self.0.tag()
    }
}

impl GpuRef {
    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl PartialEq for CpuRef {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag() && self.name() == other.name()
    }
}
impl Eq for CpuRef {}

impl PartialOrd for CpuRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for CpuRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag().cmp(&other.tag()).then_with(|| self.name().cmp(other.name()))
    }
}

impl Hash for CpuRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        self.name().hash(state);
    }
}

impl fmt::Debug for CpuRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuRef({})", self.name())
    }
}

impl PartialEq for GpuRef {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}
impl Eq for GpuRef {}

impl PartialOrd for GpuRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for GpuRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(other.name())
    }
}

impl Hash for GpuRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Debug for GpuRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuRef({})", self.name())
    }
}

/// Host task that does nothing. Used for graph markers such as the
/// start vertex.
pub struct NoOp {
    name: String,
}

impl NoOp {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl CpuTask for NoOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _plat: &mut Platform) -> Result<()> {
        Ok(())
    }
}

/// An operation with all resource bindings fixed; ready to run.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum BoundOp {
    /// Host work (including message-passing tasks).
    Cpu(CpuRef),
    /// Accelerator work pinned to a stream.
    Gpu { op: GpuRef, stream: Stream },
    /// Record `event` on `stream`.
    EventRecord { event: Event, stream: Stream },
    /// Enqueue on `stream` a wait for `event`.
    StreamWaitEvent { stream: Stream, event: Event },
    /// Host blocks until `event` completes.
    EventSync { event: Event },
    /// Host blocks until `stream` drains.
    StreamSync { stream: Stream },
    /// Composite: record on `waitee`, make `waiter` wait.
    StreamWait { waitee: Stream, waiter: Stream, event: Event },
}

impl BoundOp {
    pub fn cpu(task: impl CpuTask + 'static) -> Self {
        BoundOp::Cpu(CpuRef(Arc::new(task)))
    }

    pub fn tag(&self) -> u8 {
        match self {
            BoundOp::Cpu(t) => t.tag(),
            BoundOp::Gpu { .. } => tag::BOUND_GPU,
            BoundOp::EventRecord { .. } => tag::EVENT_RECORD,
            BoundOp::StreamWaitEvent { .. } => tag::STREAM_WAIT_EVENT,
            BoundOp::EventSync { .. } => tag::EVENT_SYNC,
            BoundOp::StreamSync { .. } => tag::STREAM_SYNC,
            BoundOp::StreamWait { .. } => tag::STREAM_WAIT,
        }
    }

    /// Stable name. Synchronization operations derive theirs from their
    /// fields, so equal ops always share a name.
    pub fn name(&self) -> String {
        match self {
            BoundOp::Cpu(t) => t.name().to_string(),
            BoundOp::Gpu { op, .. } => op.name().to_string(),
            BoundOp::EventRecord { event, stream } => format!("record-e{event}-s{stream}"),
            BoundOp::StreamWaitEvent { stream, event } => format!("waitevent-e{event}-s{stream}"),
            BoundOp::EventSync { event } => format!("eventsync-e{event}"),
            BoundOp::StreamSync { stream } => format!("streamsync-s{stream}"),
            BoundOp::StreamWait { waitee, waiter, event } => {
                format!("streamwait-e{event}-s{waitee}-s{waiter}")
            }
        }
    }

    /// Canonical identity string: `name` for host ops, `name@stream` for
    /// bound accelerator ops. Used on the broadcast wire and in replay
    /// files.
    pub fn ident(&self) -> String {
        match self {
            BoundOp::Gpu { op, stream } => format!("{}@{}", op.name(), stream),
            other => other.name(),
        }
    }

    /// Human-readable form for logs and error messages.
    pub fn desc(&self) -> String {
        match self {
            BoundOp::Gpu { op, stream } => format!("{{{}, s:{}}}", op.name(), stream),
            other => other.name(),
        }
    }

    /// Where this operation executes, for ordering decisions.
    pub fn resource(&self) -> ExecResource {
        match self {
            BoundOp::Cpu(_) | BoundOp::EventSync { .. } | BoundOp::StreamSync { .. } => {
                ExecResource::Cpu
            }
            BoundOp::Gpu { stream, .. }
            | BoundOp::EventRecord { stream, .. }
            | BoundOp::StreamWaitEvent { stream, .. } => ExecResource::Stream(*stream),
            BoundOp::StreamWait { waiter, .. } => ExecResource::Stream(*waiter),
        }
    }

    /// The unbound accelerator operation underneath, if any.
    pub fn unbound(&self) -> Option<&GpuRef> {
        match self {
            BoundOp::Gpu { op, .. } => Some(op),
            _ => None,
        }
    }

    /// The event handle this operation references, if any.
    pub fn event(&self) -> Option<Event> {
        match self {
            BoundOp::EventRecord { event, .. }
            | BoundOp::StreamWaitEvent { event, .. }
            | BoundOp::EventSync { event }
            | BoundOp::StreamWait { event, .. } => Some(*event),
            _ => None,
        }
    }

    /// Identity of the operation ignoring any stream binding.
    pub fn unbound_key(&self) -> (u8, String) {
        match self {
            BoundOp::Gpu { op, .. } => (tag::GPU, op.name().to_string()),
            other => (other.tag(), other.name()),
        }
    }

    /// True for operations inserted by the synchronizer rather than
    /// drawn from the graph.
    pub fn is_sync(&self) -> bool {
        matches!(
            self,
            BoundOp::EventRecord { .. }
                | BoundOp::StreamWaitEvent { .. }
                | BoundOp::EventSync { .. }
                | BoundOp::StreamSync { .. }
                | BoundOp::StreamWait { .. }
        )
    }

    /// Execute against the platform.
    pub fn run(&self, plat: &mut Platform) -> Result<()> {
        match self {
            BoundOp::Cpu(t) => t.0.run(plat),
            BoundOp::Gpu { op, stream } => {
                plat.validate_stream(*stream)?;
                op.0.run(plat, *stream)
            }
            BoundOp::EventRecord { event, stream } => plat.record_event(*event, *stream),
            BoundOp::StreamWaitEvent { stream, event } => plat.stream_wait_event(*stream, *event),
            BoundOp::EventSync { event } => plat.sync_event(*event),
            BoundOp::StreamSync { stream } => plat.sync_stream(*stream),
            BoundOp::StreamWait { waitee, waiter, event } => {
                plat.record_event(*event, *waitee)?;
                plat.stream_wait_event(*waiter, *event)
            }
        }
    }

    /// JSON projection (without the `in_graph` flag, which depends on a
    /// graph and is added by the serdes layer).
    pub fn json(&self) -> Value {
        match self {
            BoundOp::Cpu(t) => {
                let mut obj = json!({ "kind": t.0.kind(), "name": t.name() });
                if let Value::Object(args) = t.0.json_args() {
                    let map = obj.as_object_mut().unwrap();
                    for (k, v) in args {
                        map.insert(k, v);
                    }
                }
                obj
            }
            BoundOp::Gpu { op, stream } => {
                json!({ "kind": "gpu_bound", "name": op.name(), "stream": stream.0 })
            }
            BoundOp::EventRecord { event, stream } => {
                json!({ "kind": "event_record", "event": event.0, "stream": stream.0 })
            }
            BoundOp::StreamWaitEvent { stream, event } => {
                json!({ "kind": "stream_wait_event", "stream": stream.0, "event": event.0 })
            }
            BoundOp::EventSync { event } => json!({ "kind": "event_sync", "event": event.0 }),
            BoundOp::StreamSync { stream } => json!({ "kind": "stream_sync", "stream": stream.0 }),
            BoundOp::StreamWait { waitee, waiter, event } => {
                json!({ "kind": "stream_wait", "waitee": waitee.0, "waiter": waiter.0, "event": event.0 })
            }
        }
    }
}

impl PartialOrd for BoundOp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoundOp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag().cmp(&other.tag()).then_with(|| match (self, other) {
            (BoundOp::Cpu(a), BoundOp::Cpu(b)) => a.cmp(b),
            (BoundOp::Gpu { op: a, stream: sa }, BoundOp::Gpu { op: b, stream: sb }) => {
                sa.cmp(sb).then_with(|| a.cmp(b))
            }
            (
                BoundOp::EventRecord { event: a, stream: sa },
                BoundOp::EventRecord { event: b, stream: sb },
            ) => (a, sa).cmp(&(b, sb)),
            (
                BoundOp::StreamWaitEvent { stream: sa, event: a },
                BoundOp::StreamWaitEvent { stream: sb, event: b },
            ) => (sa, a).cmp(&(sb, b)),
            (BoundOp::EventSync { event: a }, BoundOp::EventSync { event: b }) => a.cmp(b),
            (BoundOp::StreamSync { stream: a }, BoundOp::StreamSync { stream: b }) => a.cmp(b),
            (
                BoundOp::StreamWait { waitee: wa, waiter: ra, event: ea },
                BoundOp::StreamWait { waitee: wb, waiter: rb, event: eb },
            ) => (wa, ra, ea).cmp(&(wb, rb, eb)),
            // equal tags imply equal variants
            _ => Ordering::Equal,
        })
    }
}

impl fmt::Debug for BoundOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.desc())
    }
}

impl fmt::Display for BoundOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.desc())
    }
}

/// A graph vertex: either an accelerator operation awaiting a stream
/// assignment or an already-runnable operation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum OpRef {
    Unbound(GpuRef),
    Bound(BoundOp),
}

impl OpRef {
    pub fn cpu(task: impl CpuTask + 'static) -> Self {
        OpRef::Bound(BoundOp::cpu(task))
    }

    pub fn gpu(task: impl GpuTask + 'static) -> Self {
        OpRef::Unbound(GpuRef(Arc::new(task)))
    }

    pub fn tag(&self) -> u8 {
        match self {
            OpRef::Unbound(_) => tag::GPU,
            OpRef::Bound(b) => b.tag(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            OpRef::Unbound(g) => g.name().to_string(),
            OpRef::Bound(b) => b.name(),
        }
    }

    pub fn desc(&self) -> String {
        match self {
            OpRef::Unbound(g) => format!("{{{}, unbound}}", g.name()),
            OpRef::Bound(b) => b.desc(),
        }
    }

    /// Identity ignoring any stream binding; a bound accelerator op and
    /// its unbound form share a key.
    pub fn unbound_key(&self) -> (u8, String) {
        match self {
            OpRef::Unbound(g) => (tag::GPU, g.name().to_string()),
            OpRef::Bound(b) => b.unbound_key(),
        }
    }

    pub fn as_bound(&self) -> Option<&BoundOp> {
        match self {
            OpRef::Bound(b) => Some(b),
            OpRef::Unbound(_) => None,
        }
    }

    pub fn as_unbound(&self) -> Option<&GpuRef> {
        match self {
            OpRef::Unbound(g) => Some(g),
            OpRef::Bound(_) => None,
        }
    }
}

impl PartialOrd for OpRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpRef {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (OpRef::Unbound(a), OpRef::Unbound(b)) => a.cmp(b),
            (OpRef::Bound(a), OpRef::Bound(b)) => a.cmp(b),
            // distinct variants never share a tag
            _ => self.tag().cmp(&other.tag()),
        }
    }
}

impl fmt::Debug for OpRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.desc())
    }
}

impl From<BoundOp> for OpRef {
    fn from(b: BoundOp) -> Self {
        OpRef::Bound(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeGpu(&'static str);

    impl GpuTask for FakeGpu {
        fn name(&self) -> &str {
            self.0
        }
        fn run(&self, _plat: &mut Platform, _stream: Stream) -> Result<()> {
            Ok(())
        }
    }

    fn gpu(name: &'static str) -> GpuRef {
        GpuRef(Arc::new(FakeGpu(name)))
    }

    #[test]
    fn test_bound_gpu_equality_needs_same_stream() {
        let a = BoundOp::Gpu { op: gpu("k"), stream: Stream(1) };
        let b = BoundOp::Gpu { op: gpu("k"), stream: Stream(1) };
        let c = BoundOp::Gpu { op: gpu("k"), stream: Stream(2) };

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ordering_is_tag_first() {
        let cpu = BoundOp::cpu(NoOp::new("z"));
        let gpu_op = BoundOp::Gpu { op: gpu("a"), stream: Stream(0) };
        let record = BoundOp::EventRecord { event: Event(0), stream: Stream(0) };

        // cpu (tag 0) < bound gpu (tag 2) < record (tag 3), names notwithstanding
        assert!(cpu < gpu_op);
        assert!(gpu_op < record);
    }

    #[test]
    fn test_sync_ops_compare_by_fields() {
        let a = BoundOp::EventRecord { event: Event(1), stream: Stream(2) };
        let b = BoundOp::EventRecord { event: Event(1), stream: Stream(2) };
        let c = BoundOp::EventRecord { event: Event(2), stream: Stream(2) };

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
    }

    #[test]
    fn test_ident_encodes_stream() {
        let b = BoundOp::Gpu { op: gpu("halo"), stream: Stream(3) };
        assert_eq!(b.ident(), "halo@3");

        let c = BoundOp::cpu(NoOp::new("pack"));
        assert_eq!(c.ident(), "pack");
    }

    #[test]
    fn test_unbound_key_matches_across_binding() {
        let unbound = OpRef::Unbound(gpu("k"));
        let bound = OpRef::Bound(BoundOp::Gpu { op: gpu("k"), stream: Stream(4) });

        assert_eq!(unbound.unbound_key(), bound.unbound_key());
    }

    #[test]
    fn test_resource_classification() {
        let record = BoundOp::EventRecord { event: Event(0), stream: Stream(2) };
        assert_eq!(record.resource(), ExecResource::Stream(Stream(2)));

        let sync = BoundOp::EventSync { event: Event(0) };
        assert_eq!(sync.resource(), ExecResource::Cpu);

        assert!(record.is_sync());
        assert!(!BoundOp::cpu(NoOp::new("x")).is_sync());
    }

    #[test]
    fn test_json_projection_kinds() {
        let record = BoundOp::EventRecord { event: Event(1), stream: Stream(2) };
        let v = record.json();
        assert_eq!(v["kind"], "event_record");
        assert_eq!(v["event"], 1);
        assert_eq!(v["stream"], 2);

        let cpu = BoundOp::cpu(NoOp::new("pack"));
        assert_eq!(cpu.json()["kind"], "cpu");
        assert_eq!(cpu.json()["name"], "pack");
    }
}
