//! JSON projection and identity-string rehydration for operations.
//!
//! Serialization is projection-only: an operation becomes its kind, name
//! and variant fields plus an `in_graph` flag. Deserialization needs a
//! reference graph: graph operations are looked up by name, while
//! synchronization operations are scalar and rehydrate as themselves.

use serde_json::{json, Value};

use crate::error::{CoreError, Result};
use crate::graph::Graph;
use crate::ops::{BoundOp, GpuRef, OpRef};
use crate::types::{Event, Stream};

pub fn op_to_json(op: &BoundOp, g: &Graph) -> Value {
    let mut v = op.json();
    let in_graph = g.contains(&OpRef::Bound(op.clone()))
        || op.unbound().is_some_and(|u| g.contains(&OpRef::Unbound(u.clone())));
    v["in_graph"] = json!(in_graph);
    v
}

pub fn order_to_json(order: &[BoundOp], g: &Graph) -> Value {
    Value::Array(order.iter().map(|op| op_to_json(op, g)).collect())
}

pub fn op_from_json(v: &Value, g: &Graph) -> Result<BoundOp> {
    let kind = v["kind"]
        .as_str()
        .ok_or_else(|| CoreError::Parse(format!("operation without kind: {v}")))?;

    let field = |name: &str| -> Result<u32> {
        v[name]
            .as_u64()
            .map(|x| x as u32)
            .ok_or_else(|| CoreError::Parse(format!("{kind}: missing field {name}")))
    };

    match kind {
        "event_record" => {
            Ok(BoundOp::EventRecord { event: Event(field("event")?), stream: Stream(field("stream")?) })
        }
        "stream_wait_event" => Ok(BoundOp::StreamWaitEvent {
            stream: Stream(field("stream")?),
            event: Event(field("event")?),
        }),
        "event_sync" => Ok(BoundOp::EventSync { event: Event(field("event")?) }),
        "stream_sync" => Ok(BoundOp::StreamSync { stream: Stream(field("stream")?) }),
        "stream_wait" => Ok(BoundOp::StreamWait {
            waitee: Stream(field("waitee")?),
            waiter: Stream(field("waiter")?),
            event: Event(field("event")?),
        }),
        "gpu_bound" => {
            let name = v["name"]
                .as_str()
                .ok_or_else(|| CoreError::Parse("gpu_bound without name".into()))?;
            let op = gpu_by_name(g, name)?;
            Ok(BoundOp::Gpu { op, stream: Stream(field("stream")?) })
        }
        _ => {
            // host kinds (cpu and the message-passing family) come from the graph
            let name = v["name"]
                .as_str()
                .ok_or_else(|| CoreError::Parse(format!("{kind} without name")))?;
            cpu_by_name(g, name)
        }
    }
}

pub fn order_from_json(v: &Value, g: &Graph) -> Result<Vec<BoundOp>> {
    let arr = v
        .as_array()
        .ok_or_else(|| CoreError::Parse("expected an array of operations".into()))?;
    arr.iter().map(|e| op_from_json(e, g)).collect()
}

/// Rebuild an operation from its canonical identity string against a
/// reference graph. Reverse of [`BoundOp::ident`].
pub fn op_from_ident(ident: &str, g: &Graph) -> Result<BoundOp> {
    if let Some((name, stream)) = ident.rsplit_once('@') {
        let stream: u32 = stream
            .parse()
            .map_err(|_| CoreError::Parse(format!("bad stream in ident {ident}")))?;
        let op = gpu_by_name(g, name)?;
        return Ok(BoundOp::Gpu { op, stream: Stream(stream) });
    }

    if let Some(op) = g.find_by_name(ident) {
        return match op {
            OpRef::Bound(b) => Ok(b.clone()),
            OpRef::Unbound(_) => Err(CoreError::Config(format!(
                "operation {ident} is unbound in the reference graph"
            ))),
        };
    }

    parse_sync_ident(ident)
        .ok_or_else(|| CoreError::Config(format!("unknown operation name {ident}")))
}

fn gpu_by_name(g: &Graph, name: &str) -> Result<GpuRef> {
    match g.find_by_name(name) {
        Some(OpRef::Unbound(op)) => Ok(op.clone()),
        Some(OpRef::Bound(b)) => b.unbound().cloned().ok_or_else(|| {
            CoreError::Config(format!("operation {name} is not an accelerator op"))
        }),
        None => Err(CoreError::Config(format!("unknown operation name {name}"))),
    }
}

fn cpu_by_name(g: &Graph, name: &str) -> Result<BoundOp> {
    match g.find_by_name(name) {
        Some(OpRef::Bound(b)) => Ok(b.clone()),
        Some(OpRef::Unbound(_)) => {
            Err(CoreError::Config(format!("operation {name} is unbound in the reference graph")))
        }
        None => Err(CoreError::Config(format!("unknown operation name {name}"))),
    }
}

/// Parse the generated name of a synchronization op, e.g.
/// `record-e3-s1` or `streamwait-e0-s1-s2`.
fn parse_sync_ident(ident: &str) -> Option<BoundOp> {
    let mut parts = ident.split('-');
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();

    let num = |part: &str, prefix: char| -> Option<u32> {
        part.strip_prefix(prefix)?.parse().ok()
    };

    match (head, rest.as_slice()) {
        ("record", [e, s]) => Some(BoundOp::EventRecord {
            event: Event(num(e, 'e')?),
            stream: Stream(num(s, 's')?),
        }),
        ("waitevent", [e, s]) => Some(BoundOp::StreamWaitEvent {
            stream: Stream(num(s, 's')?),
            event: Event(num(e, 'e')?),
        }),
        ("eventsync", [e]) => Some(BoundOp::EventSync { event: Event(num(e, 'e')?) }),
        ("streamsync", [s]) => Some(BoundOp::StreamSync { stream: Stream(num(s, 's')?) }),
        ("streamwait", [e, waitee, waiter]) => Some(BoundOp::StreamWait {
            waitee: Stream(num(waitee, 's')?),
            waiter: Stream(num(waiter, 's')?),
            event: Event(num(e, 'e')?),
        }),
        _ => None,
    }
}
