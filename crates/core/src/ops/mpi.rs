//! Message-passing operations.
//!
//! These are host operations over the [`Communicator`] seam. Nonblocking
//! starts deposit their request into a shared slot; the matching wait
//! operations drain those slots. `Isend`/`Irecv` never block the host,
//! the wait family does.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::comm::Request;
use crate::error::{CoreError, Result};
use crate::ops::{tag, CpuTask};
use crate::platform::Platform;

/// Slot shared between a nonblocking start and its wait.
pub type RequestSlot = Arc<Mutex<Option<Request>>>;

pub fn request_slot() -> RequestSlot {
    Arc::new(Mutex::new(None))
}

fn take(slot: &RequestSlot, who: &str) -> Result<Request> {
    slot.lock()
        .unwrap()
        .take()
        .ok_or_else(|| CoreError::Comm(format!("{who}: wait ran before its start operation")))
}

/// Nonblocking send of a payload to a peer rank.
pub struct Isend {
    name: String,
    dest: usize,
    mtag: i32,
    payload: Arc<Vec<u8>>,
    slot: RequestSlot,
}

impl Isend {
    pub fn new(
        name: impl Into<String>,
        dest: usize,
        mtag: i32,
        payload: Arc<Vec<u8>>,
        slot: RequestSlot,
    ) -> Self {
        Self { name: name.into(), dest, mtag, payload, slot }
    }
}

impl CpuTask for Isend {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> u8 {
        tag::ISEND
    }

    fn kind(&self) -> &'static str {
        "isend"
    }

    fn run(&self, plat: &mut Platform) -> Result<()> {
        let comm = plat.comm().clone();
        let req = comm.isend(self.dest, self.mtag, &self.payload)?;
        *self.slot.lock().unwrap() = Some(req);
        Ok(())
    }

    fn json_args(&self) -> Value {
        json!({ "dest": self.dest, "tag": self.mtag, "bytes": self.payload.len() })
    }
}

/// Nonblocking receive from a peer rank.
pub struct Irecv {
    name: String,
    source: usize,
    mtag: i32,
    len: usize,
    slot: RequestSlot,
}

impl Irecv {
    pub fn new(
        name: impl Into<String>,
        source: usize,
        mtag: i32,
        len: usize,
        slot: RequestSlot,
    ) -> Self {
        Self { name: name.into(), source, mtag, len, slot }
    }
}

impl CpuTask for Irecv {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> u8 {
        tag::IRECV
    }

    fn kind(&self) -> &'static str {
        "irecv"
    }

    fn run(&self, plat: &mut Platform) -> Result<()> {
        let comm = plat.comm().clone();
        let req = comm.irecv(self.source, self.mtag, self.len)?;
        *self.slot.lock().unwrap() = Some(req);
        Ok(())
    }

    fn json_args(&self) -> Value {
        json!({ "source": self.source, "tag": self.mtag, "bytes": self.len })
    }
}

/// Blocks the host until one request completes.
pub struct WaitOne {
    name: String,
    slot: RequestSlot,
}

impl WaitOne {
    pub fn new(name: impl Into<String>, slot: RequestSlot) -> Self {
        Self { name: name.into(), slot }
    }
}

impl CpuTask for WaitOne {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> u8 {
        tag::WAIT
    }

    fn kind(&self) -> &'static str {
        "wait"
    }

    fn run(&self, plat: &mut Platform) -> Result<()> {
        let req = take(&self.slot, &self.name)?;
        plat.comm().clone().wait(req)
    }
}

/// Blocks the host until every owned request completes, in one call.
pub struct OwningWaitall {
    name: String,
    slots: Vec<RequestSlot>,
}

impl OwningWaitall {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), slots: Vec::new() }
    }

    pub fn add_slot(&mut self, slot: RequestSlot) {
        self.slots.push(slot);
    }
}

impl CpuTask for OwningWaitall {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> u8 {
        tag::OWNING_WAITALL
    }

    fn kind(&self) -> &'static str {
        "owning_waitall"
    }

    fn run(&self, plat: &mut Platform) -> Result<()> {
        let mut reqs = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            reqs.push(take(slot, &self.name)?);
        }
        plat.comm().clone().wait_all(&reqs)
    }

    fn json_args(&self) -> Value {
        json!({ "count": self.slots.len() })
    }
}

/// Waits on a set of requests one by one.
pub struct MultiWait {
    name: String,
    slots: Vec<RequestSlot>,
}

impl MultiWait {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), slots: Vec::new() }
    }

    pub fn add_slot(&mut self, slot: RequestSlot) {
        self.slots.push(slot);
    }
}

impl CpuTask for MultiWait {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> u8 {
        tag::MULTI_WAIT
    }

    fn kind(&self) -> &'static str {
        "multi_wait"
    }

    fn run(&self, plat: &mut Platform) -> Result<()> {
        let comm = plat.comm().clone();
        for slot in &self.slots {
            comm.wait(take(slot, &self.name)?)?;
        }
        Ok(())
    }

    fn json_args(&self) -> Value {
        json!({ "count": self.slots.len() })
    }
}
