//! Execution platform: owner of stream and event handles.
//!
//! Streams grow monotonically and live until the platform is dropped.
//! Events are pooled: `new_event` hands out the next handle and grows the
//! physical pool as needed, while `reset_dynamic_resources` rewinds the
//! allocation pointer so the same physical events are reused across
//! playouts. Handles allocated in one playout must not be carried into
//! the next.

use std::sync::Arc;

use tracing::debug;

use crate::comm::Communicator;
use crate::device::DeviceRuntime;
use crate::error::{CoreError, Result};
use crate::types::{Event, Stream};

pub struct Platform {
    streams: Vec<Stream>,
    next_event: u32,
    reserved_events: u32,
    device: Box<dyn DeviceRuntime>,
    comm: Arc<dyn Communicator>,
}

impl Platform {
    /// Platform with only the default stream.
    pub fn new(mut device: Box<dyn DeviceRuntime>, comm: Arc<dyn Communicator>) -> Result<Self> {
        device.ensure_streams(1)?;
        Ok(Self {
            streams: vec![Stream::DEFAULT],
            next_event: 0,
            reserved_events: 0,
            device,
            comm,
        })
    }

    /// Platform with `n` streams beyond the default one.
    pub fn with_streams(
        n: usize,
        device: Box<dyn DeviceRuntime>,
        comm: Arc<dyn Communicator>,
    ) -> Result<Self> {
        let mut plat = Self::new(device, comm)?;
        plat.ensure_streams(n)?;
        Ok(plat)
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn device_name(&self) -> &'static str {
        self.device.name()
    }

    /// All streams, default stream first.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Number of streams, not counting the default stream.
    pub fn num_streams(&self) -> usize {
        self.streams.len() - 1
    }

    /// Number of events handed out since the last reset.
    pub fn num_events(&self) -> usize {
        self.next_event as usize
    }

    pub fn new_stream(&mut self) -> Result<Stream> {
        let stream = Stream(self.streams.len() as u32);
        self.device.ensure_streams(self.streams.len() + 1)?;
        self.streams.push(stream);
        debug!("allocated stream {stream}");
        Ok(stream)
    }

    /// Grow to at least `n` streams beyond the default one.
    pub fn ensure_streams(&mut self, n: usize) -> Result<()> {
        while self.num_streams() < n {
            self.new_stream()?;
        }
        Ok(())
    }

    pub fn new_event(&mut self) -> Result<Event> {
        let event = Event(self.next_event);
        self.next_event += 1;
        if self.next_event > self.reserved_events {
            self.device.ensure_events(self.next_event as usize)?;
            self.reserved_events = self.next_event;
        }
        Ok(event)
    }

    /// Grow the physical event pool to at least `n` without moving the
    /// allocation pointer.
    pub fn reserve_events(&mut self, n: usize) -> Result<()> {
        if n as u32 > self.reserved_events {
            self.device.ensure_events(n)?;
            self.reserved_events = n as u32;
        }
        Ok(())
    }

    /// Make event handles `0..n` valid, reserving physical events as
    /// needed. Used to re-arm a reset platform before running an
    /// ordering whose event handles were allocated earlier.
    pub fn ensure_events(&mut self, n: usize) -> Result<()> {
        self.reserve_events(n)?;
        if self.next_event < n as u32 {
            self.next_event = n as u32;
        }
        Ok(())
    }

    /// Rewind the event allocation pointer. Physical resources stay
    /// alive and are reused by the next playout.
    pub fn reset_dynamic_resources(&mut self) {
        self.next_event = 0;
    }

    pub fn validate_stream(&self, stream: Stream) -> Result<()> {
        if (stream.0 as usize) < self.streams.len() {
            Ok(())
        } else {
            Err(CoreError::Config(format!(
                "requested non-existent stream {stream} (platform has {})",
                self.streams.len()
            )))
        }
    }

    fn validate_event(&self, event: Event) -> Result<()> {
        if event.0 < self.next_event {
            Ok(())
        } else {
            Err(CoreError::Invariant(format!(
                "event {event} used without allocation (pointer at {})",
                self.next_event
            )))
        }
    }

    pub fn record_event(&mut self, event: Event, stream: Stream) -> Result<()> {
        self.validate_event(event)?;
        self.validate_stream(stream)?;
        self.device.record_event(event, stream)
    }

    pub fn stream_wait_event(&mut self, stream: Stream, event: Event) -> Result<()> {
        self.validate_event(event)?;
        self.validate_stream(stream)?;
        self.device.stream_wait_event(stream, event)
    }

    pub fn sync_event(&mut self, event: Event) -> Result<()> {
        self.validate_event(event)?;
        self.device.sync_event(event)
    }

    pub fn sync_stream(&mut self, stream: Stream) -> Result<()> {
        self.validate_stream(stream)?;
        self.device.sync_stream(stream)
    }

    /// Drain every stream.
    pub fn sync_all(&mut self) -> Result<()> {
        for i in 0..self.streams.len() {
            let stream = self.streams[i];
            self.device.sync_stream(stream)?;
        }
        Ok(())
    }
}
