use tracing::info;

use crate::error::{CoreError, Result};
use crate::types::{Event, Stream};

/// Seam to the accelerator runtime.
///
/// The platform talks to the device exclusively through handle ids; how a
/// backend maps them to physical queues and events is its own business.
/// Backends must tolerate `ensure_*` being called repeatedly with growing
/// counts; physical resources are released only when the backend drops.
pub trait DeviceRuntime: Send {
    /// Name of this runtime, for logs.
    fn name(&self) -> &'static str;

    /// Make stream handles `0..n` usable (`0` is the default stream).
    fn ensure_streams(&mut self, n: usize) -> Result<()>;

    /// Make event handles `0..n` usable.
    fn ensure_events(&mut self, n: usize) -> Result<()>;

    /// Record `event` on `stream`.
    fn record_event(&mut self, event: Event, stream: Stream) -> Result<()>;

    /// Enqueue on `stream` a wait for `event`.
    fn stream_wait_event(&mut self, stream: Stream, event: Event) -> Result<()>;

    /// Block the host until `event` has completed.
    fn sync_event(&mut self, event: Event) -> Result<()>;

    /// Block the host until `stream` has drained.
    fn sync_stream(&mut self, stream: Stream) -> Result<()>;
}

/// Host-only device runtime.
///
/// Tracks which handles have been made usable and rejects anything else,
/// so scheduling logic can be exercised without an accelerator. All sync
/// operations complete immediately: with no device there is nothing to
/// wait for.
#[derive(Debug, Default)]
pub struct NullDevice {
    streams: usize,
    events: usize,
}

impl NullDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_stream(&self, stream: Stream, what: &str) -> Result<()> {
        if (stream.0 as usize) < self.streams {
            Ok(())
        } else {
            Err(CoreError::resource(what, format!("unknown stream {stream}")))
        }
    }

    fn check_event(&self, event: Event, what: &str) -> Result<()> {
        if (event.0 as usize) < self.events {
            Ok(())
        } else {
            Err(CoreError::resource(what, format!("unknown event {event}")))
        }
    }
}

impl DeviceRuntime for NullDevice {
    fn name(&self) -> &'static str {
        "null"
    }

    fn ensure_streams(&mut self, n: usize) -> Result<()> {
        self.streams = self.streams.max(n);
        Ok(())
    }

    fn ensure_events(&mut self, n: usize) -> Result<()> {
        self.events = self.events.max(n);
        Ok(())
    }

    fn record_event(&mut self, event: Event, stream: Stream) -> Result<()> {
        self.check_event(event, "record_event")?;
        self.check_stream(stream, "record_event")
    }

    fn stream_wait_event(&mut self, stream: Stream, event: Event) -> Result<()> {
        self.check_stream(stream, "stream_wait_event")?;
        self.check_event(event, "stream_wait_event")
    }

    fn sync_event(&mut self, event: Event) -> Result<()> {
        self.check_event(event, "sync_event")
    }

    fn sync_stream(&mut self, stream: Stream) -> Result<()> {
        self.check_stream(stream, "sync_stream")
    }
}

/// Pick the best available device runtime. Accelerator backends plug in
/// behind [`DeviceRuntime`]; without one the host-only runtime is used.
pub fn auto_detect() -> Box<dyn DeviceRuntime> {
    info!("Using host-only device runtime");
    Box::new(NullDevice::new())
}
