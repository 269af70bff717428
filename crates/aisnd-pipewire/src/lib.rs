mod error;
mod internal;

use std::sync::Arc;

use aisnd_core::driver::{self, OutStreamDesc};
use aisnd_core::{DriverContext, DriverEntry, DriverId, DriverRegistry, OutputDriver, SoundDriver};

pub use crate::error::{Error, Result};
use crate::internal::{Handle, OutStreamId, PwThread};

pub const DRIVER_NAME: &str = "PipeWire Driver";

pub const DRIVER_PRIORITY: u32 = 2;

/// Connection to the PipeWire daemon, served by a dedicated main loop thread.
pub struct PipeWire {
    handle: Handle,
}

impl PipeWire {
    pub fn new() -> Result<PipeWire> {
        let (handle, receiver) = Handle::new();

        let (err_sender, err_receiver) = oneshot::channel();

        std::thread::Builder::new()
            .name("pipewire-driver".into())
            .spawn(move || match PwThread::new() {
                Ok(thread) => {
                    let _ = err_sender.send(None);
                    thread.run(receiver);
                }
                Err(e) => {
                    let _ = err_sender.send(Some(e));
                }
            })
            .map_err(Error::ThreadSpawn)?;

        match err_receiver.recv() {
            Ok(None) => Ok(PipeWire { handle }),
            Ok(Some(err)) => Err(err),
            Err(_) => Err(Error::ThreadCrashed),
        }
    }
}

impl Drop for PipeWire {
    fn drop(&mut self) {
        let _ = self.handle.terminate();
    }
}

impl driver::Platform for PipeWire {
    type Error = Error;
    type Builder = StreamBuilder;
    type OutStream = OutStream;

    fn create_builder(&self) -> Result<StreamBuilder> {
        Ok(StreamBuilder {
            handle: self.handle.clone(),
        })
    }
}

pub struct StreamBuilder {
    handle: Handle,
}

impl driver::StreamBuilder for StreamBuilder {
    type Error = Error;
    type OutStream = OutStream;

    fn open_stream(self, desc: OutStreamDesc) -> Result<OutStream> {
        let id = self.handle.create_out_stream(desc)?;
        Ok(OutStream {
            id,
            handle: self.handle,
        })
    }
}

pub struct OutStream {
    id: OutStreamId,
    handle: Handle,
}

impl driver::OutStream for OutStream {
    type Error = Error;

    fn is_active(&self) -> Result<bool> {
        self.handle.is_out_stream_active(self.id)
    }

    fn request_start(&self) -> Result<()> {
        self.handle.set_out_stream_active(self.id, true)
    }

    fn request_pause(&self) -> Result<()> {
        self.handle.set_out_stream_active(self.id, false)
    }
}

impl Drop for OutStream {
    fn drop(&mut self) {
        if let Err(error) = self.handle.destroy_out_stream(self.id) {
            tracing::warn!(%error, "failed to destroy pipewire stream");
        }
    }
}

/// Checks whether a PipeWire daemon is reachable.
pub fn validate() -> bool {
    match PipeWire::new() {
        Ok(_) => true,
        Err(error) => {
            tracing::debug!(%error, "pipewire is unavailable");
            false
        }
    }
}

pub fn create_driver(ctx: &DriverContext) -> aisnd_core::Result<Box<dyn SoundDriver>> {
    let platform = PipeWire::new().map_err(aisnd_core::Error::platform)?;
    let source = Arc::clone(&ctx.source);
    Ok(Box::new(OutputDriver::new(platform, source, &ctx.config)))
}

pub fn register(registry: &DriverRegistry) -> bool {
    registry.register_if(
        validate,
        DriverEntry {
            id: DriverId::PipeWire,
            name: DRIVER_NAME,
            priority: DRIVER_PRIORITY,
            factory: create_driver,
        },
    )
}
