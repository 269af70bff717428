use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use aaudio::{AAudioStream, AAudioStreamBuilder, CallbackResult, Direction, Format, SharingMode};
use aisnd_core::driver::{self, OutCallbackData, OutStreamDesc, SampleFormat};
use aisnd_core::{DriverContext, DriverEntry, DriverId, DriverRegistry, OutputDriver, SoundDriver};

use crate::{params, Error, Result, DRIVER_NAME, DRIVER_PRIORITY};

fn describe(error: aaudio::Error) -> String {
    format!("{error:?}")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AAudio;

impl driver::Platform for AAudio {
    type Error = Error;
    type Builder = StreamBuilder;
    type OutStream = OutStream;

    fn create_builder(&self) -> Result<StreamBuilder> {
        let builder = AAudioStreamBuilder::new()
            .map_err(|e| Error::CreateBuilder(describe(e)))?;
        Ok(StreamBuilder { builder })
    }
}

pub struct StreamBuilder {
    builder: AAudioStreamBuilder,
}

impl driver::StreamBuilder for StreamBuilder {
    type Error = Error;
    type OutStream = OutStream;

    fn open_stream(self, desc: OutStreamDesc) -> Result<OutStream> {
        let frame_size = desc.frame_size();
        let OutStreamDesc {
            sample_rate,
            channel_count,
            format,
            sharing_mode,
            buffer_capacity_frames,
            mut callback,
            ..
        } = desc;

        let format = match format {
            SampleFormat::I16 => Format::I16,
            SampleFormat::F32 => Format::F32,
            other => return Err(Error::UnsupportedFormat(other)),
        };

        let sample_rate = params::sample_rate(sample_rate)?;
        let buffer_capacity = params::buffer_capacity(buffer_capacity_frames);

        let sharing_mode = match sharing_mode {
            driver::SharingMode::Exclusive => SharingMode::Exclusive,
            driver::SharingMode::Shared => SharingMode::Shared,
        };

        let stream = self
            .builder
            .set_direction(Direction::Output)
            .set_sharing_mode(sharing_mode)
            .set_sample_rate(sample_rate)
            .set_channel_count(i32::from(channel_count))
            .set_format(format)
            .set_buffer_capacity_in_frames(buffer_capacity)
            .set_callbacks(
                move |_, data: &mut [u8], num_frames: i32| {
                    let len = (num_frames.max(0) as usize * frame_size).min(data.len());
                    let result = callback(OutCallbackData {
                        num_frames: len / frame_size,
                        bytes: &mut data[..len],
                    });

                    match result {
                        driver::CallbackResult::Continue => CallbackResult::Continue,
                        driver::CallbackResult::Stop => CallbackResult::Stop,
                    }
                },
                |_, error| tracing::error!(error = ?error, "aaudio stream error"),
            )
            .open_stream()
            .map_err(|e| Error::OpenStream(describe(e)))?;

        Ok(OutStream {
            stream: Mutex::new(stream),
            active: AtomicBool::new(false),
        })
    }
}

pub struct OutStream {
    stream: Mutex<AAudioStream>,
    active: AtomicBool,
}

// SAFETY: AAudio stream calls may be made from any thread; the mutex serializes them on our side.
unsafe impl Send for OutStream {}

impl driver::OutStream for OutStream {
    type Error = Error;

    fn is_active(&self) -> Result<bool> {
        Ok(self.active.load(Ordering::Acquire))
    }

    fn request_start(&self) -> Result<()> {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        stream
            .request_start()
            .map_err(|e| Error::Start(describe(e)))?;
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    fn request_pause(&self) -> Result<()> {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        stream
            .request_pause()
            .map_err(|e| Error::Pause(describe(e)))?;
        self.active.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for OutStream {
    fn drop(&mut self) {
        let stream = self.stream.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = stream.release() {
            tracing::warn!(error = ?error, "failed to close aaudio stream");
        }
    }
}

/// AAudio is usable if a stream builder can be created (API level 26 and up).
pub fn validate() -> bool {
    AAudioStreamBuilder::new().is_ok()
}

pub fn create_driver(ctx: &DriverContext) -> aisnd_core::Result<Box<dyn SoundDriver>> {
    Ok(Box::new(OutputDriver::new(
        AAudio,
        Arc::clone(&ctx.source),
        &ctx.config,
    )))
}

pub fn register(registry: &DriverRegistry) -> bool {
    registry.register_if(
        validate,
        DriverEntry {
            id: DriverId::AAudio,
            name: DRIVER_NAME,
            priority: DRIVER_PRIORITY,
            factory: create_driver,
        },
    )
}
