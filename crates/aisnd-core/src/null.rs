//! Platform without an audio device.
//!
//! Streams are driven by a worker thread that pulls one period of audio at wall-clock pace and
//! throws it away, so the producer side keeps moving at the expected rate.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::driver::{
    CallbackResult, OutCallback, OutCallbackData, OutStream, OutStreamDesc, Platform,
    StreamBuilder,
};
use crate::{DriverContext, DriverEntry, DriverId, DriverRegistry, OutputDriver, SoundDriver};

pub const DRIVER_NAME: &str = "No Sound Driver";

pub const DRIVER_PRIORITY: u32 = 0;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum NullError {
    #[error("failed to spawn thread")]
    ThreadSpawn(#[source] io::Error),
}

#[derive(Debug, Clone)]
pub struct NullPlatform {
    period_frames: usize,
}

impl NullPlatform {
    pub fn new(period_frames: usize) -> NullPlatform {
        NullPlatform {
            period_frames: period_frames.max(1),
        }
    }
}

impl Platform for NullPlatform {
    type Error = NullError;
    type Builder = NullBuilder;
    type OutStream = NullStream;

    fn create_builder(&self) -> Result<NullBuilder, NullError> {
        Ok(NullBuilder {
            period_frames: self.period_frames,
        })
    }
}

#[derive(Debug)]
pub struct NullBuilder {
    period_frames: usize,
}

impl StreamBuilder for NullBuilder {
    type Error = NullError;
    type OutStream = NullStream;

    fn open_stream(self, desc: OutStreamDesc) -> Result<NullStream, NullError> {
        let period_frames = self.period_frames.min(desc.buffer_capacity_frames.max(1));
        let period = Duration::from_secs_f64(period_frames as f64 / desc.sample_rate.max(1) as f64);
        let period_bytes = period_frames * desc.frame_size();

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                active: false,
                terminate: false,
            }),
            condvar: Condvar::new(),
        });

        let worker = Worker {
            shared: shared.clone(),
            callback: desc.callback,
            period,
            period_frames,
            buffer: vec![0; period_bytes],
        };

        let thread = std::thread::Builder::new()
            .name(format!("null-audio-{}", desc.name))
            .spawn(move || worker.run())
            .map_err(NullError::ThreadSpawn)?;

        Ok(NullStream {
            shared,
            thread: Some(thread),
        })
    }
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut State)) {
        f(&mut self.lock());
        self.condvar.notify_all();
    }
}

struct State {
    active: bool,
    terminate: bool,
}

struct Worker {
    shared: Arc<Shared>,
    callback: OutCallback,
    period: Duration,
    period_frames: usize,
    buffer: Vec<u8>,
}

impl Worker {
    fn run(mut self) {
        let mut deadline = Instant::now();
        let mut state = self.shared.lock();

        loop {
            if state.terminate {
                return;
            }

            if !state.active {
                state = self
                    .shared
                    .condvar
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                deadline = Instant::now();
                continue;
            }

            let now = Instant::now();
            if now < deadline {
                state = self
                    .shared
                    .condvar
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }

            drop(state);

            let result = (self.callback)(OutCallbackData {
                num_frames: self.period_frames,
                bytes: &mut self.buffer,
            });

            if result == CallbackResult::Stop {
                tracing::debug!("null stream stopped by callback");
                return;
            }

            deadline += self.period;
            state = self.shared.lock();
        }
    }
}

pub struct NullStream {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl OutStream for NullStream {
    type Error = NullError;

    fn is_active(&self) -> Result<bool, NullError> {
        Ok(self.shared.lock().active)
    }

    fn request_start(&self) -> Result<(), NullError> {
        self.shared.update(|state| state.active = true);
        Ok(())
    }

    fn request_pause(&self) -> Result<(), NullError> {
        self.shared.update(|state| state.active = false);
        Ok(())
    }
}

impl Drop for NullStream {
    fn drop(&mut self) {
        self.shared.update(|state| state.terminate = true);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("null audio thread panicked");
            }
        }
    }
}

pub fn create_driver(ctx: &DriverContext) -> crate::Result<Box<dyn SoundDriver>> {
    let platform = NullPlatform::new(ctx.config.null_period_frames);
    Ok(Box::new(OutputDriver::new(
        platform,
        Arc::clone(&ctx.source),
        &ctx.config,
    )))
}

/// The null driver works everywhere, so registration only fails for a duplicate id.
pub fn register(registry: &DriverRegistry) -> bool {
    registry.register(DriverEntry {
        id: DriverId::Null,
        name: DRIVER_NAME,
        priority: DRIVER_PRIORITY,
        factory: create_driver,
    })
}
