use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::instrument;

use crate::driver::{
    CallbackResult, OutCallbackData, OutStream, OutStreamDesc, Platform, SharingMode,
    StreamBuilder, CHANNEL_COUNT, FRAME_SIZE, SAMPLE_FORMAT,
};
use crate::{AiSource, Config, Error, Result, SoundDriver};

/// Output driver owning at most one native stream of a [`Platform`].
///
/// The stream handle and the sample rate live behind one mutex. The pull callback never touches
/// either: it owns a handle to the source, a copy of the pull limit and the underrun counter.
pub struct OutputDriver<P: Platform> {
    platform: P,
    source: Arc<dyn AiSource>,
    max_buffer_size: usize,
    stream_name: String,
    underruns: Arc<AtomicU64>,
    session: Mutex<Session<P::OutStream>>,
}

struct Session<S> {
    stream: Option<S>,
    sample_rate: u32,
}

impl<P: Platform> OutputDriver<P> {
    pub fn new(platform: P, source: Arc<dyn AiSource>, config: &Config) -> OutputDriver<P> {
        OutputDriver {
            platform,
            source,
            // Round down to whole frames, keeping at least one.
            max_buffer_size: (config.max_buffer_size / FRAME_SIZE).max(1) * FRAME_SIZE,
            stream_name: config.stream_name.clone(),
            underruns: Arc::new(AtomicU64::new(0)),
            session: Mutex::new(Session {
                stream: None,
                sample_rate: 0,
            }),
        }
    }

    /// Pull limit per callback in bytes, a whole number of frames.
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    pub fn is_open(&self) -> bool {
        self.lock().stream.is_some()
    }

    /// Currently configured sample rate, `0` if none.
    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    /// Number of callbacks the source could not satisfy completely.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Session<P::OutStream>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Closes the stream if one is open. Safe to call in any state.
    pub fn teardown(&self) {
        let mut session = self.lock();
        close(&mut session);
    }

    /// Opens a stream at the configured sample rate and starts it.
    ///
    /// A stream that is already open is closed first.
    pub fn setup(&self) -> Result<()> {
        let mut session = self.lock();
        self.open(&mut session)
    }

    fn open(&self, session: &mut Session<P::OutStream>) -> Result<()> {
        close(session);

        if session.sample_rate == 0 {
            return Err(Error::InvalidSampleRate(session.sample_rate));
        }

        let builder = self.platform.create_builder().map_err(|error| {
            tracing::error!(%error, "create stream builder error");
            Error::create_builder(error)
        })?;

        let callback = PullCallback {
            source: self.source.clone(),
            max_buffer_size: self.max_buffer_size,
            underruns: self.underruns.clone(),
        };

        let desc = OutStreamDesc {
            name: self.stream_name.clone(),
            sample_rate: session.sample_rate,
            channel_count: CHANNEL_COUNT,
            format: SAMPLE_FORMAT,
            sharing_mode: SharingMode::Shared,
            buffer_capacity_frames: self.max_buffer_size / FRAME_SIZE,
            callback: Box::new(move |data| callback.fill(data)),
        };

        let stream = builder.open_stream(desc).map_err(|error| {
            tracing::error!(%error, "open stream error");
            Error::open_stream(error)
        })?;

        tracing::debug!(sample_rate = session.sample_rate, "output stream opened");

        let stream = session.stream.insert(stream);
        request_start(stream);

        Ok(())
    }
}

fn close<S: OutStream>(session: &mut Session<S>) {
    if let Some(stream) = session.stream.take() {
        drop(stream);
        tracing::debug!("output stream closed");
    }
}

fn request_start<S: OutStream>(stream: &S) {
    if let Err(error) = stream.request_start() {
        tracing::warn!(%error, "start audio error");
    }
}

fn request_pause<S: OutStream>(stream: &S) {
    if let Err(error) = stream.request_pause() {
        tracing::warn!(%error, "stop audio error");
    }
}

impl<P: Platform> SoundDriver for OutputDriver<P> {
    #[instrument(skip_all, err)]
    fn initialize(&self) -> Result<()> {
        let mut session = self.lock();
        close(&mut session);
        session.sample_rate = 0;
        Ok(())
    }

    #[instrument(skip_all)]
    fn deinitialize(&self) {
        self.teardown();
    }

    #[instrument(skip(self), err)]
    fn set_frequency(&self, frequency: u32) -> Result<()> {
        let mut session = self.lock();
        if session.sample_rate == frequency {
            return Ok(());
        }

        close(&mut session);
        session.sample_rate = frequency;

        let result = self.open(&mut session);
        if result.is_err() {
            // Forget the rate so a retry with the same value opens again.
            session.sample_rate = 0;
        }

        result
    }

    #[instrument(skip_all)]
    fn start_audio(&self) {
        if let Some(stream) = &self.lock().stream {
            request_start(stream);
        }
    }

    #[instrument(skip_all)]
    fn stop_audio(&self) {
        if let Some(stream) = &self.lock().stream {
            request_pause(stream);
        }
    }

    fn set_volume(&self, volume: u32) {
        tracing::trace!(volume, "volume is left to the platform mixer");
    }

    fn ai_update(&self, _wait: bool) {}
}

impl<P: Platform> Drop for OutputDriver<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct PullCallback {
    source: Arc<dyn AiSource>,
    max_buffer_size: usize,
    underruns: Arc<AtomicU64>,
}

impl PullCallback {
    fn fill(&self, data: OutCallbackData<'_>) -> CallbackResult {
        let OutCallbackData { num_frames, bytes } = data;

        let requested = (num_frames * FRAME_SIZE).min(bytes.len());
        let buffer = &mut bytes[..requested];

        let read = requested.min(self.max_buffer_size);
        let written = self.source.load_ai_buffer(&mut buffer[..read]).min(read);

        // Starved: the rest of the period plays as silence.
        if written < requested {
            buffer[written..].fill(0);
            self.underruns.fetch_add(1, Relaxed);
            tracing::debug!(
                missing = requested - written,
                "audio buffer could not be filled"
            );
        }

        CallbackResult::Continue
    }
}
