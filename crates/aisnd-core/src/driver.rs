//! Native audio API abstraction.
//!
//! A [`Platform`] hands out [`StreamBuilder`]s, which open [`OutStream`]s. Every stream pulls
//! interleaved PCM through the callback stored in its [`OutStreamDesc`], on a thread owned by the
//! platform. Dropping an [`OutStream`] closes it; once the drop returns, the callback must not be
//! invoked again.

use std::fmt;

/// Number of interleaved channels in every stream opened by this crate.
pub const CHANNEL_COUNT: u16 = 2;

/// Sample format of every stream opened by this crate.
pub const SAMPLE_FORMAT: SampleFormat = SampleFormat::I16;

/// Size of one frame in bytes (all channels of one sample instant).
pub const FRAME_SIZE: usize = CHANNEL_COUNT as usize * SAMPLE_FORMAT.bytes_per_sample();

pub trait Platform: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;
    type Builder: StreamBuilder<Error = Self::Error, OutStream = Self::OutStream>;
    type OutStream: OutStream<Error = Self::Error>;

    fn create_builder(&self) -> Result<Self::Builder, Self::Error>;
}

/// Short-lived configuration object. Released when dropped or consumed by
/// [`StreamBuilder::open_stream()`].
pub trait StreamBuilder {
    type Error: std::error::Error + Send + Sync + 'static;
    type OutStream: OutStream<Error = Self::Error>;

    fn open_stream(self, desc: OutStreamDesc) -> Result<Self::OutStream, Self::Error>;
}

pub trait OutStream: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn is_active(&self) -> Result<bool, Self::Error>;

    fn request_start(&self) -> Result<(), Self::Error>;

    fn request_pause(&self) -> Result<(), Self::Error>;
}

pub type OutCallback = Box<dyn FnMut(OutCallbackData<'_>) -> CallbackResult + Send + 'static>;

pub struct OutStreamDesc {
    pub name: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub format: SampleFormat,
    pub sharing_mode: SharingMode,
    pub buffer_capacity_frames: usize,
    pub callback: OutCallback,
}

impl OutStreamDesc {
    pub fn frame_size(&self) -> usize {
        self.channel_count as usize * self.format.bytes_per_sample()
    }
}

impl fmt::Debug for OutStreamDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutStreamDesc")
            .field("name", &self.name)
            .field("sample_rate", &self.sample_rate)
            .field("channel_count", &self.channel_count)
            .field("format", &self.format)
            .field("sharing_mode", &self.sharing_mode)
            .field("buffer_capacity_frames", &self.buffer_capacity_frames)
            .finish_non_exhaustive()
    }
}

/// Platform-owned output buffer for one callback invocation.
///
/// `bytes` holds at least `num_frames` frames.
pub struct OutCallbackData<'a> {
    pub num_frames: usize,
    pub bytes: &'a mut [u8],
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum CallbackResult {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum SampleFormat {
    I16,
    F32,
}

impl SampleFormat {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum SharingMode {
    Exclusive,
    #[default]
    Shared,
}
