use aisnd_core::driver::SampleFormat;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("create stream builder error: {0}")]
    CreateBuilder(String),

    #[error("open stream error: {0}")]
    OpenStream(String),

    #[error("request start error: {0}")]
    Start(String),

    #[error("request pause error: {0}")]
    Pause(String),

    #[error("unsupported sample format: {0:?}")]
    UnsupportedFormat(SampleFormat),

    #[error("sample rate out of range: {0}")]
    InvalidSampleRate(u32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
