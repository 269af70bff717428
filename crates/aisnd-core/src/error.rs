use crate::registry::DriverId;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to create stream builder")]
    CreateBuilder(#[source] BoxedError),

    #[error("failed to open output stream")]
    OpenStream(#[source] BoxedError),

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("unknown driver: {0}")]
    UnknownDriver(DriverId),

    #[error("no sound driver available")]
    NoDriver,

    #[error("platform error")]
    Platform(#[source] BoxedError),
}

impl Error {
    #[cold]
    pub fn create_builder<E>(error: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::CreateBuilder(Box::new(error))
    }

    #[cold]
    pub fn open_stream<E>(error: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::OpenStream(Box::new(error))
    }

    #[cold]
    pub fn platform<E>(error: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Platform(Box::new(error))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
