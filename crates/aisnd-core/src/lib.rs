pub mod config;
pub mod driver;
mod error;
pub mod null;
pub mod registry;
pub mod ring;
mod session;
mod sound;
pub mod source;

pub use crate::config::Config;
pub use crate::error::{BoxedError, Error, Result};
pub use crate::registry::{DriverContext, DriverEntry, DriverId, DriverRegistry};
pub use crate::session::OutputDriver;
pub use crate::sound::SoundDriver;
pub use crate::source::{AiSource, FnSource, RingSource, SilentSource};
