//! Android output through `AAudio`.

#![cfg_attr(not(target_os = "android"), allow(dead_code))]

mod error;
mod params;
#[cfg(target_os = "android")]
mod stream;

pub use crate::error::{Error, Result};
#[cfg(target_os = "android")]
pub use crate::stream::{create_driver, register, validate, AAudio, OutStream, StreamBuilder};

pub const DRIVER_NAME: &str = "Android Driver";

pub const DRIVER_PRIORITY: u32 = 1;
