//! Conversions from stream descriptions to the `int32_t` parameters AAudio takes.

use crate::{Error, Result};

pub fn sample_rate(rate: u32) -> Result<i32> {
    i32::try_from(rate).map_err(|_| Error::InvalidSampleRate(rate))
}

/// Buffer capacity in frames, saturated to what AAudio can represent.
pub fn buffer_capacity(frames: usize) -> i32 {
    match i32::try_from(frames) {
        Ok(frames) => frames,
        Err(_) => {
            tracing::debug!(frames, "buffer capacity clamped");
            i32::MAX
        }
    }
}
