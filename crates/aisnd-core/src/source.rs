use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::ring::Consumer;

/// Upstream producer of interleaved signed 16-bit stereo PCM.
///
/// Called from the platform's realtime thread, so implementations must not block.
pub trait AiSource: Send + Sync + 'static {
    /// Fills the front of `dst` with up to `dst.len()` bytes and returns how many were written.
    ///
    /// Returning less than `dst.len()` signals starvation, the caller pads the rest with silence.
    fn load_ai_buffer(&self, dst: &mut [u8]) -> usize;
}

impl<T: AiSource + ?Sized> AiSource for Arc<T> {
    fn load_ai_buffer(&self, dst: &mut [u8]) -> usize {
        (**self).load_ai_buffer(dst)
    }
}

/// Source that never has audio ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSource;

impl AiSource for SilentSource {
    fn load_ai_buffer(&self, _dst: &mut [u8]) -> usize {
        0
    }
}

/// Adapts a closure into an [`AiSource`].
pub struct FnSource<F>(pub F);

impl<F> AiSource for FnSource<F>
where
    F: Fn(&mut [u8]) -> usize + Send + Sync + 'static,
{
    fn load_ai_buffer(&self, dst: &mut [u8]) -> usize {
        (self.0)(dst)
    }
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

/// [`AiSource`] draining the consuming side of a [`ring`](crate::ring).
///
/// The consumer is only ever try-locked from the realtime thread; a contended lock counts as
/// starvation.
#[derive(Debug)]
pub struct RingSource {
    consumer: Mutex<Consumer>,
}

impl RingSource {
    pub fn new(consumer: Consumer) -> RingSource {
        RingSource {
            consumer: Mutex::new(consumer),
        }
    }

    /// Number of bytes queued for playback.
    pub fn queued(&self) -> usize {
        let mut consumer = self.consumer.lock().unwrap_or_else(PoisonError::into_inner);
        consumer.refresh();
        consumer.len()
    }

    /// Drops everything queued so far.
    pub fn clear(&self) {
        let mut consumer = self.consumer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut scratch = [0u8; 1024];
        while consumer.read(&mut scratch) > 0 {}
    }
}

impl AiSource for RingSource {
    fn load_ai_buffer(&self, dst: &mut [u8]) -> usize {
        match self.consumer.try_lock() {
            Ok(mut consumer) => consumer.read(dst),
            Err(_) => 0,
        }
    }
}
