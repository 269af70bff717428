use crate::Result;

/// Interface every output backend exposes to the audio plugin.
///
/// Control calls come from the plugin thread; the backend pulls samples on its own.
pub trait SoundDriver: Send + Sync + 'static {
    /// Closes any open stream and forgets the sample rate.
    fn initialize(&self) -> Result<()>;

    /// Closes any open stream. Idempotent.
    fn deinitialize(&self);

    /// Reopens the output stream at `frequency` Hz, unless that is already the current rate.
    fn set_frequency(&self, frequency: u32) -> Result<()>;

    /// Resumes playback. Failures are logged.
    fn start_audio(&self);

    /// Pauses playback, keeping the stream allocated. Failures are logged.
    fn stop_audio(&self);

    fn set_volume(&self, volume: u32);

    fn ai_update(&self, wait: bool);
}
