//! Audio output for the HLE audio interface.
//!
//! Built-in drivers are registered into a process-wide [`DriverRegistry`] the first time it is
//! accessed. Which ones end up there depends on the target and on enabled features: the null
//! driver is always present, PipeWire needs the `pipewire` feature and a running daemon, AAudio
//! is only built for Android.

use std::sync::{Arc, OnceLock};

pub use aisnd_core::driver;
pub use aisnd_core::ring;
pub use aisnd_core::{
    AiSource, Config, DriverContext, DriverEntry, DriverId, DriverRegistry, Error, FnSource,
    OutputDriver, Result, RingSource, SilentSource, SoundDriver,
};

static REGISTRY: OnceLock<DriverRegistry> = OnceLock::new();

/// The process-wide registry, filled with the built-in drivers on first use.
pub fn registry() -> &'static DriverRegistry {
    REGISTRY.get_or_init(|| {
        let registry = DriverRegistry::new();
        register_builtin(&registry);
        registry
    })
}

/// Registers every driver compiled into this build whose capability probe passes.
pub fn register_builtin(registry: &DriverRegistry) {
    aisnd_core::null::register(registry);

    #[cfg(feature = "pipewire")]
    aisnd_pipewire::register(registry);

    #[cfg(target_os = "android")]
    aisnd_aaudio::register(registry);

    tracing::debug!(drivers = registry.drivers().len(), "sound drivers registered");
}

/// Creates the preferred sound driver, falling back to lower priorities.
pub fn create_driver(source: Arc<dyn AiSource>, config: Config) -> Result<Box<dyn SoundDriver>> {
    registry().create_default(&DriverContext { source, config })
}
