use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;

use crate::{AiSource, Config, Error, Result, SoundDriver};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverId {
    Null,
    PipeWire,
    AAudio,
}

impl DriverId {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverId::Null => "null",
            DriverId::PipeWire => "pipewire",
            DriverId::AAudio => "aaudio",
        }
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown driver name: {0:?}")]
pub struct ParseDriverIdError(String);

impl FromStr for DriverId {
    type Err = ParseDriverIdError;

    fn from_str(s: &str) -> Result<DriverId, ParseDriverIdError> {
        Ok(match s {
            "null" => DriverId::Null,
            "pipewire" => DriverId::PipeWire,
            "aaudio" => DriverId::AAudio,
            _ => return Err(ParseDriverIdError(s.to_owned())),
        })
    }
}

/// Everything a factory needs to construct a driver.
#[derive(Clone)]
pub struct DriverContext {
    pub source: Arc<dyn AiSource>,
    pub config: Config,
}

impl fmt::Debug for DriverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub type Factory = fn(&DriverContext) -> Result<Box<dyn SoundDriver>>;

#[derive(Clone, Copy)]
pub struct DriverEntry {
    pub id: DriverId,
    pub name: &'static str,
    /// Higher is preferred.
    pub priority: u32,
    pub factory: Factory,
}

impl fmt::Debug for DriverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Drivers available in this process.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    entries: DashMap<DriverId, DriverEntry>,
}

impl DriverRegistry {
    pub fn new() -> DriverRegistry {
        DriverRegistry::default()
    }

    /// Adds `entry`, returning `false` if its id is taken. The first registration wins.
    pub fn register(&self, entry: DriverEntry) -> bool {
        match self.entries.entry(entry.id) {
            Entry::Occupied(_) => {
                tracing::warn!(id = %entry.id, "driver already registered");
                false
            }
            Entry::Vacant(slot) => {
                tracing::debug!(id = %entry.id, name = entry.name, "driver registered");
                slot.insert(entry);
                true
            }
        }
    }

    /// Runs the capability probe and registers `entry` only if it passes.
    pub fn register_if(&self, validate: impl FnOnce() -> bool, entry: DriverEntry) -> bool {
        if !validate() {
            tracing::debug!(id = %entry.id, "driver unavailable, skipping registration");
            return false;
        }

        self.register(entry)
    }

    pub fn get(&self, id: DriverId) -> Option<DriverEntry> {
        self.entries.get(&id).map(|entry| *entry)
    }

    pub fn contains(&self, id: DriverId) -> bool {
        self.entries.contains_key(&id)
    }

    /// All registered drivers, most preferred first.
    pub fn drivers(&self) -> Vec<DriverEntry> {
        let mut drivers: Vec<_> = self.entries.iter().map(|entry| *entry).collect();
        drivers.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        drivers
    }

    pub fn create(&self, id: DriverId, ctx: &DriverContext) -> Result<Box<dyn SoundDriver>> {
        let entry = self.get(id).ok_or(Error::UnknownDriver(id))?;
        (entry.factory)(ctx)
    }

    /// Creates the driver named in the config, or else the most preferred one that constructs
    /// successfully.
    pub fn create_default(&self, ctx: &DriverContext) -> Result<Box<dyn SoundDriver>> {
        let mut candidates = self.drivers();

        if let Some(preferred) = ctx.config.driver {
            match candidates.iter().position(|entry| entry.id == preferred) {
                Some(idx) => {
                    let entry = candidates.remove(idx);
                    candidates.insert(0, entry);
                }
                None => tracing::warn!(id = %preferred, "preferred driver is not available"),
            }
        }

        for entry in candidates {
            match (entry.factory)(ctx) {
                Ok(driver) => {
                    tracing::info!(id = %entry.id, name = entry.name, "using sound driver");
                    return Ok(driver);
                }
                Err(error) => {
                    tracing::warn!(id = %entry.id, %error, "failed to create sound driver");
                }
            }
        }

        Err(Error::NoDriver)
    }
}
