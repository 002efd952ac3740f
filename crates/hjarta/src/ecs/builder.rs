//! Environment setup.
//!
//! Everything an environment needs to know up front is declared on an
//! [`EnvironmentBuilder`]: which component types go into savegames, which
//! systems run, who listens, where savegames live.
//!
//! ```ignore
//! let env = Environment::builder()
//!     .save_directory("saves")
//!     .persistent::<Health>()
//!     .persistent_as::<Inventory>("inv")
//!     .transient::<PathCache>()
//!     .system(movement_system)
//!     .system_in(Phase::PresentationWorld, SpriteSystem)
//!     .listener(AudioTriggers::default())
//!     .build()?;
//! ```
//!
//! Registration mistakes (two types claiming the same savegame tag) are
//! reported by [`build`](EnvironmentBuilder::build).

use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::component::Component;
use super::environment::Environment;
use super::listener::{EnvironmentListener, Listeners};
use super::registry::ComponentRegistry;
use super::system::{Phase, Scheduler, System};
use crate::error::{Error, Result};

/// Runtime configuration of an [`Environment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Directory savegame slots are resolved against.
    pub save_directory: PathBuf,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            save_directory: PathBuf::from("."),
        }
    }
}

pub struct EnvironmentBuilder {
    config: EnvironmentConfig,
    registry: ComponentRegistry,
    scheduler: Scheduler,
    listeners: Listeners,
    /// First registration error, reported by `build`.
    error: Option<Error>,
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self {
            config: EnvironmentConfig::default(),
            registry: ComponentRegistry::with_builtins(),
            scheduler: Scheduler::new(),
            listeners: Listeners::new(),
            error: None,
        }
    }

    pub fn config(mut self, config: EnvironmentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn save_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.save_directory = dir.into();
        self
    }

    /// Include `T` in savegames, tagged with its short type name.
    pub fn persistent<T>(mut self) -> Self
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let result = self.registry.register_persistent::<T>();
        self.record(result)
    }

    /// Include `T` in savegames under an explicit tag.
    pub fn persistent_as<T>(mut self, tag: impl Into<String>) -> Self
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let result = self.registry.register_persistent_as::<T>(tag);
        self.record(result)
    }

    /// Never write `T` to savegames.
    pub fn transient<T: Component>(mut self) -> Self {
        self.registry.register_transient::<T>();
        self
    }

    pub fn system<S: System>(mut self, system: S) -> Self {
        self.scheduler.add(system, None);
        self
    }

    pub fn system_in<S: System>(mut self, phase: Phase, system: S) -> Self {
        self.scheduler.add(system, Some(phase));
        self
    }

    pub fn listener<L: EnvironmentListener + 'static>(mut self, listener: L) -> Self {
        self.listeners.register(None, Box::new(listener));
        self
    }

    pub fn build(self) -> Result<Environment> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Environment::from_parts(
            self.config,
            self.registry,
            self.scheduler,
            self.listeners,
        ))
    }

    fn record<T>(mut self, result: Result<T>) -> Self {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
        self
    }
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Health(u32);

    mod legacy {
        #[derive(serde::Serialize, serde::Deserialize)]
        pub struct Health(pub u32);
    }

    #[test]
    fn default_config_saves_to_working_directory() {
        let env = EnvironmentBuilder::new().build().unwrap();
        assert_eq!(env.config().save_directory, PathBuf::from("."));
    }

    #[test]
    fn builder_registers_systems_and_directory() {
        let env = Environment::builder()
            .save_directory("saves")
            .persistent::<Health>()
            .system(|_env: &mut Environment| -> Result<()> { Ok(()) })
            .build()
            .unwrap();
        assert_eq!(env.config().save_directory, PathBuf::from("saves"));
        assert_eq!(env.system_count(), 1);
    }

    #[test]
    fn tag_conflict_reported_on_build() {
        let result = Environment::builder()
            .persistent::<Health>()
            .persistent::<legacy::Health>()
            .build();
        assert!(matches!(
            result,
            Err(Error::Configuration(ConfigurationError::ComponentTagConflict { .. }))
        ));

        let env = Environment::builder()
            .persistent::<Health>()
            .persistent_as::<legacy::Health>("LegacyHealth")
            .build();
        assert!(env.is_ok());
    }
}
