//! Convenience re-exports — `use hjarta::prelude::*` for the common items.

// Store
pub use crate::ecs::{
    Archetype, Bundle, Component, ComponentEvent, ComponentSet, ComponentType, Entity, EntityEvent,
    EntityId, EntityMut, EntityRef, Environment, EnvironmentBuilder, EnvironmentConfig,
    EnvironmentListener, ListenerHandle, Phase, System, SystemInfo,
};
#[cfg(feature = "diagnostics")]
pub use crate::ecs::SystemTiming;

// Errors
pub use crate::error::{
    ConfigurationError, Error, PersistenceError, QueryError, Result, StateError,
};

// Math
pub use crate::math::{Bounds, Transform, Vec2};

// Savegames and scenes
pub use crate::prepare::{CancelToken, Preparation};
pub use crate::savegame::{SaveGame, SavedComponent, SavedEntity};
pub use crate::scenes::{DefaultScene, Scene, Scenes};
pub use crate::time::Time;
