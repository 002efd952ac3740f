//! # Errors
//!
//! Every fallible operation in hjarta returns [`Result`], whose error type is
//! the crate-wide [`Error`]. `Error` only aggregates four focused categories:
//!
//! | Category                | Raised by                                              |
//! |-------------------------|--------------------------------------------------------|
//! | [`ConfigurationError`]  | duplicate components or scenes, empty archetypes, id collisions |
//! | [`StateError`]          | spatial accessors, dead entities, unknown systems/scenes |
//! | [`QueryError`]          | forced singleton fetches with zero or many matches     |
//! | [`PersistenceError`]    | missing, unreadable or incompatible savegames          |
//!
//! Nothing is retried or swallowed internally. Callers that expect absence use
//! the `try_` variants (`try_fetch_singleton`, `savegame_file_exists`, ...),
//! which return `Option`/`bool` instead.
//!
//! ```ignore
//! match env.fetch_singleton(&PLAYER) {
//!     Ok(player) => { /* ... */ }
//!     Err(Error::Query(QueryError::AmbiguousMatch { count, .. })) => {
//!         log::warn!("{count} players found");
//!     }
//!     Err(e) => return Err(e),
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::ecs::{Entity, EntityId};

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Invalid setup: something was composed in a way the store cannot accept.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("component already present: {component}")]
    DuplicateComponent { component: &'static str },

    #[error("archetype requires at least one component type")]
    EmptyArchetype,

    #[error("entity id {id} is already in use")]
    DuplicateEntityId { id: EntityId },

    #[error("savegame tag '{tag}' is registered for both {existing} and {requested}")]
    ComponentTagConflict {
        tag: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("scene already added: {scene}")]
    DuplicateScene { scene: &'static str },
}

/// The operation is valid in general but not in the current state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("entity has no Transform")]
    MissingSpatialComponent { entity: Entity },

    #[error("entity {entity} is not alive")]
    EntityNotAlive { entity: Entity },

    #[error("system {system} is not registered")]
    SystemNotRegistered { system: &'static str },

    #[error("cannot remove active scene {scene}")]
    ActiveSceneRemoval { scene: &'static str },

    #[error("scene doesn't exist: {scene}")]
    UnknownScene { scene: &'static str },

    #[error("scene {scene} is still being prepared")]
    ScenePreparing { scene: &'static str },

    #[error("environment update is already in progress")]
    UpdateInProgress,
}

/// A forced query could not produce exactly one result.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no entity matches {archetype}")]
    NoMatch { archetype: String },

    #[error("{count} entities match {archetype}, expected exactly one")]
    AmbiguousMatch { archetype: String, count: usize },
}

/// Savegame I/O and format failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("savegame '{}' does not exist", path.display())]
    MissingSavegame { path: PathBuf },

    #[error("cannot access savegame '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("savegame '{}' is corrupt", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("savegame format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("savegame contains unknown component type '{tag}'")]
    UnknownComponent { tag: String },

    #[error("invalid payload for component '{tag}'")]
    InvalidPayload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot serialize component '{tag}'")]
    Serialize {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid savegame name '{name}'")]
    InvalidSlotName { name: String },

    #[error("background preparation of '{name}' did not complete")]
    PreparationFailed { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_wraps_detail_message() {
        let err: Error = ConfigurationError::DuplicateComponent {
            component: "PhysicsComponent",
        }
        .into();
        assert_eq!(err.to_string(), "component already present: PhysicsComponent");
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn persistence_errors_keep_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = PersistenceError::Io {
            path: PathBuf::from("slot1"),
            source: io,
        };
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "cannot access savegame 'slot1'");
    }
}
