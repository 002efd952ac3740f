//! # Hjarta — Entity Store and Simulation Core
//!
//! The heart of a 2D game: a sparse-set entity-component store, archetype
//! queries, a phase-ordered system scheduler, structural change listeners,
//! JSON savegames and scenes prepared on worker threads.
//!
//! Start with `use hjarta::prelude::*` and build an
//! [`Environment`](ecs::Environment), or hand several to [`Scenes`](scenes::Scenes).

pub mod ecs;
pub mod error;
pub mod math;
pub mod prelude;
pub mod prepare;
pub mod savegame;
pub mod scenes;
pub mod time;

pub use error::{Error, Result};
