//! # Entity-Component Store
//!
//! Sparse-set storage with archetype queries and a phase-ordered system
//! scheduler.
//!
//! ## Module Overview
//!
//! - [`entity`] — Generational handles and stable ids
//! - [`component`] — Type identity, bundles and sparse-set storage
//! - [`registry`] — Component type ids and savegame registration
//! - [`archetype`] — Query descriptors and set intersection
//! - [`environment`] — The store: entities, components, queries, ticks
//! - [`entity_ref`] — Per-entity read and write views
//! - [`system`] — System trait, phases and the scheduler
//! - [`listener`] — Synchronous structural change notifications
//! - [`builder`] — Explicit environment setup

pub mod archetype;
pub mod builder;
pub mod component;
pub mod entity;
pub mod entity_ref;
pub mod environment;
pub mod listener;
pub(crate) mod registry;
pub mod system;

pub use archetype::Archetype;
pub use builder::{EnvironmentBuilder, EnvironmentConfig};
pub use component::{Bundle, Component, ComponentSet, ComponentType};
pub use entity::{Entity, EntityId};
pub use entity_ref::{EntityMut, EntityRef};
pub use environment::Environment;
pub use listener::{ComponentEvent, EntityEvent, EnvironmentListener, ListenerHandle};
#[cfg(feature = "diagnostics")]
pub use system::SystemTiming;
pub use system::{Phase, System, SystemInfo};
