//! # Archetype — Query Descriptors
//!
//! An archetype names the component types an entity must hold to match a
//! query, plus two optional constraints:
//!
//! - **spatial**: the entity must also have a [`Transform`], so that
//!   `position()`/`bounds()` are guaranteed to succeed on every match.
//! - **singleton**: the caller expects at most one match. `fetch_all` still
//!   returns every match but logs a warning when there is more than one.
//!
//! Archetypes are immutable values. Build them once and reuse them:
//!
//! ```ignore
//! let falling = Archetype::spatial::<(Gravity, Velocity)>();
//! for entity in env.fetch_all(&falling) {
//!     env.entity_mut(entity)?.move_by(Vec2::new(0.0, 1.0))?;
//! }
//! ```
//!
//! ## Matching
//!
//! Every component type has a sparse set whose dense entity list is exactly
//! the set of entities holding that type. Matching intersects those lists:
//! walk the smallest one and keep the entities the other sets contain.
//!
//! ```text
//! Health:    [e1, e4, e7, e9]
//! Velocity:  [e4, e9]          ← smallest, walked in order
//! Transform: [e1, e4, e5, e9]
//!
//! result:    [e4, e9]
//! ```

use std::fmt;

use super::component::{ComponentSet, ComponentType, SparseSet};
use super::entity::Entity;
use crate::error::{ConfigurationError, Result};
use crate::math::Transform;

/// An immutable query descriptor. Two archetypes are equal iff their required
/// type sets and flags are equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Archetype {
    /// Sorted and deduplicated.
    types: Vec<ComponentType>,
    spatial: bool,
    singleton: bool,
}

impl Archetype {
    /// Entities holding every component in `S`.
    pub fn of<S: ComponentSet>() -> Self {
        Self::new(S::component_types(), false)
    }

    /// Entities holding every component in `S` and a [`Transform`].
    pub fn spatial<S: ComponentSet>() -> Self {
        Self::new(S::component_types(), true)
    }

    /// Build from a runtime list of types. Fails on an empty list.
    pub fn try_from_types(types: impl IntoIterator<Item = ComponentType>) -> Result<Self> {
        let types: Vec<_> = types.into_iter().collect();
        if types.is_empty() {
            return Err(ConfigurationError::EmptyArchetype.into());
        }
        Ok(Self::new(types, false))
    }

    fn new(mut types: Vec<ComponentType>, spatial: bool) -> Self {
        types.sort();
        types.dedup();
        Self {
            types,
            spatial,
            singleton: false,
        }
    }

    /// Mark the archetype as expected to match at most one entity.
    pub fn as_singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    /// Add the spatial requirement.
    pub fn with_spatial(mut self) -> Self {
        self.spatial = true;
        self
    }

    pub fn is_spatial(&self) -> bool {
        self.spatial
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// The declared component types, without the implicit spatial one.
    pub fn component_types(&self) -> &[ComponentType] {
        &self.types
    }

    /// Every type a matching entity must hold.
    pub(crate) fn required_types(&self) -> Vec<ComponentType> {
        let mut types = self.types.clone();
        let transform = ComponentType::of::<Transform>();
        if self.spatial && !types.contains(&transform) {
            types.push(transform);
        }
        types
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Archetype[")?;
        for (i, ty) in self.types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str("]")?;
        if self.spatial {
            f.write_str(" +spatial")?;
        }
        if self.singleton {
            f.write_str(" +singleton")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Intersect the given sets, walking the smallest. An empty slice matches
/// nothing.
pub(crate) fn intersect(mut sets: Vec<&SparseSet>) -> Vec<Entity> {
    sets.sort_by_key(|set| set.len());
    let Some((smallest, rest)) = sets.split_first() else {
        return Vec::new();
    };
    smallest
        .entities()
        .iter()
        .copied()
        .filter(|&entity| rest.iter().all(|set| set.contains(entity)))
        .collect()
}
