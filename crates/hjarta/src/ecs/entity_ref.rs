//! Entity views: [`EntityRef`] for reading, [`EntityMut`] for changing one
//! entity's components, name and id.
//!
//! ```ignore
//! env.entity_mut(player)?
//!     .add(Health(100))?
//!     .add_or_replace(Transform::at(0.0, 0.0, 16.0, 16.0))
//!     .set_name("Player");
//!
//! let player = env.entity(player).unwrap();
//! println!("{player} at {}", player.position()?);
//! ```
//!
//! The spatial accessors work on the entity's [`Transform`] and fail with
//! [`StateError::MissingSpatialComponent`] when it has none.

use std::fmt;

use super::component::{Component, ComponentType};
use super::entity::{Entity, EntityId};
use super::environment::Environment;
use crate::error::{ConfigurationError, Result, StateError};
use crate::math::{Bounds, Transform, Vec2};

/// Read-only view of a live entity, or of one removed during this tick.
#[derive(Clone, Copy)]
pub struct EntityRef<'a> {
    env: &'a Environment,
    entity: Entity,
}

impl<'a> EntityRef<'a> {
    pub(crate) fn new(env: &'a Environment, entity: Entity) -> Self {
        Self { env, entity }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// `false` once the entity has been removed.
    pub fn is_alive(&self) -> bool {
        self.env.is_alive(self.entity)
    }

    pub fn id(&self) -> Option<EntityId> {
        self.env.id_of(self.entity)
    }

    pub fn name(&self) -> Option<&'a str> {
        self.env.name_of(self.entity)
    }

    pub fn get<T: Component>(&self) -> Option<&'a T> {
        self.env.get(self.entity)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.env.has::<T>(self.entity)
    }

    pub fn component_count(&self) -> usize {
        self.env.component_count_of(self.entity)
    }

    /// Component types in the order they were attached.
    pub fn component_types(&self) -> Vec<ComponentType> {
        self.env.component_types_of(self.entity)
    }

    pub fn is_empty(&self) -> bool {
        self.component_count() == 0
    }

    pub fn bounds(&self) -> Result<Bounds> {
        self.get::<Transform>()
            .map(|t| t.bounds)
            .ok_or_else(|| missing_transform(self.entity))
    }

    /// Center of the entity's bounds.
    pub fn position(&self) -> Result<Vec2> {
        Ok(self.bounds()?.position())
    }

    /// Top-left corner of the entity's bounds.
    pub fn origin(&self) -> Result<Vec2> {
        Ok(self.bounds()?.origin())
    }
}

impl fmt::Display for EntityRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Entity[")?;
        if let Some(id) = self.id() {
            write!(f, "id='{id}', ")?;
        }
        if let Some(name) = self.name() {
            write!(f, "name='{name}', ")?;
        }
        match self.component_count() {
            0 => f.write_str("components=none]"),
            count => write!(f, "components={count}]"),
        }
    }
}

impl fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("entity", &self.entity)
            .field("components", &self.component_types())
            .finish()
    }
}

/// Mutable view of a live entity.
///
/// Holds the environment exclusively, so the entity cannot be removed while
/// the view exists.
pub struct EntityMut<'a> {
    env: &'a mut Environment,
    entity: Entity,
}

impl<'a> EntityMut<'a> {
    pub(crate) fn new(env: &'a mut Environment, entity: Entity) -> Self {
        Self { env, entity }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn as_readonly(&self) -> EntityRef<'_> {
        EntityRef::new(self.env, self.entity)
    }

    pub fn id(&self) -> Option<EntityId> {
        self.env.id_of(self.entity)
    }

    pub fn name(&self) -> Option<&str> {
        self.env.name_of(self.entity)
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.env.get(self.entity)
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.env.get_mut(self.entity)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.env.has::<T>(self.entity)
    }

    pub fn component_count(&self) -> usize {
        self.env.component_count_of(self.entity)
    }

    pub fn component_types(&self) -> Vec<ComponentType> {
        self.env.component_types_of(self.entity)
    }

    pub fn is_empty(&self) -> bool {
        self.component_count() == 0
    }

    /// Attach `component`. Fails if the entity already has one of this type.
    pub fn add<T: Component>(&mut self, component: T) -> Result<&mut Self> {
        let ty = ComponentType::of::<T>();
        if self.has::<T>() {
            return Err(ConfigurationError::DuplicateComponent {
                component: ty.name(),
            }
            .into());
        }
        self.env.attach(self.entity, ty, Box::new(component));
        Ok(self)
    }

    /// Attach `component`, silently replacing an existing one of this type.
    pub fn add_or_replace<T: Component>(&mut self, component: T) -> &mut Self {
        self.env
            .attach(self.entity, ComponentType::of::<T>(), Box::new(component));
        self
    }

    /// Attach `component` unless the entity already has one of this type.
    pub fn add_if_not_present<T: Component>(&mut self, component: T) -> &mut Self {
        if !self.has::<T>() {
            self.env
                .attach(self.entity, ComponentType::of::<T>(), Box::new(component));
        }
        self
    }

    /// Remove the entity's `T`. Returns `false` if there was none.
    pub fn remove<T: Component>(&mut self) -> bool {
        self.take::<T>().is_some()
    }

    /// Remove and return the entity's `T`.
    pub fn take<T: Component>(&mut self) -> Option<T> {
        let value = self.env.detach(self.entity, ComponentType::of::<T>())?;
        value.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.env.set_name(self.entity, Some(name.into()));
        self
    }

    pub fn clear_name(&mut self) -> &mut Self {
        self.env.set_name(self.entity, None);
        self
    }

    /// Give the entity a stable id. Fails if another entity holds it.
    pub fn assign_id(&mut self, id: EntityId) -> Result<&mut Self> {
        self.env.assign_id(self.entity, id)?;
        Ok(self)
    }

    pub fn bounds(&self) -> Result<Bounds> {
        self.as_readonly().bounds()
    }

    pub fn position(&self) -> Result<Vec2> {
        self.as_readonly().position()
    }

    pub fn origin(&self) -> Result<Vec2> {
        self.as_readonly().origin()
    }

    /// Add or replace the entity's [`Transform`].
    pub fn set_bounds(&mut self, bounds: Bounds) -> &mut Self {
        self.add_or_replace(Transform::new(bounds))
    }

    /// Center the entity's bounds on `position`.
    pub fn move_to(&mut self, position: Vec2) -> Result<&mut Self> {
        let transform = self.transform_mut()?;
        transform.bounds = transform.bounds.moved_to(position);
        Ok(self)
    }

    pub fn move_by(&mut self, delta: Vec2) -> Result<&mut Self> {
        let transform = self.transform_mut()?;
        transform.bounds = transform.bounds.moved_by(delta);
        Ok(self)
    }

    fn transform_mut(&mut self) -> Result<&mut Transform> {
        let entity = self.entity;
        self.get_mut::<Transform>()
            .ok_or_else(|| missing_transform(entity))
    }
}

impl fmt::Display for EntityMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_readonly(), f)
    }
}

impl fmt::Debug for EntityMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMut")
            .field("entity", &self.entity)
            .field("components", &self.component_types())
            .finish()
    }
}

fn missing_transform(entity: Entity) -> crate::error::Error {
    StateError::MissingSpatialComponent { entity }.into()
}
