//! # Component Registry
//!
//! Assigns every component type a small, dense [`ComponentTypeId`] that
//! indexes the environment's sparse sets, and records how (and whether) the
//! type is written to savegames.
//!
//! Types are registered explicitly through the
//! [`EnvironmentBuilder`](super::EnvironmentBuilder): `persistent::<T>()` for
//! types that go into savegames and `transient::<T>()` for caches and derived
//! data. A type that shows up without registration gets an id on first use and
//! is treated as transient.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::component::{BoxedComponent, Component, ComponentType};
use crate::error::{ConfigurationError, Result};
use crate::math::Transform;

/// Dense index of a component type within one environment.
pub(crate) type ComponentTypeId = usize;

type SerializeFn = fn(&dyn Any) -> Option<serde_json::Result<serde_json::Value>>;
type DeserializeFn = fn(serde_json::Value) -> serde_json::Result<BoxedComponent>;

/// How a component type is treated by savegames.
pub(crate) enum Persistence {
    /// Registered as transient, or never registered at all.
    Transient { explicit: bool },
    Persistent {
        tag: String,
        serialize: SerializeFn,
        deserialize: DeserializeFn,
    },
}

pub(crate) struct ComponentInfo {
    pub ty: ComponentType,
    pub persistence: Persistence,
}

pub(crate) struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_tag: HashMap<String, ComponentTypeId>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            infos: Vec::new(),
            by_type: HashMap::new(),
            by_tag: HashMap::new(),
        }
    }

    /// A registry that already knows the spatial [`Transform`] as persistent.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.set_persistent::<Transform>("Transform".to_string());
        registry
    }

    pub fn id_of(&self, type_id: TypeId) -> Option<ComponentTypeId> {
        self.by_type.get(&type_id).copied()
    }

    /// Look up the id for `ty`, assigning a fresh transient one if needed.
    pub fn ensure(&mut self, ty: ComponentType) -> ComponentTypeId {
        if let Some(id) = self.by_type.get(&ty.type_id()) {
            return *id;
        }
        let id = self.infos.len();
        self.infos.push(ComponentInfo {
            ty,
            persistence: Persistence::Transient { explicit: false },
        });
        self.by_type.insert(ty.type_id(), id);
        id
    }

    pub fn info(&self, id: ComponentTypeId) -> &ComponentInfo {
        &self.infos[id]
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn by_tag(&self, tag: &str) -> Option<(ComponentTypeId, &ComponentInfo)> {
        let id = *self.by_tag.get(tag)?;
        Some((id, &self.infos[id]))
    }

    /// Register `T` for savegames under its short type name.
    pub fn register_persistent<T>(&mut self) -> Result<ComponentTypeId>
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let tag = ComponentType::of::<T>().name().to_string();
        self.register_persistent_as::<T>(tag)
    }

    /// Register `T` for savegames under an explicit tag.
    pub fn register_persistent_as<T>(&mut self, tag: impl Into<String>) -> Result<ComponentTypeId>
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let tag = tag.into();
        let ty = ComponentType::of::<T>();
        if let Some(&existing) = self.by_tag.get(&tag) {
            let existing = self.infos[existing].ty;
            if existing != ty {
                return Err(ConfigurationError::ComponentTagConflict {
                    tag,
                    existing: existing.name(),
                    requested: ty.name(),
                }
                .into());
            }
        }

        Ok(self.set_persistent::<T>(tag))
    }

    fn set_persistent<T>(&mut self, tag: String) -> ComponentTypeId
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let id = self.ensure(ComponentType::of::<T>());
        if let Persistence::Persistent { tag: old, .. } = &self.infos[id].persistence {
            self.by_tag.remove(old);
        }
        self.infos[id].persistence = Persistence::Persistent {
            tag: tag.clone(),
            serialize: |any| any.downcast_ref::<T>().map(serde_json::to_value),
            deserialize: |json| {
                let value: T = serde_json::from_value(json)?;
                Ok(Box::new(value))
            },
        };
        self.by_tag.insert(tag, id);
        id
    }

    /// Mark `T` as never persisted.
    pub fn register_transient<T: Component>(&mut self) -> ComponentTypeId {
        let id = self.ensure(ComponentType::of::<T>());
        if let Persistence::Persistent { tag, .. } = &self.infos[id].persistence {
            self.by_tag.remove(tag);
        }
        self.infos[id].persistence = Persistence::Transient { explicit: true };
        id
    }
}
