//! # Environment — The Entity and Component Store
//!
//! The [`Environment`] owns everything that makes up a running simulation:
//!
//! - **Entities**, allocated as generational [`Entity`] handles. Each live
//!   entity has a record with its optional stable [`EntityId`], optional name
//!   and the list of component types it holds.
//! - **Components**, one [`SparseSet`] per component type, indexed by the
//!   registry's [`ComponentTypeId`]. The sets double as the query index; there
//!   is no second structure to keep in sync.
//! - **Systems**, in the scheduler, run once per [`update`](Environment::update).
//! - **Listeners**, notified synchronously on structural change.
//!
//! ## Quick Start
//!
//! ```ignore
//! use hjarta::prelude::*;
//!
//! let mut env = Environment::builder()
//!     .persistent::<Health>()
//!     .system(movement_system)
//!     .build()?;
//!
//! let player = env.add_entity((Health(100), Transform::at(0.0, 0.0, 16.0, 16.0)))?;
//! env.entity_mut(player)?.set_name("Player");
//!
//! env.update()?;
//! ```
//!
//! ## Mutation While Iterating
//!
//! [`fetch_all`](Environment::fetch_all) returns a `Vec<Entity>` snapshot, so
//! a system can add and remove entities while walking its own results. Fresh
//! queries always see the current state.
//!
//! An entity removed during a tick leaves every query immediately, but stays
//! readable through [`entity`](Environment::entity) and
//! [`get`](Environment::get) until the next tick starts. It can no longer be
//! mutated.

use std::any::{Any, TypeId};
use std::collections::HashMap;
#[cfg(feature = "diagnostics")]
use std::time::Instant;

use super::archetype::{Archetype, intersect};
use super::builder::{EnvironmentBuilder, EnvironmentConfig};
use super::component::{BoxedComponent, Bundle, Component, ComponentType, SparseSet};
use super::entity::{Entity, EntityAllocator, EntityId};
use super::entity_ref::{EntityMut, EntityRef};
use super::listener::{
    ComponentEvent, EntityEvent, EnvironmentListener, ListenerHandle, Listeners,
};
use super::registry::{ComponentRegistry, ComponentTypeId};
#[cfg(feature = "diagnostics")]
use super::system::SystemTiming;
use super::system::{Phase, Scheduler, System, SystemInfo};
use crate::error::{ConfigurationError, QueryError, Result, StateError};
use crate::prepare::Preparation;
use crate::savegame::SaveGame;
use crate::time::Time;

/// Bookkeeping for one live entity.
pub(crate) struct EntityRecord {
    pub entity: Entity,
    pub id: Option<EntityId>,
    pub name: Option<String>,
    /// Component types in the order they were attached.
    pub components: Vec<ComponentTypeId>,
}

/// An entity removed during the current tick, kept readable until the next.
pub(crate) struct RetiredEntity {
    pub id: Option<EntityId>,
    pub name: Option<String>,
    pub components: Vec<(ComponentType, BoxedComponent)>,
}

/// The entity and component store with its systems and listeners.
pub struct Environment {
    pub(crate) config: EnvironmentConfig,
    allocator: EntityAllocator,
    /// Indexed by entity slot.
    records: Vec<Option<EntityRecord>>,
    pub(crate) registry: ComponentRegistry,
    /// Indexed by `ComponentTypeId`, always as long as the registry.
    storages: Vec<SparseSet>,
    ids: HashMap<EntityId, Entity>,
    next_id: u32,
    retired: HashMap<Entity, RetiredEntity>,
    listeners: Listeners,
    scheduler: Scheduler,
    time: Time,
    pub(crate) pending_load: Option<Preparation<Result<SaveGame>>>,
}

impl Environment {
    /// An empty environment with default configuration.
    pub fn new() -> Self {
        Self::from_parts(
            EnvironmentConfig::default(),
            ComponentRegistry::with_builtins(),
            Scheduler::new(),
            Listeners::new(),
        )
    }

    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    pub(crate) fn from_parts(
        config: EnvironmentConfig,
        registry: ComponentRegistry,
        scheduler: Scheduler,
        listeners: Listeners,
    ) -> Self {
        let storages = (0..registry.len()).map(|_| SparseSet::new()).collect();
        Self {
            config,
            allocator: EntityAllocator::new(),
            records: Vec::new(),
            registry,
            storages,
            ids: HashMap::new(),
            next_id: 0,
            retired: HashMap::new(),
            listeners,
            scheduler,
            time: Time::new(),
            pending_load: None,
        }
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    // ── Entities ─────────────────────────────────────────────────────────

    /// Create an entity holding every component in `bundle`.
    ///
    /// Fails without creating anything if the bundle holds the same type
    /// twice.
    pub fn add_entity<B: Bundle>(&mut self, bundle: B) -> Result<Entity> {
        self.spawn_with(None, None, bundle.into_components())
    }

    /// Like [`add_entity`](Self::add_entity), with a stable id.
    pub fn add_entity_with_id<B: Bundle>(&mut self, id: EntityId, bundle: B) -> Result<Entity> {
        self.spawn_with(Some(id), None, bundle.into_components())
    }

    /// Create an entity without components.
    pub fn spawn_empty(&mut self) -> Entity {
        let entity = self.allocate(None, None);
        self.notify_entity_added(entity);
        entity
    }

    pub(crate) fn spawn_with(
        &mut self,
        id: Option<EntityId>,
        name: Option<String>,
        components: Vec<(ComponentType, BoxedComponent)>,
    ) -> Result<Entity> {
        for (i, (ty, _)) in components.iter().enumerate() {
            if components[..i].iter().any(|(other, _)| other == ty) {
                return Err(ConfigurationError::DuplicateComponent {
                    component: ty.name(),
                }
                .into());
            }
        }
        if let Some(id) = id {
            self.check_id_free(id, None)?;
        }

        let entity = self.allocate(id, name);
        for (ty, value) in components {
            let type_id = self.storage_id(ty);
            self.storages[type_id].insert(entity, value);
            if let Some(record) = self.record_mut(entity) {
                record.components.push(type_id);
            }
        }
        self.notify_entity_added(entity);
        Ok(entity)
    }

    fn allocate(&mut self, id: Option<EntityId>, name: Option<String>) -> Entity {
        let entity = self.allocator.allocate();
        let slot = entity.index as usize;
        if self.records.len() <= slot {
            self.records.resize_with(slot + 1, || None);
        }
        self.records[slot] = Some(EntityRecord {
            entity,
            id,
            name,
            components: Vec::new(),
        });
        if let Some(id) = id {
            self.ids.insert(id, entity);
            self.next_id = self.next_id.max(id.0.saturating_add(1));
        }
        entity
    }

    fn notify_entity_added(&mut self, entity: Entity) {
        let id = self.record(entity).and_then(|r| r.id);
        self.listeners.entity_added(&EntityEvent { entity, id });
    }

    /// Remove an entity and all its components. Returns `false` if it was not
    /// alive.
    pub fn remove_entity(&mut self, entity: Entity) -> bool {
        if !self.allocator.is_alive(entity) {
            return false;
        }
        let Some(record) = self.records[entity.index as usize].take() else {
            return false;
        };
        let components = record
            .components
            .iter()
            .filter_map(|&type_id| {
                let value = self.storages[type_id].remove(entity)?;
                Some((self.registry.info(type_id).ty, value))
            })
            .collect();
        if let Some(id) = record.id {
            self.ids.remove(&id);
        }
        self.allocator.deallocate(entity);
        self.retired.insert(
            entity,
            RetiredEntity {
                id: record.id,
                name: record.name,
                components,
            },
        );
        self.listeners.entity_removed(&EntityEvent {
            entity,
            id: record.id,
        });
        true
    }

    pub fn remove_all_entities(&mut self) {
        for entity in self.entities() {
            self.remove_entity(entity);
        }
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// All live entities, in slot order.
    pub fn entities(&self) -> Vec<Entity> {
        self.records.iter().flatten().map(|r| r.entity).collect()
    }

    /// Read access to a live entity, or to one removed during this tick.
    pub fn entity(&self, entity: Entity) -> Option<EntityRef<'_>> {
        (self.allocator.is_alive(entity) || self.retired.contains_key(&entity))
            .then(|| EntityRef::new(self, entity))
    }

    /// Write access to a live entity.
    pub fn entity_mut(&mut self, entity: Entity) -> Result<EntityMut<'_>> {
        if !self.allocator.is_alive(entity) {
            return Err(StateError::EntityNotAlive { entity }.into());
        }
        Ok(EntityMut::new(self, entity))
    }

    /// Resolve a stable id to the live entity carrying it.
    pub fn fetch_by_id(&self, id: EntityId) -> Option<Entity> {
        self.ids.get(&id).copied()
    }

    // ── Components ───────────────────────────────────────────────────────

    /// The entity's `T`, if it has one. Also works for entities removed
    /// during this tick.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.component_any(entity, TypeId::of::<T>())?.downcast_ref()
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let type_id = self.registry.id_of(TypeId::of::<T>())?;
        self.storages[type_id].get_mut(entity)?.downcast_mut()
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.component_any(entity, TypeId::of::<T>()).is_some()
    }

    pub(crate) fn component_any(
        &self,
        entity: Entity,
        type_id: TypeId,
    ) -> Option<&(dyn Any + Send + Sync)> {
        if let Some(retired) = self.retired.get(&entity) {
            return retired
                .components
                .iter()
                .find(|(ty, _)| ty.type_id() == type_id)
                .map(|(_, value)| &**value);
        }
        let id = self.registry.id_of(type_id)?;
        self.storages[id].get(entity)
    }

    pub(crate) fn component_types_of(&self, entity: Entity) -> Vec<ComponentType> {
        if let Some(retired) = self.retired.get(&entity) {
            return retired.components.iter().map(|(ty, _)| *ty).collect();
        }
        self.record(entity)
            .map(|r| r.components.iter().map(|&id| self.registry.info(id).ty).collect())
            .unwrap_or_default()
    }

    pub(crate) fn component_count_of(&self, entity: Entity) -> usize {
        if let Some(retired) = self.retired.get(&entity) {
            return retired.components.len();
        }
        self.record(entity).map_or(0, |r| r.components.len())
    }

    pub(crate) fn id_of(&self, entity: Entity) -> Option<EntityId> {
        match self.retired.get(&entity) {
            Some(retired) => retired.id,
            None => self.record(entity)?.id,
        }
    }

    pub(crate) fn name_of(&self, entity: Entity) -> Option<&str> {
        match self.retired.get(&entity) {
            Some(retired) => retired.name.as_deref(),
            None => self.record(entity)?.name.as_deref(),
        }
    }

    /// Attach `value`, replacing any existing one of the same type. Notifies
    /// listeners only when the type is new. `entity` must be alive.
    pub(crate) fn attach(
        &mut self,
        entity: Entity,
        ty: ComponentType,
        value: BoxedComponent,
    ) -> Option<BoxedComponent> {
        let type_id = self.storage_id(ty);
        let previous = self.storages[type_id].insert(entity, value);
        if previous.is_none() {
            if let Some(record) = self.record_mut(entity) {
                record.components.push(type_id);
            }
            self.listeners
                .component_added(&ComponentEvent { entity, component: ty });
        }
        previous
    }

    /// Detach the entity's component of type `ty`, notifying listeners if
    /// there was one.
    pub(crate) fn detach(&mut self, entity: Entity, ty: ComponentType) -> Option<BoxedComponent> {
        let type_id = self.registry.id_of(ty.type_id())?;
        let value = self.storages[type_id].remove(entity)?;
        if let Some(record) = self.record_mut(entity) {
            record.components.retain(|&id| id != type_id);
        }
        self.listeners
            .component_removed(&ComponentEvent { entity, component: ty });
        Some(value)
    }

    pub(crate) fn set_name(&mut self, entity: Entity, name: Option<String>) {
        if let Some(record) = self.record_mut(entity) {
            record.name = name;
        }
    }

    /// Give `entity` a stable id. Fails if another entity already has it.
    pub(crate) fn assign_id(&mut self, entity: Entity, id: EntityId) -> Result<()> {
        self.check_id_free(id, Some(entity))?;
        let Some(record) = self.record_mut(entity) else {
            return Err(StateError::EntityNotAlive { entity }.into());
        };
        let previous = record.id.replace(id);
        if let Some(old) = previous {
            self.ids.remove(&old);
        }
        self.ids.insert(id, entity);
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        Ok(())
    }

    /// The entity's id, assigning the next free one if it has none. The
    /// search wraps around past `u32::MAX`.
    pub(crate) fn ensure_id(&mut self, entity: Entity) -> Option<EntityId> {
        if let Some(id) = self.record(entity)?.id {
            return Some(id);
        }
        let start = self.next_id;
        let mut candidate = start;
        while self.ids.contains_key(&EntityId(candidate)) {
            candidate = candidate.wrapping_add(1);
            if candidate == start {
                log::warn!("no free entity id left for {entity}");
                return None;
            }
        }
        let id = EntityId(candidate);
        self.assign_id(entity, id).ok()?;
        self.next_id = candidate.wrapping_add(1);
        Some(id)
    }

    fn check_id_free(&self, id: EntityId, owner: Option<Entity>) -> Result<()> {
        match self.ids.get(&id) {
            Some(&holder) if Some(holder) != owner => {
                Err(ConfigurationError::DuplicateEntityId { id }.into())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn record(&self, entity: Entity) -> Option<&EntityRecord> {
        self.records
            .get(entity.index as usize)?
            .as_ref()
            .filter(|r| r.entity == entity)
    }

    fn record_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        self.records
            .get_mut(entity.index as usize)?
            .as_mut()
            .filter(|r| r.entity == entity)
    }

    pub(crate) fn storage(&self, type_id: ComponentTypeId) -> &SparseSet {
        &self.storages[type_id]
    }

    /// Registry id for `ty`, growing the storages for types seen for the
    /// first time.
    fn storage_id(&mut self, ty: ComponentType) -> ComponentTypeId {
        let id = self.registry.ensure(ty);
        while self.storages.len() <= id {
            self.storages.push(SparseSet::new());
        }
        id
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Every live entity matching `archetype`, as a snapshot.
    pub fn fetch_all(&self, archetype: &Archetype) -> Vec<Entity> {
        let matches = self.matching(archetype);
        if archetype.is_singleton() && matches.len() > 1 {
            log::warn!("{} entities match singleton {archetype}", matches.len());
        }
        matches
    }

    pub fn try_fetch_singleton(&self, archetype: &Archetype) -> Option<Entity> {
        self.fetch_singleton(archetype).ok()
    }

    /// The only entity matching `archetype`. Fails on zero or several matches.
    pub fn fetch_singleton(&self, archetype: &Archetype) -> Result<Entity> {
        match self.matching(archetype).as_slice() {
            [entity] => Ok(*entity),
            [] => Err(QueryError::NoMatch {
                archetype: archetype.to_string(),
            }
            .into()),
            matches => Err(QueryError::AmbiguousMatch {
                archetype: archetype.to_string(),
                count: matches.len(),
            }
            .into()),
        }
    }

    fn matching(&self, archetype: &Archetype) -> Vec<Entity> {
        let mut sets = Vec::new();
        for ty in archetype.required_types() {
            // A type nobody ever attached matches nothing.
            let Some(id) = self.registry.id_of(ty.type_id()) else {
                return Vec::new();
            };
            sets.push(&self.storages[id]);
        }
        intersect(sets)
    }

    pub fn try_fetch_singleton_component<T: Component>(&self) -> Option<&T> {
        self.fetch_singleton_component().ok()
    }

    /// The `T` of the only entity holding one.
    pub fn fetch_singleton_component<T: Component>(&self) -> Result<&T> {
        let entity = self.fetch_singleton(&Archetype::of::<(T,)>())?;
        self.get(entity).ok_or_else(|| {
            QueryError::NoMatch {
                archetype: ComponentType::of::<T>().to_string(),
            }
            .into()
        })
    }

    pub fn try_fetch_singleton_component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.fetch_singleton_component_mut().ok()
    }

    pub fn fetch_singleton_component_mut<T: Component>(&mut self) -> Result<&mut T> {
        let entity = self.fetch_singleton(&Archetype::of::<(T,)>())?;
        self.get_mut(entity).ok_or_else(|| {
            QueryError::NoMatch {
                archetype: ComponentType::of::<T>().to_string(),
            }
            .into()
        })
    }

    // ── Listeners ────────────────────────────────────────────────────────

    pub fn register_listener<L: EnvironmentListener + 'static>(
        &mut self,
        listener: L,
    ) -> ListenerHandle {
        self.listeners.register(None, Box::new(listener))
    }

    /// Listen to one entity only. The listener is dropped with the entity.
    pub fn register_entity_listener<L: EnvironmentListener + 'static>(
        &mut self,
        entity: Entity,
        listener: L,
    ) -> Result<ListenerHandle> {
        if !self.allocator.is_alive(entity) {
            return Err(StateError::EntityNotAlive { entity }.into());
        }
        Ok(self.listeners.register(Some(entity), Box::new(listener)))
    }

    pub fn remove_listener(&mut self, handle: ListenerHandle) -> bool {
        self.listeners.remove(handle)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ── Systems ──────────────────────────────────────────────────────────

    /// Register `system` in its own phase, replacing any system of the same
    /// type. Takes effect before the next tick when called during one.
    pub fn add_system<S: System>(&mut self, system: S) -> &mut Self {
        self.scheduler.add(system, None);
        self
    }

    /// Like [`add_system`](Self::add_system), overriding the phase.
    pub fn add_system_in<S: System>(&mut self, phase: Phase, system: S) -> &mut Self {
        self.scheduler.add(system, Some(phase));
        self
    }

    /// Returns `true` if a system of type `S` was registered.
    pub fn remove_system<S: System>(&mut self) -> bool {
        self.scheduler.remove::<S>()
    }

    /// Flip between enabled and disabled.
    pub fn toggle_system<S: System>(&mut self) -> Result<()> {
        self.scheduler.set_enabled::<S>(None)
    }

    pub fn set_system_enabled<S: System>(&mut self, enabled: bool) -> Result<()> {
        self.scheduler.set_enabled::<S>(Some(enabled))
    }

    pub fn is_system_present<S: System>(&self) -> bool {
        self.scheduler.is_present(TypeId::of::<S>())
    }

    /// Registered systems in execution order.
    pub fn systems(&self) -> Vec<SystemInfo> {
        self.scheduler.infos()
    }

    pub fn system_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Per-system durations of the last tick.
    #[cfg(feature = "diagnostics")]
    pub fn system_timings(&self) -> &[SystemTiming] {
        self.scheduler.timings()
    }

    /// Run one tick: every enabled system once, in phase order.
    ///
    /// Entities removed during the previous tick are released and a finished
    /// background load is applied before any system runs.
    pub fn update(&mut self) -> Result<()> {
        if self.scheduler.is_running() {
            return Err(StateError::UpdateInProgress.into());
        }
        self.retired.clear();
        self.apply_background_load()?;
        self.time.advance();

        self.scheduler.begin_pass();
        let result = self.run_systems();
        self.scheduler.end_pass();
        result
    }

    fn run_systems(&mut self) -> Result<()> {
        for index in 0..self.scheduler.len() {
            let Some((mut system, name)) = self.scheduler.checkout(index) else {
                continue;
            };
            #[cfg(feature = "diagnostics")]
            {
                let start = Instant::now();
                let result = system.update(self);
                self.scheduler.checkin(index, system, start.elapsed());
                result.inspect_err(|e| log::debug!("system {name} failed: {e}"))?;
            }
            #[cfg(not(feature = "diagnostics"))]
            {
                let result = system.update(self);
                self.scheduler.checkin(index, system);
                result.inspect_err(|e| log::debug!("system {name} failed: {e}"))?;
            }
        }
        Ok(())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::math::{Transform, Vec2};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    struct A(u32);
    #[derive(Debug, Clone, PartialEq)]
    struct B;
    struct Marker;

    #[test]
    fn add_entity_with_components() {
        let mut env = Environment::new();
        let e = env.add_entity((A(1), B)).unwrap();
        assert_eq!(env.get::<A>(e), Some(&A(1)));
        assert!(env.has::<B>(e));
        assert!(!env.has::<Marker>(e));
        assert_eq!(env.entity_count(), 1);
    }

    #[test]
    fn duplicate_type_in_bundle_is_rejected() {
        let mut env = Environment::new();
        let err = env.add_entity((A(1), A(2))).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::DuplicateComponent { component: "A" })
        ));
        assert_eq!(env.entity_count(), 0);
    }

    #[test]
    fn fetch_all_requires_every_type() {
        let mut env = Environment::new();
        let both = env.add_entity((A(1), B)).unwrap();
        let _only_a = env.add_entity((A(2),)).unwrap();

        assert_eq!(env.fetch_all(&Archetype::of::<(A, B)>()), vec![both]);
        assert_eq!(env.fetch_all(&Archetype::of::<(A,)>()).len(), 2);
        assert!(env.fetch_all(&Archetype::of::<(Marker,)>()).is_empty());
    }

    #[test]
    fn spatial_archetype_requires_transform() {
        let mut env = Environment::new();
        let placed = env.add_entity((A(1), Transform::default())).unwrap();
        env.add_entity((A(2),)).unwrap();
        assert_eq!(env.fetch_all(&Archetype::spatial::<(A,)>()), vec![placed]);
    }

    #[test]
    fn singleton_fetches() {
        let mut env = Environment::new();
        let archetype = Archetype::of::<(Marker,)>().as_singleton();

        assert!(env.try_fetch_singleton(&archetype).is_none());
        let err = env.fetch_singleton(&archetype).unwrap_err();
        assert!(matches!(err, Error::Query(QueryError::NoMatch { .. })));

        let only = env.add_entity((Marker,)).unwrap();
        assert_eq!(env.try_fetch_singleton(&archetype), Some(only));

        env.add_entity((Marker,)).unwrap();
        assert!(env.try_fetch_singleton(&archetype).is_none());
        let err = env.fetch_singleton(&archetype).unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError::AmbiguousMatch { count: 2, .. })
        ));
        // Still returns every match, with a warning.
        assert_eq!(env.fetch_all(&archetype).len(), 2);
    }

    #[test]
    fn singleton_component() {
        let mut env = Environment::new();
        assert!(env.try_fetch_singleton_component::<A>().is_none());
        env.add_entity((A(3),)).unwrap();
        assert_eq!(env.fetch_singleton_component::<A>().unwrap(), &A(3));
        env.fetch_singleton_component_mut::<A>().unwrap().0 = 4;
        assert_eq!(env.try_fetch_singleton_component::<A>(), Some(&A(4)));
    }

    #[test]
    fn snapshot_survives_mutation_during_iteration() {
        let mut env = Environment::new();
        for i in 0..5 {
            env.add_entity((A(i),)).unwrap();
        }
        let snapshot = env.fetch_all(&Archetype::of::<(A,)>());
        for &entity in &snapshot {
            env.remove_entity(entity);
            env.add_entity((A(100),)).unwrap();
        }
        assert_eq!(snapshot.len(), 5);
        assert_eq!(env.fetch_all(&Archetype::of::<(A,)>()).len(), 5);
        assert!(snapshot.iter().all(|&e| !env.is_alive(e)));
    }

    #[test]
    fn removed_entity_readable_until_next_tick() {
        let mut env = Environment::new();
        let e = env.add_entity((A(7),)).unwrap();
        assert!(env.remove_entity(e));
        assert!(!env.remove_entity(e));

        assert!(env.fetch_all(&Archetype::of::<(A,)>()).is_empty());
        assert_eq!(env.get::<A>(e), Some(&A(7)));
        assert!(env.entity(e).is_some());
        assert!(matches!(
            env.entity_mut(e),
            Err(Error::State(StateError::EntityNotAlive { .. }))
        ));

        env.update().unwrap();
        assert!(env.get::<A>(e).is_none());
        assert!(env.entity(e).is_none());
    }

    #[test]
    fn recycled_slot_does_not_leak_components() {
        let mut env = Environment::new();
        let old = env.add_entity((A(1),)).unwrap();
        env.remove_entity(old);
        let new = env.add_entity((B,)).unwrap();
        assert_eq!(new.index(), old.index());
        assert!(!env.has::<A>(new));
        assert_eq!(env.get::<A>(old), Some(&A(1)));
    }

    #[test]
    fn ids_resolve_and_collide() {
        let mut env = Environment::new();
        let e = env.add_entity_with_id(EntityId(42), (A(1),)).unwrap();
        assert_eq!(env.fetch_by_id(EntityId(42)), Some(e));

        let err = env.add_entity_with_id(EntityId(42), (B,)).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::DuplicateEntityId { .. })
        ));

        let other = env.spawn_empty();
        assert_eq!(env.ensure_id(other), Some(EntityId(43)));
        env.remove_entity(e);
        assert_eq!(env.fetch_by_id(EntityId(42)), None);
    }

    #[test]
    fn id_search_wraps_after_max() {
        let mut env = Environment::new();
        env.add_entity_with_id(EntityId(u32::MAX), (A(1),)).unwrap();
        let first = env.spawn_empty();
        let second = env.spawn_empty();

        assert_eq!(env.ensure_id(first), Some(EntityId(0)));
        assert_eq!(env.ensure_id(second), Some(EntityId(1)));
        assert!(env.fetch_by_id(EntityId(u32::MAX)).is_some());

        let mut saved = Environment::new();
        saved.add_entity_with_id(EntityId(u32::MAX), (A(1),)).unwrap();
        saved.spawn_empty();
        let snapshot = saved.snapshot().unwrap();
        let ids: Vec<_> = snapshot.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![EntityId(u32::MAX), EntityId(0)]);
    }

    #[test]
    fn remove_all_entities_clears_index() {
        let mut env = Environment::new();
        for i in 0..3 {
            env.add_entity((A(i), Transform::default())).unwrap();
        }
        env.remove_all_entities();
        assert_eq!(env.entity_count(), 0);
        assert!(env.entities().is_empty());
        assert!(env.fetch_all(&Archetype::spatial::<(A,)>()).is_empty());
    }

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl Log {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl EnvironmentListener for Log {
        fn component_added(&mut self, event: &ComponentEvent) {
            self.0.lock().unwrap().push(format!("+{}", event.component));
        }
        fn component_removed(&mut self, event: &ComponentEvent) {
            self.0.lock().unwrap().push(format!("-{}", event.component));
        }
        fn entity_added(&mut self, _event: &EntityEvent) {
            self.0.lock().unwrap().push("entity+".into());
        }
        fn entity_removed(&mut self, _event: &EntityEvent) {
            self.0.lock().unwrap().push("entity-".into());
        }
    }

    #[test]
    fn listeners_see_structural_changes() {
        let mut env = Environment::new();
        let log = Log::default();
        env.register_listener(log.clone());

        let e = env.add_entity((A(1),)).unwrap();
        env.entity_mut(e).unwrap().add(B).unwrap();
        env.entity_mut(e).unwrap().add_or_replace(A(2));
        env.entity_mut(e).unwrap().remove::<B>();
        env.entity_mut(e).unwrap().remove::<B>();
        env.remove_entity(e);

        assert_eq!(log.take(), vec!["entity+", "+B", "-B", "entity-"]);
    }

    #[test]
    fn entity_listener_removed_with_entity() {
        let mut env = Environment::new();
        let e = env.add_entity((A(1),)).unwrap();
        let other = env.add_entity((A(2),)).unwrap();
        let log = Log::default();
        env.register_entity_listener(e, log.clone()).unwrap();

        env.entity_mut(other).unwrap().add(B).unwrap();
        env.entity_mut(e).unwrap().add(B).unwrap();
        assert_eq!(log.take(), vec!["+B"]);

        env.remove_entity(e);
        assert_eq!(env.listener_count(), 0);
    }

    #[test]
    fn listener_handle_unregisters() {
        let mut env = Environment::new();
        let log = Log::default();
        let handle = env.register_listener(log.clone());
        assert!(env.remove_listener(handle));
        env.spawn_empty();
        assert!(log.take().is_empty());
    }

    // ── Scheduler integration ────────────────────────────────────────────

    struct Recorded(&'static str, Phase, Arc<Mutex<Vec<&'static str>>>);

    impl System for Recorded {
        fn update(&mut self, _env: &mut Environment) -> Result<()> {
            self.2.lock().unwrap().push(self.0);
            Ok(())
        }

        fn phase(&self) -> Phase {
            self.1
        }
    }

    struct Simulate(Arc<Mutex<Vec<&'static str>>>);
    struct Draw(Arc<Mutex<Vec<&'static str>>>);

    impl System for Simulate {
        fn update(&mut self, _env: &mut Environment) -> Result<()> {
            self.0.lock().unwrap().push("simulate");
            Ok(())
        }
    }

    impl System for Draw {
        fn update(&mut self, _env: &mut Environment) -> Result<()> {
            self.0.lock().unwrap().push("draw");
            Ok(())
        }

        fn phase(&self) -> Phase {
            Phase::PresentationWorld
        }
    }

    #[test]
    fn systems_run_in_phase_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut env = Environment::new();
        env.add_system(Draw(calls.clone()));
        env.add_system(Simulate(calls.clone()));

        env.update().unwrap();
        env.update().unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["simulate", "draw", "simulate", "draw"]
        );
        assert_eq!(env.time().ticks(), 2);
    }

    #[test]
    fn same_phase_runs_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut env = Environment::new();
        env.add_system(Recorded("first", Phase::Simulation, calls.clone()));
        env.add_system_in(Phase::Simulation, Draw(calls.clone()));
        env.add_system_in(Phase::SimulationBegin, Simulate(calls.clone()));

        env.update().unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["simulate", "first", "draw"]);
    }

    #[test]
    fn disabled_systems_are_skipped() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut env = Environment::new();
        env.add_system(Simulate(calls.clone()));
        env.add_system(Draw(calls.clone()));

        env.toggle_system::<Simulate>().unwrap();
        env.update().unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["draw"]);
        assert!(env.is_system_present::<Simulate>());
        assert!(!env.systems()[0].enabled);

        env.set_system_enabled::<Simulate>(true).unwrap();
        env.update().unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["draw", "simulate", "draw"]);
    }

    #[test]
    fn toggling_unregistered_system_fails() {
        let mut env = Environment::new();
        assert!(matches!(
            env.toggle_system::<Simulate>(),
            Err(Error::State(StateError::SystemNotRegistered { .. }))
        ));
    }

    #[test]
    fn system_added_mid_tick_runs_next_tick() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut env = Environment::new();
        let late = calls.clone();
        let mut added = false;
        env.add_system_in(Phase::Preparation, move |env: &mut Environment| -> Result<()> {
            if !added {
                env.add_system(Draw(late.clone()));
                added = true;
            }
            Ok(())
        });

        env.update().unwrap();
        assert!(calls.lock().unwrap().is_empty());
        assert!(env.is_system_present::<Draw>());
        env.update().unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["draw"]);
    }

    #[test]
    fn system_removed_mid_tick_is_skipped() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut env = Environment::new();
        env.add_system_in(Phase::Preparation, |env: &mut Environment| -> Result<()> {
            env.remove_system::<Draw>();
            Ok(())
        });
        env.add_system(Draw(calls.clone()));

        env.update().unwrap();
        assert!(calls.lock().unwrap().is_empty());
        assert!(!env.is_system_present::<Draw>());
        assert_eq!(env.system_count(), 1);
    }

    #[test]
    fn systems_mutate_entities() {
        let mut env = Environment::new();
        env.add_entity((Transform::at(0.0, 0.0, 2.0, 2.0), A(0))).unwrap();
        env.add_system(|env: &mut Environment| -> Result<()> {
            for entity in env.fetch_all(&Archetype::spatial::<(A,)>()) {
                env.entity_mut(entity)?.move_by(Vec2::new(1.0, 0.0))?;
            }
            Ok(())
        });

        env.update().unwrap();
        env.update().unwrap();
        let entity = env.fetch_singleton(&Archetype::of::<(A,)>()).unwrap();
        assert_eq!(
            env.entity(entity).unwrap().position().unwrap(),
            Vec2::new(2.0, 0.0)
        );
    }

    #[test]
    fn system_error_aborts_tick() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut env = Environment::new();
        env.add_system_in(Phase::Preparation, |env: &mut Environment| -> Result<()> {
            env.fetch_singleton(&Archetype::of::<(Marker,)>())?;
            Ok(())
        });
        env.add_system(Simulate(calls.clone()));

        assert!(matches!(env.update(), Err(Error::Query(_))));
        assert!(calls.lock().unwrap().is_empty());
        // The scheduler is usable again afterwards.
        env.add_entity((Marker,)).unwrap();
        env.update().unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["simulate"]);
    }

    #[test]
    fn nested_update_is_rejected() {
        let seen = Arc::new(Mutex::new(None));
        let inner = seen.clone();
        let mut env = Environment::new();
        env.add_system(move |env: &mut Environment| -> Result<()> {
            let nested = env.update();
            *inner.lock().unwrap() = Some(matches!(
                nested,
                Err(Error::State(StateError::UpdateInProgress))
            ));
            Ok(())
        });
        env.update().unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }

    #[cfg(feature = "diagnostics")]
    #[test]
    fn timings_recorded_per_system() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut env = Environment::new();
        env.add_system(Simulate(calls.clone()));
        env.add_system(Draw(calls));
        env.update().unwrap();
        let names: Vec<_> = env.system_timings().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Simulate", "Draw"]);
    }
}
