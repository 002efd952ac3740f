//! # Listeners — Synchronous Structural Change Notifications
//!
//! An [`EnvironmentListener`] is called inline, on the simulation thread,
//! before the mutating call returns. Listeners are notified in registration
//! order. Keep callbacks short: they run inside `add`, `remove` and friends,
//! so anything slow stalls the tick.
//!
//! | Mutation                                  | Callback             |
//! |-------------------------------------------|----------------------|
//! | `add_entity`, `spawn_empty`, load         | `entity_added`       |
//! | `EntityMut::add`, new `add_or_replace`     | `component_added`    |
//! | `EntityMut::remove` of a present type     | `component_removed`  |
//! | `remove_entity`, `remove_all_entities`    | `entity_removed`     |
//!
//! Replacing an existing component and removing an absent one notify nobody.
//!
//! A listener registered for a single entity only hears about that entity and
//! is dropped together with it.

use super::component::ComponentType;
use super::entity::{Entity, EntityId};

/// A component was attached to or detached from an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentEvent {
    pub entity: Entity,
    pub component: ComponentType,
}

/// An entity entered or left the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityEvent {
    pub entity: Entity,
    pub id: Option<EntityId>,
}

/// Observer of structural changes. Every method defaults to doing nothing.
pub trait EnvironmentListener: Send {
    fn component_added(&mut self, _event: &ComponentEvent) {}
    fn component_removed(&mut self, _event: &ComponentEvent) {}
    fn entity_added(&mut self, _event: &EntityEvent) {}
    fn entity_removed(&mut self, _event: &EntityEvent) {}
}

/// Returned by listener registration; pass it to
/// [`Environment::remove_listener`](super::Environment::remove_listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

struct ListenerEntry {
    handle: ListenerHandle,
    /// `None` listens to the whole environment.
    scope: Option<Entity>,
    listener: Box<dyn EnvironmentListener>,
}

impl ListenerEntry {
    fn hears(&self, entity: Entity) -> bool {
        self.scope.is_none_or(|scope| scope == entity)
    }
}

/// All listeners of one environment, global and entity-scoped, in
/// registration order.
pub(crate) struct Listeners {
    entries: Vec<ListenerEntry>,
    next_handle: u64,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_handle: 0,
        }
    }

    pub fn register(
        &mut self,
        scope: Option<Entity>,
        listener: Box<dyn EnvironmentListener>,
    ) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(ListenerEntry {
            handle,
            scope,
            listener,
        });
        handle
    }

    pub fn remove(&mut self, handle: ListenerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.handle != handle);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn component_added(&mut self, event: &ComponentEvent) {
        for entry in self.entries.iter_mut().filter(|e| e.hears(event.entity)) {
            entry.listener.component_added(event);
        }
    }

    pub fn component_removed(&mut self, event: &ComponentEvent) {
        for entry in self.entries.iter_mut().filter(|e| e.hears(event.entity)) {
            entry.listener.component_removed(event);
        }
    }

    pub fn entity_added(&mut self, event: &EntityEvent) {
        for entry in self.entries.iter_mut().filter(|e| e.hears(event.entity)) {
            entry.listener.entity_added(event);
        }
    }

    /// Notify, then drop every listener scoped to the removed entity.
    pub fn entity_removed(&mut self, event: &EntityEvent) {
        for entry in self.entries.iter_mut().filter(|e| e.hears(event.entity)) {
            entry.listener.entity_removed(event);
        }
        self.entries.retain(|entry| entry.scope != Some(event.entity));
    }
}
