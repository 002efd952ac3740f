//! # Component — Type Identity and Sparse-Set Storage
//!
//! Components are plain data. Any `'static + Send + Sync` type is a
//! [`Component`]; there is no trait to implement and no hierarchy among them.
//! Each type is addressed by its [`ComponentType`].
//!
//! ## Storage Layout
//!
//! Every component type that has ever been used in an environment gets a
//! small integer id (see [`ComponentRegistry`](super::registry::ComponentRegistry))
//! and one [`SparseSet`]:
//!
//! ```text
//! sparse:   [None, Some(1), None, Some(0)]   ← indexed by entity slot
//! entities: [e3, e1]                          ← dense, parallel to data
//! data:     [Box<Health>, Box<Health>]        ← dense, parallel to entities
//! ```
//!
//! Add, remove and membership are O(1); iterating a type walks a dense array.
//! The dense entity list doubles as the query index for that type.
//!
//! Values are stored as `Box<dyn Any + Send + Sync>` and accessed through
//! `downcast_ref`/`downcast_mut`. No unsafe code is involved.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::entity::Entity;

/// Marker for anything that can be attached to an entity.
pub trait Component: Any + Send + Sync {}

impl<T: Any + Send + Sync> Component for T {}

/// A type-erased component value.
pub(crate) type BoxedComponent = Box<dyn Any + Send + Sync>;

/// Runtime identity of a component type.
///
/// Equality, ordering and hashing use the [`TypeId`] only; the name is carried
/// for messages and diagnostics.
#[derive(Clone, Copy)]
pub struct ComponentType {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentType {
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Short type name, e.g. `Transform` for `hjarta::math::Transform`.
    pub fn name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentType {}

impl Hash for ComponentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl PartialOrd for ComponentType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_id.cmp(&other.type_id)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A static set of component types, implemented for tuples of up to eight
/// components. Used to describe archetypes: `Archetype::of::<(A, B)>()`.
pub trait ComponentSet {
    fn component_types() -> Vec<ComponentType>;
}

/// A tuple of component values that can be attached to a new entity.
pub trait Bundle: ComponentSet {
    /// Box every component, in tuple order.
    fn into_components(self) -> Vec<(ComponentType, BoxedComponent)>;
}

macro_rules! impl_bundle {
    ($($T:ident),+) => {
        impl<$($T: Component),+> ComponentSet for ($($T,)+) {
            fn component_types() -> Vec<ComponentType> {
                vec![$(ComponentType::of::<$T>()),+]
            }
        }

        impl<$($T: Component),+> Bundle for ($($T,)+) {
            #[allow(non_snake_case)]
            fn into_components(self) -> Vec<(ComponentType, BoxedComponent)> {
                let ($($T,)+) = self;
                vec![$((ComponentType::of::<$T>(), Box::new($T) as BoxedComponent)),+]
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

/// Storage for one component type: a sparse slot map over dense arrays.
pub(crate) struct SparseSet {
    sparse: Vec<Option<u32>>,
    entities: Vec<Entity>,
    data: Vec<BoxedComponent>,
}

impl SparseSet {
    pub fn new() -> Self {
        Self {
            sparse: Vec::new(),
            entities: Vec::new(),
            data: Vec::new(),
        }
    }

    fn dense_index(&self, entity: Entity) -> Option<usize> {
        let dense = (*self.sparse.get(entity.index as usize)?)? as usize;
        // The slot may have been recycled since; the generation decides.
        (self.entities[dense] == entity).then_some(dense)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.dense_index(entity).is_some()
    }

    /// Insert or replace. Returns the previous value if there was one.
    pub fn insert(&mut self, entity: Entity, value: BoxedComponent) -> Option<BoxedComponent> {
        if let Some(dense) = self.dense_index(entity) {
            return Some(std::mem::replace(&mut self.data[dense], value));
        }
        let slot = entity.index as usize;
        if self.sparse.len() <= slot {
            self.sparse.resize(slot + 1, None);
        }
        self.sparse[slot] = Some(self.entities.len() as u32);
        self.entities.push(entity);
        self.data.push(value);
        None
    }

    /// Swap-remove the entity's value, patching the index of the entity that
    /// was moved into its place.
    pub fn remove(&mut self, entity: Entity) -> Option<BoxedComponent> {
        let dense = self.dense_index(entity)?;
        self.sparse[entity.index as usize] = None;
        self.entities.swap_remove(dense);
        let value = self.data.swap_remove(dense);
        if let Some(&moved) = self.entities.get(dense) {
            self.sparse[moved.index as usize] = Some(dense as u32);
        }
        Some(value)
    }

    pub fn get(&self, entity: Entity) -> Option<&(dyn Any + Send + Sync)> {
        let dense = self.dense_index(entity)?;
        Some(&*self.data[dense])
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut (dyn Any + Send + Sync)> {
        let dense = self.dense_index(entity)?;
        Some(&mut *self.data[dense])
    }

    /// Dense entity list, in storage order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }
}

/// Strip the module path from a fully-qualified type name
/// (`hjarta::math::Transform` → `Transform`). Generic names are kept whole.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    if full.contains('<') {
        return full;
    }
    full.rsplit("::").next().unwrap_or(full)
}
