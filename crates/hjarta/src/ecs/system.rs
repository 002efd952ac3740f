//! # System — Per-Tick Logic and Its Scheduler
//!
//! A system is a value with an `update(&mut Environment)` method. Any
//! `FnMut(&mut Environment) -> Result<()>` closure or function is one, and so
//! is any type implementing [`System`] directly, which is the way to pick a
//! [`Phase`] other than the default.
//!
//! ## Ordering
//!
//! Each tick runs every enabled system exactly once, ascending by phase, ties
//! broken by registration order:
//!
//! ```text
//! (Preparation,       #4) gravity
//! (Simulation,        #0) movement
//! (Simulation,        #2) collisions
//! (PresentationWorld, #1) sprites
//! ```
//!
//! A system is identified by its concrete type; at most one instance per type
//! is registered. Registering the same type again replaces the instance and
//! keeps its registration number, so it only moves if its phase changed.
//!
//! ## Changes During a Tick
//!
//! Systems can add, remove and toggle systems while the tick runs. Those
//! changes are queued and applied once the pass is over, so a system added
//! mid-tick first runs on the next tick. Removal has one immediate effect: a
//! removed system that has not run yet is skipped for the rest of the pass.
//!
//! ## Errors
//!
//! An error returned from `update` aborts the pass and is returned from
//! [`Environment::update`]. Queued changes are still applied.

use std::any::TypeId;
use std::collections::HashSet;
#[cfg(feature = "diagnostics")]
use std::time::Duration;

use super::component::short_type_name;
use super::environment::Environment;
use crate::error::{Result, StateError};

/// Execution slot of a system within a tick, earliest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Optimization,
    Preparation,
    SimulationBegin,
    Simulation,
    SimulationLate,
    PresentationPrepare,
    PresentationBackground,
    PresentationWorld,
    PresentationEffects,
    PresentationLight,
    PresentationOverlay,
    PresentationTransitions,
    PresentationUiBackground,
    PresentationUi,
    PresentationUiForeground,
}

/// Logic executed once per tick.
pub trait System: Send + 'static {
    fn update(&mut self, env: &mut Environment) -> Result<()>;

    fn phase(&self) -> Phase {
        Phase::Simulation
    }
}

/// Blanket impl: any `FnMut(&mut Environment) -> Result<()>` is a `System`
/// running in [`Phase::Simulation`].
impl<F> System for F
where
    F: FnMut(&mut Environment) -> Result<()> + Send + 'static,
{
    fn update(&mut self, env: &mut Environment) -> Result<()> {
        (self)(env)
    }
}

/// Public view of one registration, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub name: &'static str,
    pub phase: Phase,
    pub enabled: bool,
}

/// Wall-clock time one system spent in its last `update`.
#[cfg(feature = "diagnostics")]
#[derive(Debug, Clone)]
pub struct SystemTiming {
    pub name: &'static str,
    pub duration: Duration,
}

struct SystemEntry {
    type_id: TypeId,
    name: &'static str,
    phase: Phase,
    seq: u64,
    enabled: bool,
    /// `None` only while the system is checked out for its `update`.
    system: Option<Box<dyn System>>,
}

enum PendingChange {
    Add {
        type_id: TypeId,
        name: &'static str,
        phase: Phase,
        system: Box<dyn System>,
    },
    Remove {
        type_id: TypeId,
    },
    /// `None` flips the current state.
    SetEnabled {
        type_id: TypeId,
        enabled: Option<bool>,
    },
}

impl PendingChange {
    fn type_id(&self) -> TypeId {
        match self {
            Self::Add { type_id, .. }
            | Self::Remove { type_id }
            | Self::SetEnabled { type_id, .. } => *type_id,
        }
    }
}

/// The ordered system list of one environment.
pub(crate) struct Scheduler {
    entries: Vec<SystemEntry>,
    next_seq: u64,
    running: bool,
    pending: Vec<PendingChange>,
    removed_in_pass: HashSet<TypeId>,
    #[cfg(feature = "diagnostics")]
    timings: Vec<SystemTiming>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
            running: false,
            pending: Vec::new(),
            removed_in_pass: HashSet::new(),
            #[cfg(feature = "diagnostics")]
            timings: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Add or replace. `phase` overrides the system's own phase.
    pub fn add<S: System>(&mut self, system: S, phase: Option<Phase>) {
        let phase = phase.unwrap_or_else(|| system.phase());
        let change = PendingChange::Add {
            type_id: TypeId::of::<S>(),
            name: system_name::<S>(),
            phase,
            system: Box::new(system),
        };
        self.submit(change);
    }

    /// Returns `true` if the system was present.
    pub fn remove<S: System>(&mut self) -> bool {
        let type_id = TypeId::of::<S>();
        if !self.is_present(type_id) {
            return false;
        }
        if self.running {
            self.removed_in_pass.insert(type_id);
        }
        self.submit(PendingChange::Remove { type_id });
        true
    }

    /// `None` toggles. Fails if `S` is not registered.
    pub fn set_enabled<S: System>(&mut self, enabled: Option<bool>) -> Result<()> {
        let type_id = TypeId::of::<S>();
        if !self.is_present(type_id) {
            return Err(StateError::SystemNotRegistered {
                system: system_name::<S>(),
            }
            .into());
        }
        self.submit(PendingChange::SetEnabled { type_id, enabled });
        Ok(())
    }

    /// Registered, counting changes queued during the current pass.
    pub fn is_present(&self, type_id: TypeId) -> bool {
        let queued = self
            .pending
            .iter()
            .rev()
            .find(|change| !matches!(change, PendingChange::SetEnabled { .. }) && change.type_id() == type_id);
        match queued {
            Some(PendingChange::Add { .. }) => true,
            Some(_) => false,
            None => self.entries.iter().any(|e| e.type_id == type_id),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn infos(&self) -> Vec<SystemInfo> {
        self.entries
            .iter()
            .map(|e| SystemInfo {
                name: e.name,
                phase: e.phase,
                enabled: e.enabled,
            })
            .collect()
    }

    #[cfg(feature = "diagnostics")]
    pub fn timings(&self) -> &[SystemTiming] {
        &self.timings
    }

    fn submit(&mut self, change: PendingChange) {
        if self.running {
            self.pending.push(change);
        } else {
            self.apply(change);
        }
    }

    fn apply(&mut self, change: PendingChange) {
        match change {
            PendingChange::Add {
                type_id,
                name,
                phase,
                system,
            } => {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.type_id == type_id) {
                    log::debug!("replacing system {name} ({phase:?})");
                    entry.phase = phase;
                    entry.enabled = true;
                    entry.system = Some(system);
                } else {
                    log::debug!("adding system {name} ({phase:?})");
                    self.entries.push(SystemEntry {
                        type_id,
                        name,
                        phase,
                        seq: self.next_seq,
                        enabled: true,
                        system: Some(system),
                    });
                    self.next_seq += 1;
                }
                self.entries.sort_by_key(|e| (e.phase, e.seq));
            }
            PendingChange::Remove { type_id } => {
                self.entries.retain(|e| {
                    let keep = e.type_id != type_id;
                    if !keep {
                        log::debug!("removing system {}", e.name);
                    }
                    keep
                });
            }
            PendingChange::SetEnabled { type_id, enabled } => {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.type_id == type_id) {
                    entry.enabled = enabled.unwrap_or(!entry.enabled);
                    log::debug!("system {} enabled: {}", entry.name, entry.enabled);
                }
            }
        }
    }

    pub fn begin_pass(&mut self) {
        self.running = true;
        #[cfg(feature = "diagnostics")]
        self.timings.clear();
    }

    /// Take the system at `index` out for its update, unless it is disabled or
    /// was removed earlier in this pass.
    pub fn checkout(&mut self, index: usize) -> Option<(Box<dyn System>, &'static str)> {
        let entry = &mut self.entries[index];
        if !entry.enabled || self.removed_in_pass.contains(&entry.type_id) {
            return None;
        }
        log::trace!("running system {} ({:?})", entry.name, entry.phase);
        let system = entry.system.take()?;
        Some((system, entry.name))
    }

    pub fn checkin(
        &mut self,
        index: usize,
        system: Box<dyn System>,
        #[cfg(feature = "diagnostics")] duration: Duration,
    ) {
        let entry = &mut self.entries[index];
        #[cfg(feature = "diagnostics")]
        self.timings.push(SystemTiming {
            name: entry.name,
            duration,
        });
        entry.system = Some(system);
    }

    /// Apply everything queued during the pass.
    pub fn end_pass(&mut self) {
        self.running = false;
        self.removed_in_pass.clear();
        for change in std::mem::take(&mut self.pending) {
            self.apply(change);
        }
    }
}

/// Short type name of a system (`game::movement_system` → `movement_system`,
/// closures → `<closure>`).
pub(crate) fn system_name<S: 'static>() -> &'static str {
    let name = short_type_name(std::any::type_name::<S>());
    if name.contains("{{closure}}") {
        "<closure>"
    } else {
        name
    }
}
