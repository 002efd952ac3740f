//! # Savegames — Persisting Entity State
//!
//! Savegames hold entities and their persistent components. Systems,
//! listeners and transient components are not saved; derived data is rebuilt
//! by the systems after loading.
//!
//! ## Quick Start
//!
//! ```ignore
//! let mut env = Environment::builder()
//!     .save_directory("saves")
//!     .persistent::<Health>()
//!     .transient::<PathCache>()
//!     .build()?;
//!
//! env.save_to_file("slot1.sav")?;
//! if env.savegame_file_exists("slot1.sav") {
//!     env.load_from_file("slot1.sav")?;
//! }
//! ```
//!
//! ## Format
//!
//! Pretty-printed JSON, versioned:
//!
//! ```text
//! {
//!   "version": 1,
//!   "entities": [
//!     { "id": 0, "name": "Player",
//!       "components": [ { "type": "Transform", "data": { ... } },
//!                       { "type": "Health",    "data": 100 } ] }
//!   ]
//! }
//! ```
//!
//! Every saved entity gets a stable [`EntityId`] on its first save; loading
//! restores the same ids so `EntityId` references inside components resolve
//! to the same entities again.
//!
//! ## Crash Safety
//!
//! The JSON is written to a temporary file in the save directory and renamed
//! over the slot, so a crash mid-save leaves the previous savegame intact.
//!
//! ## Loading
//!
//! A load validates and decodes every record before touching the live store.
//! A savegame with an unknown component type, a bad payload or a duplicate id
//! fails without changing anything. Once decoded, every current entity is
//! removed and the saved ones are created in file order.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ecs::component::{BoxedComponent, ComponentType};
use crate::ecs::registry::Persistence;
use crate::ecs::{Entity, EntityId, Environment};
use crate::error::{ConfigurationError, PersistenceError, Result};
use crate::prepare::Preparation;

/// Format version written by this crate.
pub const SAVEGAME_VERSION: u32 = 1;

/// A decoded savegame, as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveGame {
    pub version: u32,
    pub entities: Vec<SavedEntity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedEntity {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub components: Vec<SavedComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedComponent {
    #[serde(rename = "type")]
    pub tag: String,
    pub data: serde_json::Value,
}

/// A saved entity with its components decoded and ready to insert.
struct DecodedEntity {
    id: EntityId,
    name: Option<String>,
    components: Vec<(ComponentType, BoxedComponent)>,
}

impl SaveGame {
    /// Read and parse a savegame file.
    pub fn read(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                PersistenceError::MissingSavegame {
                    path: path.to_path_buf(),
                }
            } else {
                PersistenceError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let save: SaveGame =
            serde_json::from_str(&json).map_err(|source| PersistenceError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
        if save.version != SAVEGAME_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: save.version,
                expected: SAVEGAME_VERSION,
            }
            .into());
        }
        Ok(save)
    }

    /// Write as pretty JSON through a temporary file and an atomic rename.
    pub fn write(&self, path: &Path) -> Result<()> {
        let io_error = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_vec_pretty(self).map_err(|source| PersistenceError::Serialize {
            tag: "savegame".to_string(),
            source,
        })?;

        let tmp = temp_path(path);
        let mut file = std::fs::File::create(&tmp).map_err(io_error)?;
        file.write_all(&json).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        drop(file);
        std::fs::rename(&tmp, path).map_err(|source| {
            let _ = std::fs::remove_file(&tmp);
            io_error(source)
        })?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Slot names are plain file names inside the save directory.
fn validate_slot_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.ends_with(".tmp");
    if invalid {
        return Err(PersistenceError::InvalidSlotName {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

impl Environment {
    /// Where the slot `name` lives. Fails for names that are not plain file
    /// names.
    pub fn savegame_path(&self, name: &str) -> Result<PathBuf> {
        validate_slot_name(name)?;
        Ok(self.config.save_directory.join(name))
    }

    /// Serialize every entity and its persistent components.
    ///
    /// Entities without a stable id get one.
    pub fn snapshot(&mut self) -> Result<SaveGame> {
        let mut entities = Vec::new();
        for entity in self.entities() {
            let Some(id) = self.ensure_id(entity) else {
                continue;
            };
            entities.push(self.save_entity(entity, id)?);
        }
        Ok(SaveGame {
            version: SAVEGAME_VERSION,
            entities,
        })
    }

    fn save_entity(&self, entity: Entity, id: EntityId) -> Result<SavedEntity> {
        let Some(record) = self.record(entity) else {
            return Err(crate::error::StateError::EntityNotAlive { entity }.into());
        };
        let mut components = Vec::new();
        for &type_id in &record.components {
            let info = self.registry.info(type_id);
            let Persistence::Persistent { tag, serialize, .. } = &info.persistence else {
                if matches!(info.persistence, Persistence::Transient { explicit: false }) {
                    log::warn!(
                        "skipping unregistered component {} while saving {entity}",
                        info.ty
                    );
                }
                continue;
            };
            let Some(value) = self.storage(type_id).get(entity) else {
                continue;
            };
            let Some(json) = serialize(value) else {
                continue;
            };
            let data = json.map_err(|source| PersistenceError::Serialize {
                tag: tag.clone(),
                source,
            })?;
            components.push(SavedComponent {
                tag: tag.clone(),
                data,
            });
        }
        Ok(SavedEntity {
            id,
            name: record.name.clone(),
            components,
        })
    }

    /// Replace every entity with the savegame's entities.
    ///
    /// Nothing changes if any record cannot be decoded.
    pub fn restore(&mut self, save: SaveGame) -> Result<()> {
        if save.version != SAVEGAME_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: save.version,
                expected: SAVEGAME_VERSION,
            }
            .into());
        }
        let decoded = self.decode(save)?;

        self.remove_all_entities();
        let count = decoded.len();
        for entity in decoded {
            self.spawn_with(Some(entity.id), entity.name, entity.components)?;
        }
        log::debug!("restored {count} entities");
        Ok(())
    }

    fn decode(&self, save: SaveGame) -> Result<Vec<DecodedEntity>> {
        let mut seen = std::collections::HashSet::new();
        let mut decoded = Vec::with_capacity(save.entities.len());
        for saved in save.entities {
            if !seen.insert(saved.id) {
                return Err(ConfigurationError::DuplicateEntityId { id: saved.id }.into());
            }
            let mut components: Vec<(ComponentType, BoxedComponent)> = Vec::new();
            for SavedComponent { tag, data } in saved.components {
                let Some((_, info)) = self.registry.by_tag(&tag) else {
                    return Err(PersistenceError::UnknownComponent { tag }.into());
                };
                let Persistence::Persistent { deserialize, .. } = &info.persistence else {
                    return Err(PersistenceError::UnknownComponent { tag }.into());
                };
                if components.iter().any(|(ty, _)| *ty == info.ty) {
                    return Err(ConfigurationError::DuplicateComponent {
                        component: info.ty.name(),
                    }
                    .into());
                }
                let value = deserialize(data)
                    .map_err(|source| PersistenceError::InvalidPayload { tag, source })?;
                components.push((info.ty, value));
            }
            decoded.push(DecodedEntity {
                id: saved.id,
                name: saved.name,
                components,
            });
        }
        Ok(decoded)
    }

    /// Write all entities to the slot `name` in the save directory.
    pub fn save_to_file(&mut self, name: &str) -> Result<()> {
        let path = self.savegame_path(name)?;
        let save = self.snapshot()?;
        save.write(&path)?;
        log::info!(
            "saved {} entities to '{}'",
            save.entities.len(),
            path.display()
        );
        Ok(())
    }

    /// Replace all entities with the contents of slot `name`.
    pub fn load_from_file(&mut self, name: &str) -> Result<()> {
        let path = self.savegame_path(name)?;
        let save = SaveGame::read(&path)?;
        self.restore(save)?;
        log::info!("loaded '{}'", path.display());
        Ok(())
    }

    pub fn savegame_file_exists(&self, name: &str) -> bool {
        self.savegame_path(name).is_ok_and(|path| path.is_file())
    }

    /// Returns `false` if there was no such savegame.
    pub fn delete_savegame_file(&self, name: &str) -> Result<bool> {
        let path = self.savegame_path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PersistenceError::Io { path, source }.into()),
        }
    }

    /// Read and parse slot `name` on a worker thread. The result replaces the
    /// entities at the start of the first `update()` after it is ready; errors
    /// are returned from that `update()`.
    pub fn load_in_background(&mut self, name: &str) -> Result<()> {
        let path = self.savegame_path(name)?;
        let preparation = Preparation::spawn(name, move |_| SaveGame::read(&path))?;
        if self.pending_load.replace(preparation).is_some() {
            log::debug!("replacing pending background load with '{name}'");
        }
        Ok(())
    }

    /// A background load has been started and not yet applied.
    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    pub(crate) fn apply_background_load(&mut self) -> Result<()> {
        let Some(preparation) = self.pending_load.as_mut() else {
            return Ok(());
        };
        let name = preparation.name().to_string();
        let ready = preparation.poll();
        match ready {
            Ok(false) => Ok(()),
            Ok(true) => {
                let save = self.pending_load.take().and_then(|mut p| p.take());
                match save {
                    Some(save) => {
                        self.restore(save?)?;
                        log::info!("loaded '{name}' in background");
                        Ok(())
                    }
                    None => Err(PersistenceError::PreparationFailed { name }.into()),
                }
            }
            Err(e) => {
                self.pending_load = None;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Archetype, EnvironmentListener, EntityEvent};
    use crate::error::Error;
    use crate::math::{Transform, Vec2};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Health(u32);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Follow {
        target: EntityId,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct PathCache(Vec<Vec2>);

    /// Never registered at all.
    #[derive(Debug, Clone, PartialEq)]
    struct Scratch;

    fn environment(dir: &Path) -> Environment {
        Environment::builder()
            .save_directory(dir)
            .persistent::<Health>()
            .persistent::<Follow>()
            .transient::<PathCache>()
            .build()
            .unwrap()
    }

    #[test]
    fn three_entities_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = environment(dir.path());
        let player = env
            .add_entity((Health(100), Transform::at(1.0, 2.0, 16.0, 16.0)))
            .unwrap();
        env.entity_mut(player).unwrap().set_name("Player");
        let enemy = env.add_entity((Health(20),)).unwrap();
        let player_id = env.ensure_id(player).unwrap();
        env.entity_mut(enemy)
            .unwrap()
            .add(Follow { target: player_id })
            .unwrap();
        env.add_entity((Transform::default(),)).unwrap();

        env.save_to_file("slot1").unwrap();
        assert!(env.savegame_file_exists("slot1"));

        let mut loaded = environment(dir.path());
        loaded.load_from_file("slot1").unwrap();
        assert_eq!(loaded.entity_count(), 3);

        let player = loaded.fetch_by_id(player_id).unwrap();
        let player = loaded.entity(player).unwrap();
        assert_eq!(player.name(), Some("Player"));
        assert_eq!(player.get::<Health>(), Some(&Health(100)));
        assert_eq!(player.position().unwrap(), Vec2::new(1.0, 2.0));

        let follower = loaded.fetch_singleton(&Archetype::of::<(Follow,)>()).unwrap();
        let target = loaded.get::<Follow>(follower).unwrap().target;
        assert_eq!(loaded.fetch_by_id(target), Some(player.entity()));
        assert_eq!(loaded.get::<Health>(follower), Some(&Health(20)));
    }

    #[test]
    fn transient_and_unregistered_components_are_skipped() {
        let mut env = Environment::builder()
            .transient::<PathCache>()
            .persistent::<Health>()
            .build()
            .unwrap();
        env.add_entity((Health(5), PathCache(vec![Vec2::ZERO]), Scratch))
            .unwrap();

        let save = env.snapshot().unwrap();
        assert_eq!(save.entities.len(), 1);
        let tags: Vec<_> = save.entities[0].components.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(tags, vec!["Health"]);
    }

    #[test]
    fn ids_survive_repeated_saves() {
        let mut env = Environment::new();
        let a = env.spawn_empty();
        let b = env.add_entity_with_id(EntityId(7), (Transform::default(),)).unwrap();
        let first = env.snapshot().unwrap();
        let second = env.snapshot().unwrap();
        assert_eq!(first, second);

        let ids: Vec<_> = first.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![EntityId(8), EntityId(7)]);
        assert_eq!(env.fetch_by_id(EntityId(8)), Some(a));
        assert_eq!(env.fetch_by_id(EntityId(7)), Some(b));
    }

    #[test]
    fn load_replaces_entities_and_keeps_systems() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = environment(dir.path());
        env.add_entity((Health(1),)).unwrap();
        env.save_to_file("one").unwrap();

        env.add_entity((Health(2),)).unwrap();
        env.add_system(|_env: &mut Environment| -> crate::error::Result<()> { Ok(()) });
        env.load_from_file("one").unwrap();

        assert_eq!(env.entity_count(), 1);
        assert_eq!(env.system_count(), 1);
        assert_eq!(env.fetch_singleton_component::<Health>().unwrap(), &Health(1));
    }

    #[test]
    fn missing_savegame() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = environment(dir.path());
        assert!(!env.savegame_file_exists("nothing"));
        let err = env.load_from_file("nothing").unwrap_err();
        assert!(matches!(
            err,
            Error::Persistence(PersistenceError::MissingSavegame { .. })
        ));
    }

    #[test]
    fn corrupt_and_unsupported_savegames() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = environment(dir.path());
        env.add_entity((Health(1),)).unwrap();

        std::fs::write(dir.path().join("broken"), "{ not json").unwrap();
        let err = env.load_from_file("broken").unwrap_err();
        assert!(matches!(err, Error::Persistence(PersistenceError::Corrupt { .. })));

        std::fs::write(dir.path().join("future"), r#"{"version": 99, "entities": []}"#).unwrap();
        let err = env.load_from_file("future").unwrap_err();
        assert!(matches!(
            err,
            Error::Persistence(PersistenceError::UnsupportedVersion { found: 99, expected: 1 })
        ));
        // Failed loads leave the store untouched.
        assert_eq!(env.entity_count(), 1);
    }

    #[test]
    fn bad_records_fail_before_any_change() {
        let mut env = environment(Path::new("."));
        env.add_entity((Health(1),)).unwrap();

        let unknown = SaveGame {
            version: SAVEGAME_VERSION,
            entities: vec![SavedEntity {
                id: EntityId(0),
                name: None,
                components: vec![SavedComponent {
                    tag: "Mana".into(),
                    data: serde_json::json!(3),
                }],
            }],
        };
        let err = env.restore(unknown).unwrap_err();
        assert!(matches!(
            err,
            Error::Persistence(PersistenceError::UnknownComponent { .. })
        ));

        let bad_payload = SaveGame {
            version: SAVEGAME_VERSION,
            entities: vec![SavedEntity {
                id: EntityId(0),
                name: None,
                components: vec![SavedComponent {
                    tag: "Health".into(),
                    data: serde_json::json!("lots"),
                }],
            }],
        };
        let err = env.restore(bad_payload).unwrap_err();
        assert!(matches!(
            err,
            Error::Persistence(PersistenceError::InvalidPayload { .. })
        ));
        assert_eq!(env.fetch_singleton_component::<Health>().unwrap(), &Health(1));
    }

    #[test]
    fn slot_names_must_be_plain_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = environment(dir.path());
        for name in ["", "..", "../escape", "a/b", "slot.tmp"] {
            let err = env.save_to_file(name).unwrap_err();
            assert!(matches!(
                err,
                Error::Persistence(PersistenceError::InvalidSlotName { .. })
            ));
            assert!(!env.savegame_file_exists(name));
        }
    }

    #[test]
    fn save_overwrites_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = environment(dir.path());
        env.add_entity((Health(1),)).unwrap();
        env.save_to_file("slot").unwrap();
        env.add_entity((Health(2),)).unwrap();
        env.save_to_file("slot").unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let save = SaveGame::read(&dir.path().join("slot")).unwrap();
        assert_eq!(save.entities.len(), 2);
    }

    #[test]
    fn delete_savegame() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = environment(dir.path());
        env.save_to_file("slot").unwrap();
        assert!(env.delete_savegame_file("slot").unwrap());
        assert!(!env.delete_savegame_file("slot").unwrap());
        assert!(!env.savegame_file_exists("slot"));
    }

    #[derive(Clone, Default)]
    struct Counter(Arc<Mutex<(usize, usize)>>);

    impl EnvironmentListener for Counter {
        fn entity_added(&mut self, _event: &EntityEvent) {
            self.0.lock().unwrap().0 += 1;
        }
        fn entity_removed(&mut self, _event: &EntityEvent) {
            self.0.lock().unwrap().1 += 1;
        }
    }

    #[test]
    fn restore_notifies_listeners() {
        let mut env = Environment::new();
        env.spawn_empty();
        env.spawn_empty();
        let save = env.snapshot().unwrap();

        let counter = Counter::default();
        env.register_listener(counter.clone());
        env.restore(save).unwrap();
        assert_eq!(*counter.0.lock().unwrap(), (2, 2));
    }

    #[test]
    fn background_load_applies_on_next_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = environment(dir.path());
        env.add_entity((Health(9),)).unwrap();
        env.save_to_file("bg").unwrap();
        env.remove_all_entities();

        env.load_in_background("bg").unwrap();
        assert!(env.is_loading());
        assert_eq!(env.entity_count(), 0);

        let mut waited = Duration::ZERO;
        while env.is_loading() && waited < Duration::from_secs(5) {
            env.update().unwrap();
            std::thread::sleep(Duration::from_millis(5));
            waited += Duration::from_millis(5);
        }
        assert!(!env.is_loading());
        assert_eq!(env.fetch_singleton_component::<Health>().unwrap(), &Health(9));
    }

    #[test]
    fn background_load_error_surfaces_from_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = environment(dir.path());
        env.load_in_background("absent").unwrap();

        let mut result = Ok(());
        for _ in 0..1000 {
            result = env.update();
            if result.is_err() || !env.is_loading() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(
            result,
            Err(Error::Persistence(PersistenceError::MissingSavegame { .. }))
        ));
        assert!(!env.is_loading());
    }
}
