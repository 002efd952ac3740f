//! # Scenes — Environments Prepared in the Background
//!
//! A [`Scene`] describes one environment: its registrations (through
//! [`Scene::environment`]) and its initial entities (through
//! [`Scene::populate`]). [`Scenes`] owns one environment per scene type and
//! ticks the active one.
//!
//! ```text
//! add(GameScene) ──► worker "prepare:GameScene"
//!                     builds Environment, runs populate()
//!                     publishes (scene, env) ──────────┐
//!                                                      ▼
//! switch_to::<GameScene>()   next update(): on_exit(old), GameScene active
//!                            while preparing: the loading environment ticks
//!                            once ready: on_enter(GameScene), its env ticks
//! ```
//!
//! Scene switches are queued and applied at the start of the next
//! [`Scenes::update`]. A [`DefaultScene`] with an empty environment is active
//! from the start.

use std::any::TypeId;
use std::fmt;

use crate::ecs::component::short_type_name;
use crate::ecs::{Environment, EnvironmentBuilder};
use crate::error::{ConfigurationError, Error, PersistenceError, Result, StateError};
use crate::prepare::{CancelToken, Preparation};

/// One environment's setup and lifecycle hooks.
pub trait Scene: Send + 'static {
    /// Registrations for the scene's environment.
    fn environment(&self) -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    /// Create the initial entities. Runs on a worker thread.
    fn populate(&mut self, _env: &mut Environment) -> Result<()> {
        Ok(())
    }

    /// Called on the simulation thread when the scene becomes active and its
    /// environment is ready.
    fn on_enter(&mut self, _env: &mut Environment) {}

    /// Called on the simulation thread when another scene takes over.
    fn on_exit(&mut self, _env: &mut Environment) {}
}

/// The empty scene that is active before any switch.
#[derive(Debug, Default)]
pub struct DefaultScene;

impl Scene for DefaultScene {}

type Prepared = (Box<dyn Scene>, Environment);

enum SceneState {
    /// The scene itself is on the worker until preparation finishes.
    Preparing(Preparation<Result<Prepared>>),
    Ready {
        scene: Box<dyn Scene>,
        env: Environment,
    },
}

struct SceneEntry {
    type_id: TypeId,
    name: &'static str,
    state: SceneState,
}

impl SceneEntry {
    fn ready(type_id: TypeId, name: &'static str, scene: Box<dyn Scene>, env: Environment) -> Self {
        Self {
            type_id,
            name,
            state: SceneState::Ready { scene, env },
        }
    }

    /// `Ok(true)` once the environment is ready; fails if preparation did.
    fn poll(&mut self) -> Result<bool> {
        let SceneState::Preparing(preparation) = &mut self.state else {
            return Ok(true);
        };
        if !preparation.poll()? {
            return Ok(false);
        }
        let prepared = preparation.wait()?;
        self.finish(prepared)?;
        Ok(true)
    }

    /// Block until the environment is ready.
    fn wait(&mut self) -> Result<()> {
        let SceneState::Preparing(preparation) = &mut self.state else {
            return Ok(());
        };
        let prepared = preparation.wait()?;
        self.finish(prepared)
    }

    fn finish(&mut self, prepared: Result<Prepared>) -> Result<()> {
        let (scene, env) = prepared?;
        log::debug!("scene {} prepared", self.name);
        self.state = SceneState::Ready { scene, env };
        Ok(())
    }

    fn environment_mut(&mut self) -> Option<&mut Environment> {
        match &mut self.state {
            SceneState::Ready { env, .. } => Some(env),
            SceneState::Preparing(_) => None,
        }
    }
}

/// Build a scene's environment and populate it. Runs on the worker.
fn prepare(mut scene: Box<dyn Scene>, name: &'static str, token: &CancelToken) -> Result<Prepared> {
    let mut env = scene.environment().build()?;
    if token.is_cancelled() {
        return Err(PersistenceError::PreparationFailed {
            name: name.to_string(),
        }
        .into());
    }
    scene.populate(&mut env)?;
    Ok((scene, env))
}

/// All scenes of an application, one of them active.
pub struct Scenes {
    entries: Vec<SceneEntry>,
    active: TypeId,
    /// `on_enter` has run for the active scene.
    entered: bool,
    pending_switch: Option<TypeId>,
    loading: Environment,
}

impl Scenes {
    pub fn new() -> Self {
        Self {
            entries: vec![default_entry()],
            active: TypeId::of::<DefaultScene>(),
            entered: true,
            pending_switch: None,
            loading: Environment::new(),
        }
    }

    /// Use `scene` for the environment shown while the active scene is
    /// being prepared. Built on the calling thread.
    pub fn set_loading_scene<S: Scene>(&mut self, mut scene: S) -> Result<&mut Self> {
        let mut env = scene.environment().build()?;
        scene.populate(&mut env)?;
        self.loading = env;
        Ok(self)
    }

    /// Start preparing `scene` in the background. Fails if a scene of this
    /// type was already added.
    pub fn add<S: Scene>(&mut self, scene: S) -> Result<&mut Self> {
        let name = scene_name::<S>();
        if self.contains::<S>() {
            return Err(ConfigurationError::DuplicateScene { scene: name }.into());
        }
        let scene: Box<dyn Scene> = Box::new(scene);
        let preparation = Preparation::spawn(name, move |token| prepare(scene, name, token))?;
        self.entries.push(SceneEntry {
            type_id: TypeId::of::<S>(),
            name,
            state: SceneState::Preparing(preparation),
        });
        log::debug!("preparing scene {name}");
        Ok(self)
    }

    /// Like [`add`](Self::add), replacing a scene of the same type. Fails for
    /// the active scene. A pending switch to `S` stays pending.
    pub fn add_or_replace<S: Scene>(&mut self, scene: S) -> Result<&mut Self> {
        let pending = self.pending_switch;
        if self.contains::<S>() {
            self.remove::<S>()?;
        }
        self.add(scene)?;
        if pending == Some(TypeId::of::<S>()) {
            self.pending_switch = pending;
        }
        Ok(self)
    }

    pub fn contains<S: Scene>(&self) -> bool {
        self.index_of(TypeId::of::<S>()).is_some()
    }

    pub fn scene_count(&self) -> usize {
        self.entries.len()
    }

    /// Name of the active scene.
    pub fn active_scene(&self) -> &'static str {
        self.index_of(self.active)
            .map_or("<none>", |index| self.entries[index].name)
    }

    pub fn is_active<S: Scene>(&self) -> bool {
        self.active == TypeId::of::<S>()
    }

    /// Make `S` the active scene at the start of the next update.
    pub fn switch_to<S: Scene>(&mut self) -> Result<&mut Self> {
        self.require::<S>()?;
        self.pending_switch = Some(TypeId::of::<S>());
        Ok(self)
    }

    /// Remove `S`, cancelling its preparation if still running. Fails for the
    /// active scene.
    pub fn remove<S: Scene>(&mut self) -> Result<&mut Self> {
        let index = self.require::<S>()?;
        let type_id = TypeId::of::<S>();
        if self.active == type_id {
            return Err(StateError::ActiveSceneRemoval {
                scene: scene_name::<S>(),
            }
            .into());
        }
        if self.pending_switch == Some(type_id) {
            log::warn!("dropping pending switch to removed scene {}", scene_name::<S>());
            self.pending_switch = None;
        }
        let entry = self.entries.remove(index);
        if let SceneState::Preparing(preparation) = entry.state {
            preparation.cancel();
        }
        Ok(self)
    }

    /// The environment of `S`. Fails while it is still being prepared.
    pub fn environment_of<S: Scene>(&mut self) -> Result<&mut Environment> {
        let index = self.require::<S>()?;
        let ready = self.poll_entry(index)?;
        if !ready {
            return Err(StateError::ScenePreparing {
                scene: scene_name::<S>(),
            }
            .into());
        }
        self.entries[index]
            .environment_mut()
            .ok_or_else(|| StateError::ScenePreparing { scene: scene_name::<S>() }.into())
    }

    /// Block until `S` is prepared and return its environment.
    pub fn finish_preparation<S: Scene>(&mut self) -> Result<&mut Environment> {
        let index = self.require::<S>()?;
        if let Err(e) = self.entries[index].wait() {
            self.discard_failed(index);
            return Err(e);
        }
        self.entries[index]
            .environment_mut()
            .ok_or_else(|| StateError::ScenePreparing { scene: scene_name::<S>() }.into())
    }

    /// `true` while the active scene is still being prepared.
    pub fn is_showing_loading_scene(&mut self) -> bool {
        match self.index_of(self.active) {
            Some(index) => !matches!(self.entries[index].poll(), Ok(true)),
            None => true,
        }
    }

    /// The environment `update` ticks: the active scene's, or the loading
    /// environment while it is being prepared.
    pub fn active_environment(&mut self) -> &mut Environment {
        let index = self.index_of(self.active);
        let ready = index.is_some_and(|i| matches!(self.entries[i].poll(), Ok(true)));
        match index {
            Some(index) if ready => match &mut self.entries[index].state {
                SceneState::Ready { env, .. } => env,
                SceneState::Preparing(_) => &mut self.loading,
            },
            _ => &mut self.loading,
        }
    }

    /// Apply a pending switch, then tick the active environment.
    pub fn update(&mut self) -> Result<()> {
        if let Some(target) = self.pending_switch.take() {
            self.apply_switch(target);
        }

        let Some(index) = self.index_of(self.active) else {
            return self.loading.update();
        };
        if !self.poll_entry(index)? {
            return self.loading.update();
        }

        let entered = self.entered;
        let SceneState::Ready { scene, env } = &mut self.entries[index].state else {
            return self.loading.update();
        };
        if !entered {
            scene.on_enter(env);
            self.entered = true;
        }
        env.update()
    }

    fn apply_switch(&mut self, target: TypeId) {
        if target == self.active {
            return;
        }
        if self.entered {
            if let Some(index) = self.index_of(self.active) {
                if let SceneState::Ready { scene, env } = &mut self.entries[index].state {
                    scene.on_exit(env);
                }
            }
        }
        self.active = target;
        self.entered = false;
        log::debug!("switched to scene {}", self.active_scene());
    }

    /// Poll one entry, dropping it if its preparation failed.
    fn poll_entry(&mut self, index: usize) -> Result<bool> {
        match self.entries[index].poll() {
            Ok(ready) => Ok(ready),
            Err(e) => {
                self.discard_failed(index);
                Err(e)
            }
        }
    }

    /// Forget a scene whose preparation failed. If it was active, fall back
    /// to the default scene.
    fn discard_failed(&mut self, index: usize) {
        let entry = self.entries.remove(index);
        log::warn!("scene {} could not be prepared", entry.name);
        if entry.type_id == self.active {
            if self.index_of(TypeId::of::<DefaultScene>()).is_none() {
                self.entries.push(default_entry());
            }
            self.active = TypeId::of::<DefaultScene>();
            self.entered = false;
        }
    }

    fn index_of(&self, type_id: TypeId) -> Option<usize> {
        self.entries.iter().position(|e| e.type_id == type_id)
    }

    fn require<S: Scene>(&self) -> Result<usize> {
        self.index_of(TypeId::of::<S>()).ok_or_else(|| {
            Error::from(StateError::UnknownScene {
                scene: scene_name::<S>(),
            })
        })
    }
}

impl fmt::Debug for Scenes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.entries.iter().map(|e| e.name).collect();
        f.debug_struct("Scenes")
            .field("active", &self.active_scene())
            .field("scenes", &names)
            .field("entered", &self.entered)
            .finish()
    }
}

impl Default for Scenes {
    fn default() -> Self {
        Self::new()
    }
}

fn default_entry() -> SceneEntry {
    SceneEntry::ready(
        TypeId::of::<DefaultScene>(),
        scene_name::<DefaultScene>(),
        Box::new(DefaultScene),
        Environment::new(),
    )
}

fn scene_name<S: 'static>() -> &'static str {
    short_type_name(std::any::type_name::<S>())
}
