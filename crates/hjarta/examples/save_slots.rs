//! Save Slots — persistent components, savegame files and background loads.
//!
//! Builds a small party, saves it to two slots, changes the world and loads
//! the slots back: one synchronously, one on a worker thread. Transient
//! components never reach the file.
//!
//! Run with: `RUST_LOG=info cargo run -p hjarta --example save_slots`

use hjarta::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Health(u32);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Inventory {
    items: Vec<String>,
}

/// Recomputed every run; never saved.
struct PathCache(Vec<Vec2>);

fn regenerate(env: &mut Environment) -> Result<()> {
    for entity in env.fetch_all(&Archetype::of::<(Health,)>()) {
        if let Some(health) = env.get_mut::<Health>(entity) {
            health.0 = (health.0 + 1).min(100);
        }
    }
    Ok(())
}

fn party(env: &mut Environment) -> Result<()> {
    let hero = env.add_entity((
        Transform::at(0.0, 0.0, 1.0, 2.0),
        Health(80),
        Inventory {
            items: vec!["sword".into(), "rope".into()],
        },
        PathCache(Vec::new()),
    ))?;
    env.entity_mut(hero)?.set_name("Hero");

    let companion = env.add_entity_with_id(EntityId(7), (Health(45), Inventory::default()))?;
    env.entity_mut(companion)?.set_name("Companion");
    Ok(())
}

fn report(label: &str, env: &Environment) {
    println!("── {label}");
    for entity in env.entities() {
        let Some(view) = env.entity(entity) else {
            continue;
        };
        let health = view.get::<Health>().map_or(0, |h| h.0);
        println!(
            "  {view} health={health} cached_path={}",
            view.has::<PathCache>()
        );
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let dir = tempfile::tempdir().map_err(|source| PersistenceError::Io {
        path: std::env::temp_dir(),
        source,
    })?;

    let mut env = Environment::builder()
        .save_directory(dir.path())
        .persistent::<Health>()
        .persistent_as::<Inventory>("inv")
        .transient::<PathCache>()
        .system(regenerate)
        .build()?;

    party(&mut env)?;
    report("new game", &env);

    env.save_to_file("slot-1.sav")?;
    for _ in 0..10 {
        env.update()?;
    }
    env.save_to_file("slot-2.sav")?;
    report("after 10 ticks", &env);

    env.remove_all_entities();
    env.load_from_file("slot-1.sav")?;
    report("loaded slot-1", &env);

    env.load_in_background("slot-2.sav")?;
    while env.is_loading() {
        env.update()?;
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    report("loaded slot-2 in background", &env);

    if let Err(e) = env.load_from_file("slot-3.sav") {
        println!("── slot-3: {e}");
    }
    for slot in ["slot-1.sav", "slot-2.sav"] {
        env.delete_savegame_file(slot)?;
    }
    Ok(())
}
