//! Falling Boxes — systems, phases, queries and listeners.
//!
//! Drops a handful of boxes onto a floor. Gravity runs in the simulation
//! phase, landing checks run after it, and a listener logs every box that
//! comes to rest.
//!
//! Run with: `RUST_LOG=debug cargo run -p hjarta --example falling_boxes`

use hjarta::prelude::*;

/// Positive y points down.
const GRAVITY: f32 = 9.8;
const STEP: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy)]
struct Velocity(Vec2);

/// Marker for boxes that hit the floor.
struct Landed;

struct Floor;

fn gravity(env: &mut Environment) -> Result<()> {
    for entity in env.fetch_all(&Archetype::spatial::<(Velocity,)>()) {
        let mut boxed = env.entity_mut(entity)?;
        let Some(velocity) = boxed.get_mut::<Velocity>() else {
            continue;
        };
        velocity.0.y += GRAVITY * STEP;
        let delta = velocity.0 * STEP;
        boxed.move_by(delta)?;
    }
    Ok(())
}

struct Landing;

impl System for Landing {
    fn update(&mut self, env: &mut Environment) -> Result<()> {
        let floor = env.fetch_singleton(&Archetype::spatial::<(Floor,)>())?;
        let floor_bounds = env.entity(floor).map(|e| e.bounds()).transpose()?;
        let Some(floor_bounds) = floor_bounds else {
            return Ok(());
        };

        for entity in env.fetch_all(&Archetype::spatial::<(Velocity,)>()) {
            let mut boxed = env.entity_mut(entity)?;
            if !boxed.bounds()?.intersects(&floor_bounds) {
                continue;
            }
            let rest = floor_bounds.origin().y - boxed.bounds()?.height() / 2.0;
            let x = boxed.position()?.x;
            boxed.move_to(Vec2::new(x, rest))?;
            boxed.remove::<Velocity>();
            boxed.add(Landed)?;
        }
        Ok(())
    }

    fn phase(&self) -> Phase {
        Phase::SimulationLate
    }
}

struct LandingLog;

impl EnvironmentListener for LandingLog {
    fn component_added(&mut self, event: &ComponentEvent) {
        if event.component == ComponentType::of::<Landed>() {
            log::info!("{:?} landed", event.entity);
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut env = Environment::builder()
        .transient::<Velocity>()
        .system(gravity)
        .system(Landing)
        .listener(LandingLog)
        .build()?;

    env.add_entity((Transform::at(0.0, 10.5, 20.0, 1.0), Floor))?;
    for i in 0..5 {
        let y = 8.0 - i as f32 * 1.5;
        let entity = env.add_entity((
            Transform::at(i as f32 * 2.0 - 4.0, y, 1.0, 1.0),
            Velocity(Vec2::ZERO),
        ))?;
        env.entity_mut(entity)?.set_name(format!("box-{i}"));
    }

    let boxes = Archetype::spatial::<(Velocity,)>();
    while !env.fetch_all(&boxes).is_empty() && env.time().ticks() < 600 {
        env.update()?;
    }

    for entity in env.fetch_all(&Archetype::spatial::<(Landed,)>()) {
        if let Some(landed) = env.entity(entity) {
            println!("{landed} at {:?}", landed.position()?);
        }
    }
    println!("{} ticks simulated", env.time().ticks());

    #[cfg(feature = "diagnostics")]
    for timing in env.system_timings() {
        println!("{:>16}: {:?}", timing.name, timing.duration);
    }
    Ok(())
}
