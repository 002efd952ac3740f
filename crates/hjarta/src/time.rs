//! Tick timing.
//!
//! Every [`Environment`](crate::ecs::Environment) owns a [`Time`] that is
//! advanced at the start of each `update()`. Systems read it through
//! `env.time()` for the tick delta and total elapsed time.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Time {
    /// When the environment was created.
    startup: Instant,
    /// When the current tick started. `None` before the first tick.
    tick_start: Option<Instant>,
    /// Time between the previous tick and this one.
    delta: Duration,
    elapsed: Duration,
    ticks: u64,
}

impl Time {
    pub(crate) fn new() -> Self {
        Self {
            startup: Instant::now(),
            tick_start: None,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            ticks: 0,
        }
    }

    /// Call at the start of each tick.
    pub(crate) fn advance(&mut self) {
        let now = Instant::now();
        // The first tick has no predecessor, so its delta stays zero.
        if let Some(previous) = self.tick_start {
            self.delta = now - previous;
        }
        self.tick_start = Some(now);
        self.elapsed = now - self.startup;
        self.ticks += 1;
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Delta time in seconds, the usual factor for per-tick movement.
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Number of ticks started so far, including the current one.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks per second estimated from the last delta.
    pub fn ticks_per_second(&self) -> f32 {
        if self.delta.as_secs_f32() > 0.0 {
            1.0 / self.delta.as_secs_f32()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_has_zero_delta() {
        let mut time = Time::new();
        time.advance();
        assert_eq!(time.ticks(), 1);
        assert_eq!(time.delta(), Duration::ZERO);
        assert_eq!(time.ticks_per_second(), 0.0);
    }

    #[test]
    fn delta_measures_between_ticks() {
        let mut time = Time::new();
        time.advance();
        std::thread::sleep(Duration::from_millis(5));
        time.advance();
        assert_eq!(time.ticks(), 2);
        assert!(time.delta() >= Duration::from_millis(5));
        assert!(time.elapsed() >= time.delta());
    }
}
