//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam)'s [`Vec2`] so users don't need to
//! depend on it directly. [`Bounds`] is an axis-aligned rectangle in world
//! space and [`Transform`] is the spatial component that gives an entity a
//! place in the world.
//!
//! Coordinates grow right and down: `origin` is the top-left corner, the
//! *position* of a bounds is its center.

pub use glam::Vec2;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    origin: Vec2,
    size: Vec2,
}

impl Bounds {
    /// Bounds centered on `position`.
    pub fn at_position(position: Vec2, size: Vec2) -> Self {
        Self {
            origin: position - size / 2.0,
            size,
        }
    }

    /// Bounds with the top-left corner at `origin`.
    pub fn at_origin(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    /// Center point.
    pub fn position(&self) -> Vec2 {
        self.origin + self.size / 2.0
    }

    /// Top-left corner.
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn width(&self) -> f32 {
        self.size.x
    }

    pub fn height(&self) -> f32 {
        self.size.y
    }

    /// Bottom-right corner.
    pub fn max(&self) -> Vec2 {
        self.origin + self.size
    }

    /// Same size, centered on `position`.
    pub fn moved_to(&self, position: Vec2) -> Self {
        Self::at_position(position, self.size)
    }

    pub fn moved_by(&self, delta: Vec2) -> Self {
        Self {
            origin: self.origin + delta,
            size: self.size,
        }
    }

    /// Edges count as inside.
    pub fn contains(&self, point: Vec2) -> bool {
        let max = self.max();
        self.origin.x <= point.x && max.x >= point.x && self.origin.y <= point.y && max.y >= point.y
    }

    /// Strict overlap; bounds that only share an edge do not intersect.
    pub fn intersects(&self, other: &Bounds) -> bool {
        let (max, other_max) = (self.max(), other.max());
        max.x > other.origin.x
            && self.origin.x < other_max.x
            && max.y > other.origin.y
            && self.origin.y < other_max.y
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::at_origin(Vec2::ZERO, Vec2::ZERO)
    }
}

/// Places an entity in the world. Entities without a `Transform` fail every
/// spatial accessor with [`StateError::MissingSpatialComponent`](crate::error::StateError).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub bounds: Bounds,
}

impl Transform {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    /// A transform centered on `(x, y)`.
    pub fn at(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(Bounds::at_position(Vec2::new(x, y), Vec2::new(width, height)))
    }

    pub fn position(&self) -> Vec2 {
        self.bounds.position()
    }
}
