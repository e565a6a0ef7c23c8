//! 2-D map coordinates

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the map, in scene units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// The map origin
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    /// Create a new position
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: Position) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Linear interpolation towards `other` by `amount` (0.0 = self, 1.0 = other)
    pub fn lerp(&self, other: Position, amount: f64) -> Position {
        Position {
            x: (1.0 - amount) * self.x + amount * other.x,
            y: (1.0 - amount) * self.y + amount * other.y,
        }
    }

    /// Advance `step` units along the direction to `other`
    ///
    /// Returns `self` unchanged when both points coincide.
    pub fn step_towards(&self, other: Position, step: f64) -> Position {
        let distance = self.distance_to(other);
        if distance == 0.0 {
            return *self;
        }
        Position {
            x: self.x + (other.x - self.x) / distance * step,
            y: self.y + (other.y - self.y) / distance * step,
        }
    }

    /// Translate by an offset
    pub fn offset(&self, dx: f64, dy: f64) -> Position {
        Position {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_eq!(a.distance_to(b), 5.0);
    }

    #[test]
    fn test_lerp() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(10.0, -10.0);
        assert_eq!(a.lerp(b, 0.1), Position::new(1.0, -1.0));
        assert_eq!(a.lerp(b, 1.0), b);
    }

    #[test]
    fn test_step_towards() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(30.0, 40.0);
        assert_eq!(a.step_towards(b, 5.0), Position::new(3.0, 4.0));
        assert_eq!(a.step_towards(a, 5.0), a);
    }
}
