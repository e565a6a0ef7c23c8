//! Virtual time for replay playback
//!
//! Provides the clock the replay engine runs on:
//! - `Millis` - wall-clock or virtual milliseconds
//! - `Speed` - discrete playback rate
//! - `VirtualClock` - wall-clock anchored virtual time with pause and seek

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds, either wall-clock (as supplied by the shell) or virtual
pub type Millis = f64;

/// Playback speed settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Speed {
    /// Real time (1x)
    #[default]
    Normal,
    /// 1.5x
    Quick,
    /// 2x
    Double,
    /// 2.5x
    Rapid,
    /// 3x
    Triple,
}

impl Speed {
    /// All speeds in cycling order
    pub const ALL: [Speed; 5] = [
        Speed::Normal,
        Speed::Quick,
        Speed::Double,
        Speed::Rapid,
        Speed::Triple,
    ];

    /// Get the multiplier applied to virtual time
    pub fn multiplier(&self) -> f64 {
        match self {
            Speed::Normal => 1.0,
            Speed::Quick => 1.5,
            Speed::Double => 2.0,
            Speed::Rapid => 2.5,
            Speed::Triple => 3.0,
        }
    }

    /// Look up the speed for an exact multiplier
    pub fn from_multiplier(multiplier: f64) -> Option<Speed> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| (s.multiplier() - multiplier).abs() < f64::EPSILON)
    }

    /// The next speed in the cycle, wrapping back to normal
    pub fn next(&self) -> Speed {
        let index = Self::ALL.iter().position(|s| s == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.multiplier())
    }
}

/// Virtual clock anchored to wall-clock time
///
/// While running, virtual time is `(wall - anchor) * speed`, clamped to
/// `[0, total]`. While stopped it is frozen. Every operation that changes
/// speed or position re-anchors so that virtual time stays continuous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualClock {
    anchor: Millis,
    speed: Speed,
    running: bool,
    frozen: Millis,
    total: Millis,
}

impl VirtualClock {
    /// Create a stopped clock covering `total` virtual milliseconds
    pub fn new(total: Millis) -> Self {
        Self {
            anchor: 0.0,
            speed: Speed::Normal,
            running: false,
            frozen: 0.0,
            total: total.max(0.0),
        }
    }

    /// Total virtual duration
    pub fn total(&self) -> Millis {
        self.total
    }

    /// Replace the total virtual duration
    pub fn set_total(&mut self, total: Millis) {
        self.total = total.max(0.0);
        self.frozen = self.frozen.min(self.total);
    }

    /// Current speed
    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// Check whether the clock is advancing
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Virtual time at the given wall-clock instant
    pub fn now(&self, wall: Millis) -> Millis {
        if self.running {
            ((wall - self.anchor) * self.speed.multiplier()).clamp(0.0, self.total)
        } else {
            self.frozen
        }
    }

    /// Start running so that virtual time equals `offset` at `wall`
    pub fn start(&mut self, wall: Millis, offset: Millis) {
        let offset = offset.clamp(0.0, self.total);
        self.anchor = wall - offset / self.speed.multiplier();
        self.frozen = offset;
        self.running = true;
    }

    /// Freeze the clock, returning the virtual time it froze at
    pub fn pause(&mut self, wall: Millis) -> Millis {
        self.frozen = self.now(wall);
        self.running = false;
        self.frozen
    }

    /// Continue from the frozen virtual time
    pub fn resume(&mut self, wall: Millis) {
        let frozen = self.frozen;
        self.start(wall, frozen);
    }

    /// Change speed without a jump in virtual time
    pub fn set_speed(&mut self, wall: Millis, speed: Speed) {
        if self.running {
            let current = self.now(wall);
            self.speed = speed;
            self.anchor = wall - current / speed.multiplier();
        } else {
            self.speed = speed;
        }
    }

    /// Jump to a virtual time, keeping the running state
    pub fn seek(&mut self, wall: Millis, virtual_time: Millis) {
        let target = virtual_time.clamp(0.0, self.total);
        self.frozen = target;
        if self.running {
            self.anchor = wall - target / self.speed.multiplier();
        }
    }

    /// Check whether virtual time has reached the end
    pub fn is_finished(&self, wall: Millis) -> bool {
        self.now(wall) >= self.total
    }

    /// Stop and rewind to zero at normal speed
    pub fn reset(&mut self) {
        self.anchor = 0.0;
        self.frozen = 0.0;
        self.running = false;
        self.speed = Speed::Normal;
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_cycle() {
        assert_eq!(Speed::Normal.next(), Speed::Quick);
        assert_eq!(Speed::Triple.next(), Speed::Normal);
        assert_eq!(Speed::from_multiplier(2.5), Some(Speed::Rapid));
        assert_eq!(Speed::from_multiplier(4.0), None);
        assert_eq!(Speed::Quick.to_string(), "1.5x");
    }

    #[test]
    fn test_clock_runs_scaled() {
        let mut clock = VirtualClock::new(10_000.0);
        clock.set_speed(0.0, Speed::Double);
        clock.start(1_000.0, 0.0);
        assert_eq!(clock.now(1_500.0), 1_000.0);
        assert_eq!(clock.now(100_000.0), 10_000.0);
        assert!(clock.is_finished(100_000.0));
    }

    #[test]
    fn test_pause_freezes() {
        let mut clock = VirtualClock::new(10_000.0);
        clock.start(0.0, 0.0);
        assert_eq!(clock.pause(2_000.0), 2_000.0);
        assert_eq!(clock.now(9_000.0), 2_000.0);

        clock.resume(9_000.0);
        assert_eq!(clock.now(9_500.0), 2_500.0);
    }

    #[test]
    fn test_speed_change_is_continuous() {
        let mut clock = VirtualClock::new(60_000.0);
        clock.start(0.0, 0.0);
        let before = clock.now(3_000.0);
        clock.set_speed(3_000.0, Speed::Triple);
        let after = clock.now(3_000.0);
        assert!((before - after).abs() < 1e-9);
        assert!((clock.now(4_000.0) - 6_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_seek_reanchors() {
        let mut clock = VirtualClock::new(60_000.0);
        clock.start(0.0, 0.0);
        clock.seek(1_000.0, 20_000.0);
        assert_eq!(clock.now(1_000.0), 20_000.0);
        assert_eq!(clock.now(2_000.0), 21_000.0);

        clock.pause(2_000.0);
        clock.seek(5_000.0, 500.0);
        assert_eq!(clock.now(50_000.0), 500.0);
    }
}
