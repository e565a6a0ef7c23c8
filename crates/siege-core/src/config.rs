//! Engine configuration
//!
//! Tunables for layout generation, actor motion, replay cadence and visual
//! effects. Every field has a default, so a RON file only needs to name the
//! values it overrides.

use crate::error::{Error, Result};
use crate::geometry::Position;
use crate::reconcile::EventSource;
use crate::time::Millis;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete engine configuration
///
/// # Example
///
/// ```
/// use siege_core::EngineConfig;
///
/// let config = EngineConfig::from_ron_str("(motion: (base_speed: 5.0))").unwrap();
/// assert_eq!(config.motion.base_speed, 5.0);
/// assert_eq!(config.layout.padding, 150.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub layout: LayoutConfig,
    pub motion: MotionConfig,
    pub timeline: TimelineConfig,
    pub effects: EffectConfig,
}

impl EngineConfig {
    /// Parse and validate a RON document
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: EngineConfig = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("layout.width", self.layout.width),
            ("layout.height", self.layout.height),
            ("motion.base_speed", self.motion.base_speed),
            ("motion.animation_rate", self.motion.animation_rate),
            ("timeline.unit_interval_ms", self.timeline.unit_interval_ms),
            ("timeline.clock_tick_ms", self.timeline.clock_tick_ms),
            ("effects.shake_interval_ms", self.effects.shake_interval_ms),
            ("effects.blink_interval_ms", self.effects.blink_interval_ms),
        ];
        for (name, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.layout.attempts == 0 {
            return Err(Error::InvalidConfig("layout.attempts must be at least 1".into()));
        }
        if !(self.motion.follow_lerp > 0.0 && self.motion.follow_lerp <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "motion.follow_lerp must be in (0, 1], got {}",
                self.motion.follow_lerp
            )));
        }
        let non_negative = [
            ("layout.padding", self.layout.padding),
            ("motion.arrive_radius", self.motion.arrive_radius),
            ("motion.settle_radius", self.motion.settle_radius),
            ("effects.shake_intensity", self.effects.shake_intensity),
            ("effects.shake_duration_ms", self.effects.shake_duration_ms),
            ("effects.live_retry_delay_ms", self.effects.live_retry_delay_ms),
            ("effects.replay_retry_delay_ms", self.effects.replay_retry_delay_ms),
        ];
        for (name, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{} must not be negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Target placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Canvas width; x is sampled in `[-width/2, width/2)`
    pub width: f64,
    pub height: f64,
    /// Minimum distance between targets
    pub padding: f64,
    /// Sampling attempts per target before accepting the last sample
    pub attempts: u32,
    /// How long a cached layout stays valid
    pub freshness_ms: i64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            padding: 150.0,
            attempts: 100,
            freshness_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Actor movement and animation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Units per frame at speed 1
    pub base_speed: f64,
    /// Distance at which an actor counts as arrived
    pub arrive_radius: f64,
    /// Animation playback rate at speed 1
    pub animation_rate: f64,
    /// Per-frame interpolation factor for remote actors
    pub follow_lerp: f64,
    /// Distance under which a followed actor settles
    pub settle_radius: f64,
    /// Where replay actors appear
    pub spawn_point: Position,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            base_speed: 3.0,
            arrive_radius: 100.0,
            animation_rate: 0.2,
            follow_lerp: 0.1,
            settle_radius: 1.0,
            spawn_point: Position::ORIGIN,
        }
    }
}

/// Replay cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Virtual time between consecutive events
    pub unit_interval_ms: Millis,
    /// Wall-clock period of virtual time publication
    pub clock_tick_ms: Millis,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            unit_interval_ms: 1000.0,
            clock_tick_ms: 100.0,
        }
    }
}

/// Visual effect timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Shake trigger period at speed 1
    pub shake_interval_ms: Millis,
    pub shake_intensity: f64,
    pub shake_duration_ms: Millis,
    pub blink_interval_ms: Millis,
    /// Delay before re-attacking after an incorrect submission (live)
    pub live_retry_delay_ms: Millis,
    /// Delay before re-attacking after an incorrect submission (replay)
    pub replay_retry_delay_ms: Millis,
}

impl EffectConfig {
    /// Retry delay for events coming from a source
    pub fn retry_delay(&self, source: EventSource) -> Millis {
        match source {
            EventSource::Live => self.live_retry_delay_ms,
            EventSource::Replay => self.replay_retry_delay_ms,
        }
    }
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            shake_interval_ms: 300.0,
            shake_intensity: 4.0,
            shake_duration_ms: 500.0,
            blink_interval_ms: 500.0,
            live_retry_delay_ms: 3000.0,
            replay_retry_delay_ms: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layout.attempts, 100);
        assert_eq!(config.timeline.unit_interval_ms, 1000.0);
        assert_eq!(config.effects.retry_delay(EventSource::Live), 3000.0);
        assert_eq!(config.effects.retry_delay(EventSource::Replay), 0.0);
    }

    #[test]
    fn test_partial_ron() {
        let config = EngineConfig::from_ron_str(
            "(layout: (padding: 80.0), effects: (replay_retry_delay_ms: 250.0))",
        )
        .unwrap();
        assert_eq!(config.layout.padding, 80.0);
        assert_eq!(config.layout.width, 800.0);
        assert_eq!(config.effects.replay_retry_delay_ms, 250.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_ron_str("(timeline: (unit_interval_ms: 0.0))").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = EngineConfig::from_ron_str("(layout: (attempts: 0))").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = EngineConfig::from_ron_str("(motion: (follow_lerp: 2.0))").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = EngineConfig::from_ron_str("(layout: ").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
