//! Playback settings shared by the user and remote tool calls

use serde::{Deserialize, Serialize};

/// Lowest supported playback speed
pub const MIN_SPEED: f32 = 0.5;

/// Highest supported playback speed
pub const MAX_SPEED: f32 = 2.0;

/// Volume and speed applied to scheduled audio
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AudioSettings {
    volume: f32,
    speed: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            speed: 1.0,
        }
    }
}

impl AudioSettings {
    /// Create settings, clamping volume to [0, 1] and speed to [0.5, 2.0]
    #[must_use]
    pub fn new(volume: f32, speed: f32) -> Self {
        Self::default().with_volume(volume).with_speed(speed)
    }

    /// Volume in [0, 1]
    #[must_use]
    pub const fn volume(&self) -> f32 {
        self.volume
    }

    /// Playback-rate multiplier in [0.5, 2.0]
    #[must_use]
    pub const fn speed(&self) -> f32 {
        self.speed
    }

    /// Replace the volume
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            self.volume
        };
        self
    }

    /// Replace the volume from a 0-100 percentage
    #[must_use]
    pub fn with_volume_percent(self, level: f32) -> Self {
        self.with_volume(level / 100.0)
    }

    /// Replace the speed
    #[must_use]
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = if speed.is_finite() {
            speed.clamp(MIN_SPEED, MAX_SPEED)
        } else {
            self.speed
        };
        self
    }
}
