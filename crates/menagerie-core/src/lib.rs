//! Core simulation types for the Menagerie camera overlay.
//!
//! Everything in this crate is synchronous and host-agnostic. A host (the native app or the
//! browser handle) reads the frame bounds, sensor state and latest pose snapshot once per
//! display refresh, advances the [`Habitat`] through a [`FrameScheduler`], and forwards the
//! resulting [`RenderFrame`] to whatever paints the sprites.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

mod habitat;
pub mod pose;
mod scheduler;
pub mod sensors;
pub mod sprite;

pub use habitat::{Habitat, StepReport};
pub use pose::{Keypoint, KeypointKind, Pose, PoseConfig, PoseSnapshot, PoseThrottle};
pub use scheduler::{CommandOutcome, ControlCommand, FrameScheduler, TickOutcome};
pub use sensors::{
    CameraFacing, MotionSample, OrientationSample, SensorAdapter, SensorConfig, SensorState,
    Session, ShakeDetector,
};
pub use sprite::{
    MovementPattern, Sprite, SpriteConfig, SpriteId, SpriteRegistry, SpriteTuning,
    TrackingBehavior,
};

/// Simulation clock (frames processed since start).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// 2D point in display pixels. Also used for offsets.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Rectangle of the rendering surface in display coordinates.
///
/// Read fresh every frame; the camera element can move or resize at any time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FrameBounds {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl FrameBounds {
    #[must_use]
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    #[must_use]
    pub fn center(&self) -> Position {
        Position::new(
            self.left + self.width * 0.5,
            self.top + self.height * 0.5,
        )
    }

    /// Half of the diagonal: the distance from the center to any corner.
    #[must_use]
    pub fn half_diagonal(&self) -> f32 {
        (self.width * 0.5).hypot(self.height * 0.5)
    }

    /// True when the rectangle cannot host sprites (empty, negative or non-finite).
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !(self.left.is_finite()
            && self.top.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0)
    }

    /// Allowed range for a sprite's left edge given its footprint.
    #[must_use]
    pub fn x_range(&self, footprint: f32) -> (f32, f32) {
        (self.left, self.right() - footprint)
    }

    /// Allowed range for a sprite's top edge given its footprint.
    #[must_use]
    pub fn y_range(&self, footprint: f32) -> (f32, f32) {
        (self.top, self.bottom() - footprint)
    }

    /// Clamp a sprite origin so its footprint stays inside the rectangle.
    ///
    /// When the footprint is larger than the frame the origin pins to the left/top edge.
    #[must_use]
    pub fn clamp_origin(&self, origin: Position, footprint: f32) -> Position {
        let (min_x, max_x) = self.x_range(footprint);
        let (min_y, max_y) = self.y_range(footprint);
        Position::new(origin.x.min(max_x).max(min_x), origin.y.min(max_y).max(min_y))
    }

    /// True when the origin sits on or beyond any edge.
    #[must_use]
    pub fn touches_edge(&self, origin: Position, footprint: f32) -> bool {
        let (min_x, max_x) = self.x_range(footprint);
        let (min_y, max_y) = self.y_range(footprint);
        origin.x <= min_x || origin.x >= max_x || origin.y <= min_y || origin.y >= max_y
    }
}

/// Errors raised while validating configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    /// Sprite names double as stable identifiers and must be unique.
    #[error("duplicate sprite name: {0}")]
    DuplicateSprite(String),
}

/// Tunables for the per-frame behaviour pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Minimum keypoint score for a tracking target.
    pub tracking_confidence: f32,
    /// Minimum overall pose score before a person repels sprites.
    pub person_confidence: f32,
    /// Minimum keypoint score for a point to count toward a person's bounding box.
    pub keypoint_confidence: f32,
    /// Fraction of the remaining distance covered per frame when following a keypoint.
    pub keypoint_follow_gain: f32,
    /// Fraction of the remaining distance covered per frame when following a raised palm.
    pub palm_follow_gain: f32,
    /// Display pixels added on every side of a person's keypoint box.
    pub avoidance_margin: f32,
    /// Nominal push (display pixels per frame) applied to a sprite inside a person's box.
    pub repulsion_strength: f32,
    /// Speed multiplier while escaping a person.
    pub escape_speed_multiplier: f32,
    /// Sprite size at the edge of the inscribed circle.
    pub base_size: f32,
    /// Extra size gained at the frame center, scaled by the sprite's responsiveness.
    pub size_range: f32,
    /// Chance that an edge teleport also hides the sprite.
    pub teleport_hide_probability: f32,
    /// How long a teleported sprite stays hidden, in milliseconds.
    pub teleport_hide_ms: u32,
    /// Collision threshold as a fraction of the pair's average size.
    pub collision_distance_factor: f32,
    /// Largest positional correction applied to each sprite of a colliding pair per frame.
    pub collision_max_step: f32,
    /// Angular offset (radians) added to the separating heading after a collision.
    pub collision_turn_offset: f32,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            tracking_confidence: 0.3,
            person_confidence: 0.3,
            keypoint_confidence: 0.2,
            keypoint_follow_gain: 0.15,
            palm_follow_gain: 0.20,
            avoidance_margin: 50.0,
            repulsion_strength: 5.0,
            escape_speed_multiplier: 2.0,
            base_size: 50.0,
            size_range: 80.0,
            teleport_hide_probability: 0.2,
            teleport_hide_ms: 800,
            collision_distance_factor: 0.8,
            collision_max_step: 5.0,
            collision_turn_offset: 0.35,
        }
    }
}

impl BehaviorConfig {
    /// Validates ranges that the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scores = [
            self.tracking_confidence,
            self.person_confidence,
            self.keypoint_confidence,
        ];
        if scores.iter().any(|score| !(0.0..=1.0).contains(score)) {
            return Err(ConfigError::Invalid(
                "confidence thresholds must lie in [0, 1]",
            ));
        }
        let gains = [self.keypoint_follow_gain, self.palm_follow_gain];
        if gains.iter().any(|gain| !(*gain > 0.0 && *gain <= 1.0)) {
            return Err(ConfigError::Invalid("follow gains must lie in (0, 1]"));
        }
        if !(self.avoidance_margin.is_finite() && self.avoidance_margin > 0.0) {
            return Err(ConfigError::Invalid("avoidance_margin must be positive"));
        }
        if !(self.repulsion_strength.is_finite() && self.repulsion_strength >= 0.0) {
            return Err(ConfigError::Invalid(
                "repulsion_strength must be non-negative",
            ));
        }
        if !(self.escape_speed_multiplier.is_finite() && self.escape_speed_multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                "escape_speed_multiplier must be at least 1",
            ));
        }
        if !(self.base_size.is_finite() && self.base_size > 0.0) {
            return Err(ConfigError::Invalid("base_size must be positive"));
        }
        if !(self.size_range.is_finite() && self.size_range >= 0.0) {
            return Err(ConfigError::Invalid("size_range must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.teleport_hide_probability) {
            return Err(ConfigError::Invalid(
                "teleport_hide_probability must lie in [0, 1]",
            ));
        }
        if !(self.collision_distance_factor.is_finite() && self.collision_distance_factor > 0.0) {
            return Err(ConfigError::Invalid(
                "collision_distance_factor must be positive",
            ));
        }
        if !(self.collision_max_step.is_finite() && self.collision_max_step > 0.0) {
            return Err(ConfigError::Invalid("collision_max_step must be positive"));
        }
        if !self.collision_turn_offset.is_finite() {
            return Err(ConfigError::Invalid("collision_turn_offset must be finite"));
        }
        Ok(())
    }

    /// Hide window after a disappearing teleport, in seconds.
    #[must_use]
    pub fn teleport_hide_seconds(&self) -> f64 {
        f64::from(self.teleport_hide_ms) / 1_000.0
    }
}

/// Static configuration for a Menagerie session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MenagerieConfig {
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    pub behavior: BehaviorConfig,
    pub sensors: SensorConfig,
    pub pose: PoseConfig,
    /// Animals created at startup, in iteration order.
    pub sprites: Vec<SpriteConfig>,
}

impl Default for MenagerieConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            behavior: BehaviorConfig::default(),
            sensors: SensorConfig::default(),
            pose: PoseConfig::default(),
            sprites: SpriteConfig::default_roster(),
        }
    }
}

impl MenagerieConfig {
    /// Validates every section and the sprite roster.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.behavior.validate()?;
        self.sensors.validate()?;
        self.pose.validate()?;
        let mut names = HashSet::with_capacity(self.sprites.len());
        for sprite in &self.sprites {
            sprite.validate()?;
            if !names.insert(sprite.name.as_str()) {
                return Err(ConfigError::DuplicateSprite(sprite.name.clone()));
            }
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Final per-sprite placement handed to the render sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpriteFrame {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation_degrees: f32,
    pub visible: bool,
}

/// Everything a renderer needs to paint one frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderFrame {
    pub tick: u64,
    /// Host timestamp in seconds.
    pub timestamp: f64,
    pub sprites: Vec<SpriteFrame>,
}

/// Receives the final placement of every sprite once per frame.
pub trait RenderSink {
    fn present(&mut self, frame: &RenderFrame);
}

/// Sink that drops every frame.
#[derive(Debug, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn present(&mut self, _frame: &RenderFrame) {}
}

/// Sink that keeps only the most recent frame, for hosts that pull instead of push.
#[derive(Debug, Default)]
pub struct LatestFrameSink {
    frame: Option<RenderFrame>,
}

impl LatestFrameSink {
    #[must_use]
    pub fn frame(&self) -> Option<&RenderFrame> {
        self.frame.as_ref()
    }

    pub fn take(&mut self) -> Option<RenderFrame> {
        self.frame.take()
    }
}

impl RenderSink for LatestFrameSink {
    fn present(&mut self, frame: &RenderFrame) {
        self.frame = Some(frame.clone());
    }
}

impl<S: RenderSink + ?Sized> RenderSink for Box<S> {
    fn present(&mut self, frame: &RenderFrame) {
        (**self).present(frame);
    }
}
