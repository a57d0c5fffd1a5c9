//! Sprite data and the registry that owns every animal for the lifetime of a session.

use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::f32::consts::TAU;

use crate::{ConfigError, Position, pose::KeypointKind};

new_key_type! {
    /// Stable handle for sprites backed by a generational slot map.
    pub struct SpriteId;
}

/// Secondary displacement layered on top of directional movement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MovementPattern {
    /// Sinusoidal sway, phase driven by wall-clock seconds.
    Oscillation { amplitude: f32, frequency: f32 },
    /// Random nudge every frame. The bias is intentionally off-center; see DESIGN.md.
    Jitter { intensity: f32 },
    /// Circular drift.
    Loop { radius: f32, angular_speed: f32 },
    /// Occasional hop in a random direction, at most once per `interval` seconds.
    Jump {
        distance: f32,
        interval: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_jump: Option<f64>,
    },
}

impl MovementPattern {
    fn validate(&self) -> Result<(), ConfigError> {
        let ok = match *self {
            Self::Oscillation {
                amplitude,
                frequency,
            } => amplitude.is_finite() && frequency.is_finite(),
            Self::Jitter { intensity } => intensity.is_finite(),
            Self::Loop {
                radius,
                angular_speed,
            } => radius.is_finite() && angular_speed.is_finite(),
            Self::Jump {
                distance, interval, ..
            } => distance.is_finite() && interval.is_finite() && interval >= 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(ConfigError::Invalid(
                "movement pattern parameters must be finite",
            ))
        }
    }
}

/// Pose-driven following mode. Offsets are in display pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingBehavior {
    /// Follow a named keypoint of the primary pose.
    Keypoint {
        keypoint: KeypointKind,
        #[serde(default)]
        offset: Position,
    },
    /// Follow whichever wrist is raised to or above its elbow.
    RaisedPalm {
        #[serde(default)]
        offset: Position,
    },
}

/// Static per-sprite tuning. Never mutated after creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpriteTuning {
    /// Display pixels travelled per frame.
    pub speed: f32,
    /// Scale of the random heading wobble.
    pub randomness: f32,
    /// How strongly size reacts to the distance from the frame center.
    pub size_responsiveness: f32,
    /// Rotation is refreshed every `rotate_every` boundary bounces.
    pub rotate_every: u32,
    /// Heading response to device tilt.
    pub reaction_speed: f32,
}

impl Default for SpriteTuning {
    fn default() -> Self {
        Self {
            speed: 0.2,
            randomness: 0.3,
            size_responsiveness: 1.0,
            rotate_every: 5,
            reaction_speed: 0.1,
        }
    }
}

impl SpriteTuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.speed.is_finite() && self.speed >= 0.0) {
            return Err(ConfigError::Invalid("sprite speed must be non-negative"));
        }
        if !(self.randomness.is_finite()
            && self.size_responsiveness.is_finite()
            && self.reaction_speed.is_finite())
        {
            return Err(ConfigError::Invalid("sprite tuning values must be finite"));
        }
        if self.rotate_every == 0 {
            return Err(ConfigError::Invalid("rotate_every must be at least 1"));
        }
        Ok(())
    }
}

/// Everything needed to create a sprite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpriteConfig {
    pub name: String,
    /// Initial top-left corner in display pixels.
    pub start: Position,
    #[serde(default)]
    pub tuning: SpriteTuning,
    #[serde(default)]
    pub pattern: Option<MovementPattern>,
    #[serde(default)]
    pub tracking: Option<TrackingBehavior>,
}

impl SpriteConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, start: Position, tuning: SpriteTuning) -> Self {
        Self {
            name: name.into(),
            start,
            tuning,
            pattern: None,
            tracking: None,
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: MovementPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    #[must_use]
    pub fn with_tracking(mut self, tracking: TrackingBehavior) -> Self {
        self.tracking = Some(tracking);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("sprite name must not be empty"));
        }
        if !self.start.is_finite() {
            return Err(ConfigError::Invalid("sprite start must be finite"));
        }
        self.tuning.validate()?;
        if let Some(pattern) = &self.pattern {
            pattern.validate()?;
        }
        let offset = match &self.tracking {
            Some(TrackingBehavior::Keypoint { offset, .. } | TrackingBehavior::RaisedPalm { offset }) => {
                Some(*offset)
            }
            None => None,
        };
        if offset.is_some_and(|offset| !offset.is_finite()) {
            return Err(ConfigError::Invalid("tracking offset must be finite"));
        }
        Ok(())
    }

    /// The four insects shipped by default: beetle, lachticek, kudlanka and blecha.
    #[must_use]
    pub fn default_roster() -> Vec<Self> {
        vec![
            Self::new(
                "beetle",
                Position::new(150.0, 100.0),
                SpriteTuning {
                    speed: 0.1,
                    randomness: 0.3,
                    size_responsiveness: 1.2,
                    rotate_every: 3,
                    reaction_speed: 0.1,
                },
            )
            .with_pattern(MovementPattern::Oscillation {
                amplitude: 1.0,
                frequency: 0.05,
            }),
            Self::new(
                "lachticek",
                Position::new(300.0, 200.0),
                SpriteTuning {
                    speed: 0.2,
                    randomness: 0.2,
                    size_responsiveness: 0.5,
                    rotate_every: 5,
                    reaction_speed: 0.5,
                },
            )
            .with_pattern(MovementPattern::Jump {
                distance: 5.0,
                interval: 1.0,
                last_jump: None,
            }),
            Self::new(
                "kudlanka",
                Position::new(300.0, 200.0),
                SpriteTuning {
                    speed: 0.3,
                    randomness: 0.4,
                    size_responsiveness: 0.9,
                    rotate_every: 7,
                    reaction_speed: 0.03,
                },
            )
            .with_pattern(MovementPattern::Loop {
                radius: 1.0,
                angular_speed: 0.1,
            }),
            Self::new(
                "blecha",
                Position::new(300.0, 200.0),
                SpriteTuning {
                    speed: 0.4,
                    randomness: 0.4,
                    size_responsiveness: 0.2,
                    rotate_every: 5,
                    reaction_speed: 0.03,
                },
            )
            .with_pattern(MovementPattern::Loop {
                radius: 5.0,
                angular_speed: 0.5,
            }),
        ]
    }
}

/// Mutable state of a single animal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sprite {
    pub name: String,
    /// Top-left corner in display pixels.
    pub position: Position,
    /// Heading in radians. Never normalised.
    pub direction: f32,
    /// Width and height in display pixels, recomputed every frame.
    pub size: f32,
    pub growing: bool,
    /// Boundary bounces so far.
    pub direction_changes: u64,
    pub tuning: SpriteTuning,
    /// Effective speed; differs from `tuning.speed` only while escaping.
    pub speed: f32,
    pub pattern: Option<MovementPattern>,
    pub tracking: Option<TrackingBehavior>,
    pub escaping: bool,
    pub tracking_active: bool,
    /// Displayed rotation in degrees.
    pub rotation_degrees: f32,
    /// Bounce counter value at the last rotation refresh.
    pub rotated_at: u64,
    /// Host timestamp (seconds) until which the sprite is not drawn.
    pub hidden_until: Option<f64>,
}

impl Sprite {
    /// Build a sprite from configuration with a random initial heading.
    pub fn create<R: Rng + ?Sized>(config: &SpriteConfig, base_size: f32, rng: &mut R) -> Self {
        let direction = rng.random_range(0.0..TAU);
        Self {
            name: config.name.clone(),
            position: config.start,
            direction,
            size: base_size,
            growing: true,
            direction_changes: 0,
            tuning: config.tuning,
            speed: config.tuning.speed,
            pattern: config.pattern,
            tracking: config.tracking,
            escaping: false,
            tracking_active: false,
            rotation_degrees: direction.to_degrees(),
            rotated_at: 0,
            hidden_until: None,
        }
    }

    /// Center of the sprite's footprint.
    #[must_use]
    pub fn center(&self) -> Position {
        Position::new(
            self.position.x + self.size * 0.5,
            self.position.y + self.size * 0.5,
        )
    }

    #[must_use]
    pub fn is_visible(&self, now: f64) -> bool {
        self.hidden_until.is_none_or(|until| now >= until)
    }
}

/// Dense sprite storage with generational handles.
///
/// Sprites are only ever added; iteration order is insertion order.
#[derive(Debug, Default)]
pub struct SpriteRegistry {
    slots: SlotMap<SpriteId, usize>,
    handles: Vec<SpriteId>,
    sprites: Vec<Sprite>,
}

impl SpriteRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            handles: Vec::with_capacity(capacity),
            sprites: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    /// Validate `config`, construct the sprite and store it.
    pub fn create<R: Rng + ?Sized>(
        &mut self,
        config: &SpriteConfig,
        base_size: f32,
        rng: &mut R,
    ) -> Result<SpriteId, ConfigError> {
        config.validate()?;
        if self.find(&config.name).is_some() {
            return Err(ConfigError::DuplicateSprite(config.name.clone()));
        }
        Ok(self.insert(Sprite::create(config, base_size, rng)))
    }

    /// Store an already constructed sprite.
    pub fn insert(&mut self, sprite: Sprite) -> SpriteId {
        let index = self.sprites.len();
        self.sprites.push(sprite);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    #[must_use]
    pub fn contains(&self, id: SpriteId) -> bool {
        self.slots.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: SpriteId) -> Option<&Sprite> {
        let index = *self.slots.get(id)?;
        self.sprites.get(index)
    }

    pub fn get_mut(&mut self, id: SpriteId) -> Option<&mut Sprite> {
        let index = *self.slots.get(id)?;
        self.sprites.get_mut(index)
    }

    /// Look up a sprite handle by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<SpriteId> {
        self.sprites
            .iter()
            .position(|sprite| sprite.name == name)
            .map(|index| self.handles[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpriteId, &Sprite)> + '_ {
        self.handles.iter().copied().zip(self.sprites.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SpriteId, &mut Sprite)> + '_ {
        self.handles.iter().copied().zip(self.sprites.iter_mut())
    }

    /// Visit every sprite in insertion order.
    pub fn for_each(&mut self, mut visit: impl FnMut(SpriteId, &mut Sprite)) {
        for (id, sprite) in self.iter_mut() {
            visit(id, sprite);
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Sprite] {
        &self.sprites
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [Sprite] {
        &mut self.sprites
    }
}
