//! The per-frame behaviour pipeline.

use rand::{Rng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};
use tracing::{debug, info, trace};

use crate::pose::{DisplayScale, PoseSnapshot};
use crate::sensors::SensorState;
use crate::sprite::{MovementPattern, Sprite, SpriteRegistry, TrackingBehavior};
use crate::{
    BehaviorConfig, ConfigError, FrameBounds, MenagerieConfig, Position, RenderFrame,
    SpriteFrame, Tick,
};

/// Teleported sprites land this far inside the opposite edge so they do not bounce straight back.
const TELEPORT_INSET: f32 = 1.0;

/// Counters describing what happened during one [`Habitat::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub tick: Tick,
    /// True when the frame bounds were unusable and nothing moved.
    pub skipped: bool,
    pub bounces: usize,
    pub teleports: usize,
    pub hidden: usize,
    pub collisions: usize,
    pub respawns: usize,
    pub tracking: usize,
    pub escaping: usize,
}

/// Inputs shared by every sprite within one frame.
struct FrameContext<'a> {
    config: &'a BehaviorConfig,
    bounds: FrameBounds,
    sensors: SensorState,
    poses: Option<&'a PoseSnapshot>,
    scale: Option<DisplayScale>,
    now: f64,
}

/// Owns every sprite plus the RNG that drives them.
#[derive(Debug)]
pub struct Habitat {
    config: BehaviorConfig,
    tick: Tick,
    rng: SmallRng,
    sprites: SpriteRegistry,
    resets: u64,
}

impl Habitat {
    /// Validate `config` and create its roster.
    pub fn new(config: &MenagerieConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let mut sprites = SpriteRegistry::with_capacity(config.sprites.len());
        for sprite in &config.sprites {
            sprites.create(sprite, config.behavior.base_size, &mut rng)?;
        }
        Ok(Self {
            config: config.behavior.clone(),
            tick: Tick::zero(),
            rng,
            sprites,
            resets: 0,
        })
    }

    #[must_use]
    pub fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Number of shake or manual resets applied so far.
    #[must_use]
    pub const fn resets(&self) -> u64 {
        self.resets
    }

    #[must_use]
    pub fn sprites(&self) -> &SpriteRegistry {
        &self.sprites
    }

    pub fn sprites_mut(&mut self) -> &mut SpriteRegistry {
        &mut self.sprites
    }

    /// Advance every sprite by one frame.
    pub fn step(
        &mut self,
        bounds: FrameBounds,
        sensors: &SensorState,
        poses: Option<&PoseSnapshot>,
        now: f64,
    ) -> StepReport {
        self.tick = self.tick.next();
        let mut report = StepReport {
            tick: self.tick,
            ..StepReport::default()
        };
        if bounds.is_degenerate() {
            debug!(tick = self.tick.0, ?bounds, "skipping frame with unusable bounds");
            report.skipped = true;
            return report;
        }

        let ctx = FrameContext {
            config: &self.config,
            bounds,
            sensors: *sensors,
            poses,
            scale: poses.and_then(|snapshot| snapshot.display_scale(&bounds)),
            now,
        };
        for sprite in self.sprites.as_mut_slice() {
            update_sprite(sprite, &ctx, &mut self.rng, &mut report);
        }
        report.collisions = resolve_pairs(self.sprites.as_mut_slice(), &self.config);
        settle(self.sprites.as_mut_slice(), &bounds);

        trace!(
            tick = report.tick.0,
            bounces = report.bounces,
            teleports = report.teleports,
            hidden = report.hidden,
            collisions = report.collisions,
            respawns = report.respawns,
            tracking = report.tracking,
            escaping = report.escaping,
            "habitat step"
        );
        report
    }

    /// Run only the pairwise collision pass; returns the number of pairs separated.
    pub fn resolve_collisions(&mut self) -> usize {
        resolve_pairs(self.sprites.as_mut_slice(), &self.config)
    }

    /// Send every sprite to a corner (cycling by index) with a fresh random heading.
    pub fn reset_to_corners(&mut self, bounds: FrameBounds) {
        let inset = self.config.base_size;
        let corners = [
            Position::new(0.0, 0.0),
            Position::new(bounds.width - inset, 0.0),
            Position::new(0.0, bounds.height - inset),
            Position::new(bounds.width - inset, bounds.height - inset),
        ];
        for (index, sprite) in self.sprites.as_mut_slice().iter_mut().enumerate() {
            let corner = corners[index % corners.len()];
            sprite.position = Position::new(bounds.left + corner.x, bounds.top + corner.y);
            sprite.direction = self.rng.random_range(0.0..TAU);
            sprite.hidden_until = None;
        }
        self.resets += 1;
        info!(resets = self.resets, sprites = self.sprites.len(), "sprites reset to corners");
    }

    /// Snapshot of every sprite for the render sink.
    #[must_use]
    pub fn render_frame(&self, now: f64) -> RenderFrame {
        RenderFrame {
            tick: self.tick.0,
            timestamp: now,
            sprites: self
                .sprites
                .as_slice()
                .iter()
                .map(|sprite| SpriteFrame {
                    name: sprite.name.clone(),
                    x: sprite.position.x,
                    y: sprite.position.y,
                    width: sprite.size,
                    height: sprite.size,
                    rotation_degrees: sprite.rotation_degrees,
                    visible: sprite.is_visible(now),
                })
                .collect(),
        }
    }
}

fn update_sprite(
    sprite: &mut Sprite,
    ctx: &FrameContext<'_>,
    rng: &mut SmallRng,
    report: &mut StepReport,
) {
    let target = tracking_target(sprite, ctx);
    sprite.tracking_active = target.is_some();

    if let Some((target, gain)) = target {
        if sprite.escaping {
            sprite.escaping = false;
            sprite.speed = sprite.tuning.speed;
        }
        sprite.position.x += (target.x - sprite.position.x) * gain;
        sprite.position.y += (target.y - sprite.position.y) * gain;
        report.tracking += 1;
    } else {
        drift(sprite, &ctx.sensors, rng);
        avoid_people(sprite, ctx, rng);
        if integrate(sprite, &ctx.bounds, rng) {
            report.bounces += 1;
        }
        if !sprite.escaping {
            apply_pattern(sprite, ctx.now, rng);
        }
        if sprite.escaping {
            report.escaping += 1;
        }
    }

    if guard_finite(sprite, &ctx.bounds, rng) {
        report.respawns += 1;
    }
    sprite.position = ctx.bounds.clamp_origin(sprite.position, sprite.size);
    sprite.size = size_for(sprite, &ctx.bounds, ctx.config);
    refresh_rotation(sprite);

    if !sprite.tracking_active
        && let Some(hidden) = teleport(sprite, ctx, rng)
    {
        report.teleports += 1;
        if hidden {
            report.hidden += 1;
        }
    }
}

/// Target position and follow gain when the sprite's tracking condition holds this frame.
fn tracking_target(sprite: &Sprite, ctx: &FrameContext<'_>) -> Option<(Position, f32)> {
    let behavior = sprite.tracking?;
    let scale = ctx.scale?;
    let pose = ctx.poses?.primary()?;
    let threshold = ctx.config.tracking_confidence;
    let (keypoint, offset, gain) = match behavior {
        TrackingBehavior::Keypoint { keypoint, offset } => (
            pose.confident(keypoint, threshold)?,
            offset,
            ctx.config.keypoint_follow_gain,
        ),
        TrackingBehavior::RaisedPalm { offset } => (
            pose.raised_palm(threshold)?,
            offset,
            ctx.config.palm_follow_gain,
        ),
    };
    let anchor = scale.apply(keypoint.position());
    Some((Position::new(anchor.x + offset.x, anchor.y + offset.y), gain))
}

fn drift(sprite: &mut Sprite, sensors: &SensorState, rng: &mut SmallRng) {
    let wobble = (rng.random::<f32>() - 0.5) * sprite.tuning.randomness;
    let tilt = sprite.tuning.reaction_speed * (sensors.tilt_x / 90.0);
    sprite.direction += wobble + tilt;
}

/// Push the sprite out of every confidently detected person's box and head it away from the
/// box center.
fn avoid_people(sprite: &mut Sprite, ctx: &FrameContext<'_>, rng: &mut SmallRng) {
    let mut inside = false;
    if let (Some(snapshot), Some(scale)) = (ctx.poses, ctx.scale) {
        let margin = ctx.config.avoidance_margin;
        let strength = ctx.config.repulsion_strength;
        for pose in snapshot
            .poses
            .iter()
            .filter(|pose| pose.score > ctx.config.person_confidence)
        {
            let Some((min, max)) = person_box(pose, &scale, ctx.config.keypoint_confidence)
            else {
                continue;
            };
            let (min_x, min_y) = (min.x - margin, min.y - margin);
            let (max_x, max_y) = (max.x + margin, max.y + margin);
            let center = sprite.center();
            if center.x < min_x || center.x > max_x || center.y < min_y || center.y > max_y {
                continue;
            }
            inside = true;

            let box_center = Position::new((min_x + max_x) * 0.5, (min_y + max_y) * 0.5);
            let (dx, dy) = (center.x - box_center.x, center.y - box_center.y);
            let (angle, push) = if dx == 0.0 && dy == 0.0 {
                (rng.random_range(0.0..TAU), strength)
            } else {
                let edge_distance = (center.x - min_x)
                    .min(max_x - center.x)
                    .min(center.y - min_y)
                    .min(max_y - center.y);
                let push = (strength / (1.0 + edge_distance / margin)).max(strength * 0.5);
                (dy.atan2(dx), push)
            };
            sprite.direction = angle;
            sprite.position.x += angle.cos() * push;
            sprite.position.y += angle.sin() * push;
        }
    }

    if inside {
        sprite.escaping = true;
        sprite.speed = sprite.tuning.speed * ctx.config.escape_speed_multiplier;
    } else if sprite.escaping {
        sprite.escaping = false;
        sprite.speed = sprite.tuning.speed;
    }
}

/// Display-space box around the keypoints that score above `threshold`.
fn person_box(
    pose: &crate::Pose,
    scale: &DisplayScale,
    threshold: f32,
) -> Option<(Position, Position)> {
    pose.keypoints
        .iter()
        .filter(|keypoint| keypoint.score > threshold && keypoint.position().is_finite())
        .map(|keypoint| scale.apply(keypoint.position()))
        .fold(None, |acc, point| match acc {
            None => Some((point, point)),
            Some((min, max)) => Some((
                Position::new(min.x.min(point.x), min.y.min(point.y)),
                Position::new(max.x.max(point.x), max.y.max(point.y)),
            )),
        })
}

/// Move along the heading. Returns `true` when the move reached an edge and the sprite bounced.
fn integrate(sprite: &mut Sprite, bounds: &FrameBounds, rng: &mut SmallRng) -> bool {
    sprite.position.x += sprite.speed * sprite.direction.cos();
    sprite.position.y += sprite.speed * sprite.direction.sin();
    if !bounds.touches_edge(sprite.position, sprite.size) {
        return false;
    }
    sprite.direction = rng.random_range(0.0..TAU);
    sprite.growing = !sprite.growing;
    sprite.direction_changes += 1;
    true
}

fn apply_pattern(sprite: &mut Sprite, now: f64, rng: &mut SmallRng) {
    let Some(pattern) = sprite.pattern.as_mut() else {
        return;
    };
    let t = now as f32;
    match pattern {
        MovementPattern::Oscillation {
            amplitude,
            frequency,
        } => {
            sprite.position.x += (t * *frequency).sin() * *amplitude;
            sprite.position.y += (t * *frequency).cos() * *amplitude;
        }
        MovementPattern::Jitter { intensity } => {
            sprite.position.x += (rng.random::<f32>() - 0.05) * *intensity;
            sprite.position.y += (rng.random::<f32>() - 0.05) * *intensity;
        }
        MovementPattern::Loop {
            radius,
            angular_speed,
        } => {
            sprite.position.x += (t * *angular_speed).cos() * *radius;
            sprite.position.y += (t * *angular_speed).sin() * *radius;
        }
        MovementPattern::Jump {
            distance,
            interval,
            last_jump,
        } => {
            let due = last_jump.is_none_or(|last| now - last > *interval);
            if due {
                *last_jump = Some(now);
                let angle = rng.random_range(0.0..TAU);
                sprite.position.x += angle.cos() * *distance;
                sprite.position.y += angle.sin() * *distance;
            }
        }
    }
}

/// Respawn a sprite whose motion produced non-finite values. Returns `true` on respawn.
fn guard_finite(sprite: &mut Sprite, bounds: &FrameBounds, rng: &mut SmallRng) -> bool {
    if !sprite.direction.is_finite() {
        sprite.direction = rng.random_range(0.0..TAU);
    }
    if sprite.position.is_finite() {
        return false;
    }
    let (min_x, max_x) = bounds.x_range(sprite.size);
    let (min_y, max_y) = bounds.y_range(sprite.size);
    let pick = |rng: &mut SmallRng, min: f32, max: f32| {
        if max > min {
            rng.random_range(min..=max)
        } else {
            min
        }
    };
    sprite.position = Position::new(pick(rng, min_x, max_x), pick(rng, min_y, max_y));
    debug!(sprite = %sprite.name, x = sprite.position.x, y = sprite.position.y, "respawned sprite");
    true
}

/// Size from the distance between the frame center and the sprite's nominal center.
///
/// The nominal center uses the base footprint, so size depends on position only.
fn size_for(sprite: &Sprite, bounds: &FrameBounds, config: &BehaviorConfig) -> f32 {
    let half = config.base_size * 0.5;
    let anchor = Position::new(sprite.position.x + half, sprite.position.y + half);
    let distance = anchor.distance_to(bounds.center());
    let factor = 1.0 - distance / bounds.half_diagonal();
    config.base_size + factor * config.size_range * sprite.tuning.size_responsiveness
}

fn refresh_rotation(sprite: &mut Sprite) {
    let gate = u64::from(sprite.tuning.rotate_every.max(1));
    if sprite.direction_changes != sprite.rotated_at
        && sprite.direction_changes.is_multiple_of(gate)
    {
        sprite.rotated_at = sprite.direction_changes;
        sprite.rotation_degrees = sprite.direction.to_degrees();
    }
}

/// Wrap a sprite that touches an edge to the opposite one.
///
/// Returns `None` when no teleport happened, otherwise whether the sprite was hidden.
fn teleport(sprite: &mut Sprite, ctx: &FrameContext<'_>, rng: &mut SmallRng) -> Option<bool> {
    let bounds = &ctx.bounds;
    if !bounds.touches_edge(sprite.position, sprite.size) {
        return None;
    }
    let hide = rng.random::<f32>() < ctx.config.teleport_hide_probability;
    let (min_x, max_x) = bounds.x_range(sprite.size);
    let (min_y, max_y) = bounds.y_range(sprite.size);
    if sprite.position.x <= min_x {
        sprite.position.x = max_x - TELEPORT_INSET;
    } else if sprite.position.x >= max_x {
        sprite.position.x = min_x + TELEPORT_INSET;
    }
    if sprite.position.y <= min_y {
        sprite.position.y = max_y - TELEPORT_INSET;
    } else if sprite.position.y >= max_y {
        sprite.position.y = min_y + TELEPORT_INSET;
    }
    sprite.position = bounds.clamp_origin(sprite.position, sprite.size);
    if hide {
        sprite.hidden_until = Some(ctx.now + ctx.config.teleport_hide_seconds());
    }
    Some(hide)
}

/// Separate overlapping pairs of non-tracking sprites. Returns the number of pairs moved.
fn resolve_pairs(sprites: &mut [Sprite], config: &BehaviorConfig) -> usize {
    let mut resolved = 0;
    for j in 1..sprites.len() {
        let (head, tail) = sprites.split_at_mut(j);
        let b = &mut tail[0];
        if b.tracking_active {
            continue;
        }
        for a in head.iter_mut().filter(|sprite| !sprite.tracking_active) {
            let (ca, cb) = (a.center(), b.center());
            let distance = ca.distance_to(cb);
            let threshold = config.collision_distance_factor * (a.size + b.size) * 0.5;
            if !(distance > 0.0 && distance < threshold) {
                continue;
            }
            let push = ((threshold - distance) * 0.5).min(config.collision_max_step);
            let angle = (ca.y - cb.y).atan2(ca.x - cb.x);
            let (sin, cos) = angle.sin_cos();
            a.position.x += cos * push;
            a.position.y += sin * push;
            b.position.x -= cos * push;
            b.position.y -= sin * push;
            a.direction = angle + config.collision_turn_offset;
            b.direction = angle + PI + config.collision_turn_offset;
            resolved += 1;
        }
    }
    resolved
}

/// Clamp every sprite against its final size after collisions moved them.
fn settle(sprites: &mut [Sprite], bounds: &FrameBounds) {
    for sprite in sprites {
        sprite.position = bounds.clamp_origin(sprite.position, sprite.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Keypoint, KeypointKind, Pose};
    use crate::sprite::{SpriteConfig, SpriteTuning};

    const BOUNDS: FrameBounds = FrameBounds::new(0.0, 0.0, 640.0, 480.0);

    fn seeded(seed: u64) -> SmallRng {
        rand::SeedableRng::seed_from_u64(seed)
    }

    fn single(config: SpriteConfig) -> Habitat {
        Habitat::new(&MenagerieConfig {
            rng_seed: Some(3),
            sprites: vec![config],
            ..MenagerieConfig::default()
        })
        .expect("valid config")
    }

    fn still(name: &str, start: Position) -> SpriteConfig {
        SpriteConfig::new(
            name,
            start,
            SpriteTuning {
                speed: 0.0,
                randomness: 0.0,
                ..SpriteTuning::default()
            },
        )
    }

    fn person(points: &[(KeypointKind, f32, f32)]) -> PoseSnapshot {
        let keypoints = points
            .iter()
            .map(|&(kind, x, y)| Keypoint::new(kind, x, y, 0.9))
            .collect();
        PoseSnapshot::new(640.0, 480.0, 0.0, vec![Pose::new(0.9, keypoints)])
    }

    #[test]
    fn degenerate_bounds_skip_the_frame() {
        let mut habitat = single(still("moth", Position::new(100.0, 100.0)));
        let report = habitat.step(
            FrameBounds::new(0.0, 0.0, 0.0, 480.0),
            &SensorState::default(),
            None,
            0.0,
        );
        assert!(report.skipped);
        assert_eq!(habitat.sprites().as_slice()[0].position, Position::new(100.0, 100.0));
    }

    #[test]
    fn size_peaks_at_center() {
        let config = BehaviorConfig::default();
        let mut sprite = Sprite::create(
            &still("moth", Position::new(295.0, 215.0)),
            50.0,
            &mut seeded(1),
        );
        sprite.tuning.size_responsiveness = 1.0;
        assert!((size_for(&sprite, &BOUNDS, &config) - 130.0).abs() < 1e-3);
        sprite.position = Position::new(-25.0, -25.0);
        assert!((size_for(&sprite, &BOUNDS, &config) - 50.0).abs() < 1e-3);
    }

    #[test]
    fn rotation_only_refreshes_on_new_gate_multiples() {
        let mut sprite = Sprite::create(
            &still("moth", Position::new(10.0, 10.0)),
            50.0,
            &mut seeded(1),
        );
        sprite.tuning.rotate_every = 2;
        let initial = sprite.rotation_degrees;

        sprite.direction = 1.0;
        refresh_rotation(&mut sprite);
        assert_eq!(sprite.rotation_degrees, initial);

        sprite.direction_changes = 1;
        refresh_rotation(&mut sprite);
        assert_eq!(sprite.rotation_degrees, initial);

        sprite.direction_changes = 2;
        refresh_rotation(&mut sprite);
        assert!((sprite.rotation_degrees - 1.0f32.to_degrees()).abs() < 1e-4);

        sprite.direction = 2.0;
        refresh_rotation(&mut sprite);
        assert!((sprite.rotation_degrees - 1.0f32.to_degrees()).abs() < 1e-4);
    }

    #[test]
    fn keypoint_tracking_eases_toward_target() {
        let tracker = still("moth", Position::new(100.0, 100.0)).with_tracking(
            TrackingBehavior::Keypoint {
                keypoint: KeypointKind::Nose,
                offset: Position::new(0.0, -20.0),
            },
        );
        let mut habitat = single(tracker);
        let poses = person(&[(KeypointKind::Nose, 300.0, 220.0)]);
        let report = habitat.step(BOUNDS, &SensorState::default(), Some(&poses), 0.0);
        assert_eq!(report.tracking, 1);
        let sprite = &habitat.sprites().as_slice()[0];
        assert!(sprite.tracking_active);
        assert!((sprite.position.x - 130.0).abs() < 1e-3);
        assert!((sprite.position.y - 115.0).abs() < 1e-3);
    }

    #[test]
    fn sprite_inside_person_box_escapes_and_recovers() {
        let mut habitat = single(still("moth", Position::new(275.0, 215.0)));
        let poses = person(&[
            (KeypointKind::LeftShoulder, 250.0, 200.0),
            (KeypointKind::RightShoulder, 390.0, 200.0),
            (KeypointKind::LeftHip, 250.0, 300.0),
        ]);
        let before = habitat.sprites().as_slice()[0].position;
        let report = habitat.step(BOUNDS, &SensorState::default(), Some(&poses), 0.0);
        assert_eq!(report.escaping, 1);
        let sprite = &habitat.sprites().as_slice()[0];
        assert!(sprite.escaping);
        assert!(sprite.position.x < before.x);
        assert_eq!(sprite.speed, 0.0);

        habitat.step(BOUNDS, &SensorState::default(), None, 0.016);
        let sprite = &habitat.sprites().as_slice()[0];
        assert!(!sprite.escaping);
        assert_eq!(sprite.speed, sprite.tuning.speed);
    }

    fn shoulders_and_hip() -> PoseSnapshot {
        person(&[
            (KeypointKind::LeftShoulder, 250.0, 200.0),
            (KeypointKind::RightShoulder, 390.0, 200.0),
            (KeypointKind::LeftHip, 250.0, 300.0),
        ])
    }

    fn walker(pattern: Option<MovementPattern>) -> Habitat {
        let mut config = SpriteConfig::new(
            "moth",
            Position::new(275.0, 215.0),
            SpriteTuning {
                speed: 1.0,
                randomness: 0.0,
                ..SpriteTuning::default()
            },
        );
        config.pattern = pattern;
        let mut habitat = single(config);
        habitat.sprites_mut().as_mut_slice()[0].direction = 0.0;
        habitat
    }

    #[test]
    fn escaping_sprite_heads_away_from_person_at_double_speed() {
        // Inflated box spans (200,150)..(440,350) with center (320,250); the sprite's
        // center (300,240) sits 90 px from the top edge, so the push floors at 2.5.
        let mut habitat = walker(None);
        let poses = shoulders_and_hip();
        habitat.step(BOUNDS, &SensorState::default(), Some(&poses), 0.0);

        let sprite = &habitat.sprites().as_slice()[0];
        let away = (-10.0_f32).atan2(-20.0);
        assert!(sprite.escaping);
        assert!((sprite.direction - away).abs() < 1e-6);
        assert_eq!(sprite.speed, 2.0);

        // 2.5 px of push plus 2 px of integration along the unit vector (-2, -1) / sqrt(5).
        let (ux, uy) = (-2.0 / 5.0_f32.sqrt(), -1.0 / 5.0_f32.sqrt());
        assert!((sprite.position.x - (275.0 + 4.5 * ux)).abs() < 1e-3);
        assert!((sprite.position.y - (215.0 + 4.5 * uy)).abs() < 1e-3);
    }

    #[test]
    fn heading_is_reassigned_every_frame_inside_the_box() {
        let mut habitat = walker(None);
        let poses = shoulders_and_hip();
        for frame in 0..3 {
            let before = habitat.sprites().as_slice()[0].center();
            let away = (before.y - 250.0).atan2(before.x - 320.0);
            habitat.step(BOUNDS, &SensorState::default(), Some(&poses), f64::from(frame) / 60.0);
            let sprite = &habitat.sprites().as_slice()[0];
            assert!(sprite.escaping, "frame {frame}");
            assert!(
                (sprite.direction - away).abs() < 1e-5,
                "frame {frame}: heading {} expected {away}",
                sprite.direction
            );
        }
    }

    #[test]
    fn escaping_sprites_skip_their_pattern() {
        let poses = shoulders_and_hip();
        let mut plain = walker(None);
        let mut looping = walker(Some(MovementPattern::Loop {
            radius: 5.0,
            angular_speed: 1.0,
        }));
        plain.step(BOUNDS, &SensorState::default(), Some(&poses), 1.0);
        looping.step(BOUNDS, &SensorState::default(), Some(&poses), 1.0);
        assert_eq!(
            plain.sprites().as_slice()[0].position,
            looping.sprites().as_slice()[0].position
        );

        // Once clear of the person the overlay applies again.
        plain.step(BOUNDS, &SensorState::default(), None, 2.0);
        looping.step(BOUNDS, &SensorState::default(), None, 2.0);
        let (a, b) = (&plain.sprites().as_slice()[0], &looping.sprites().as_slice()[0]);
        assert!(!b.escaping);
        assert_ne!(a.position, b.position);
    }

    #[test]
    fn edge_touch_teleports_to_opposite_side() {
        let mut habitat = single(still("moth", Position::new(0.0, 200.0)));
        let report = habitat.step(BOUNDS, &SensorState::default(), None, 0.0);
        assert_eq!(report.teleports, 1);
        let sprite = &habitat.sprites().as_slice()[0];
        assert!(sprite.position.x > 500.0);
        assert!(sprite.position.x + sprite.size <= BOUNDS.right());
    }

    #[test]
    fn jitter_keeps_its_positive_bias() {
        let mut sprite = Sprite::create(
            &still("moth", Position::new(0.0, 0.0)),
            50.0,
            &mut seeded(1),
        );
        sprite.pattern = Some(MovementPattern::Jitter { intensity: 1.0 });
        let mut rng = seeded(9);
        for _ in 0..2_000 {
            apply_pattern(&mut sprite, 0.0, &mut rng);
        }
        // Mean step is 0.45 per axis.
        assert!(sprite.position.x > 700.0);
        assert!(sprite.position.y > 700.0);
    }

    #[test]
    fn non_finite_positions_respawn_in_bounds() {
        let mut sprite = Sprite::create(
            &still("moth", Position::new(0.0, 0.0)),
            50.0,
            &mut seeded(1),
        );
        sprite.position.x = f32::NAN;
        sprite.direction = f32::INFINITY;
        let mut rng = seeded(4);
        assert!(guard_finite(&mut sprite, &BOUNDS, &mut rng));
        assert!(sprite.position.is_finite());
        assert!(sprite.direction.is_finite());
        assert!(sprite.position.x >= 0.0 && sprite.position.x <= 590.0);
        assert!(!guard_finite(&mut sprite, &BOUNDS, &mut rng));
    }

    #[test]
    fn coincident_sprites_are_left_alone() {
        let mut habitat = Habitat::new(&MenagerieConfig {
            rng_seed: Some(1),
            sprites: vec![
                still("a", Position::new(100.0, 100.0)),
                still("b", Position::new(100.0, 100.0)),
            ],
            ..MenagerieConfig::default()
        })
        .expect("valid config");
        assert_eq!(habitat.resolve_collisions(), 0);
    }

    #[test]
    fn reset_cycles_through_corners() {
        let mut habitat = Habitat::new(&MenagerieConfig {
            rng_seed: Some(5),
            ..MenagerieConfig::default()
        })
        .expect("valid config");
        let bounds = FrameBounds::new(10.0, 20.0, 400.0, 300.0);
        habitat.reset_to_corners(bounds);
        let positions: Vec<Position> = habitat
            .sprites()
            .iter()
            .map(|(_, sprite)| sprite.position)
            .collect();
        assert_eq!(
            positions,
            [
                Position::new(10.0, 20.0),
                Position::new(360.0, 20.0),
                Position::new(10.0, 270.0),
                Position::new(360.0, 270.0),
            ]
        );
        assert_eq!(habitat.resets(), 1);
    }
}
