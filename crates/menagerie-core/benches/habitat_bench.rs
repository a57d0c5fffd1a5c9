use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use menagerie_core::{
    FrameBounds, Habitat, Keypoint, KeypointKind, MenagerieConfig, Pose, PoseSnapshot, Position,
    SensorState, SpriteConfig, SpriteTuning,
};
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

fn roster(count: usize) -> Vec<SpriteConfig> {
    let base = SpriteConfig::default_roster();
    (0..count)
        .map(|idx| {
            let template = &base[idx % base.len()];
            let mut sprite = SpriteConfig::new(
                format!("{}-{idx}", template.name),
                Position::new(40.0 + (idx % 20) as f32 * 25.0, 40.0 + (idx / 20) as f32 * 18.0),
                SpriteTuning {
                    speed: template.tuning.speed * 4.0,
                    ..template.tuning
                },
            );
            sprite.pattern = template.pattern;
            sprite
        })
        .collect()
}

fn crowd() -> PoseSnapshot {
    let keypoints = KeypointKind::ALL
        .iter()
        .enumerate()
        .map(|(idx, kind)| Keypoint::new(*kind, 280.0 + idx as f32 * 4.0, 120.0 + idx as f32 * 12.0, 0.8))
        .collect();
    PoseSnapshot::new(640.0, 480.0, 0.0, vec![Pose::new(0.9, keypoints)])
}

fn bench_habitat_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("habitat_step");
    group.sample_size(env_or("MENAGERIE_BENCH_SAMPLES", 30_usize).max(10));
    group.warm_up_time(Duration::from_secs(env_or("MENAGERIE_BENCH_WARMUP_SECS", 2)));
    group.measurement_time(Duration::from_secs(env_or("MENAGERIE_BENCH_MEASURE_SECS", 8)));
    let steps: usize = env_or("MENAGERIE_BENCH_STEPS", 120_usize).max(1);
    let bounds = FrameBounds::new(0.0, 0.0, 640.0, 480.0);
    let sensors = SensorState {
        tilt_x: 20.0,
        tilt_y: 0.0,
    };
    let poses = crowd();

    for sprites in [4_usize, 32, 128] {
        group.bench_function(format!("steps{steps}_sprites{sprites}"), |b| {
            b.iter_batched(
                || {
                    Habitat::new(&MenagerieConfig {
                        rng_seed: Some(0xBEEF),
                        sprites: roster(sprites),
                        ..MenagerieConfig::default()
                    })
                    .expect("bench config is valid")
                },
                |mut habitat| {
                    for frame in 0..steps {
                        let snapshot = (frame % 6 == 0).then_some(&poses);
                        habitat.step(bounds, &sensors, snapshot, frame as f64 / 60.0);
                    }
                    habitat
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_habitat_steps);
criterion_main!(benches);
