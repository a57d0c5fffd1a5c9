#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result, ensure};
use js_sys::Uint8Array;
use menagerie_core::{
    CommandOutcome, ControlCommand, FrameBounds, FrameScheduler, LatestFrameSink,
    MenagerieConfig, MotionSample, OrientationSample, PoseSnapshot, PoseThrottle, RenderFrame,
};
use postcard::to_allocvec;
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use tracing::debug;
use wasm_bindgen::prelude::*;

/// Browser-side handle to one overlay. Owns the scheduler and the latest detector output.
#[wasm_bindgen]
pub struct HabitatHandle {
    inner: Rc<RefCell<Overlay>>,
}

struct Overlay {
    scheduler: FrameScheduler<LatestFrameSink>,
    throttle: PoseThrottle,
    poses: Option<PoseSnapshot>,
    format: SnapshotFormat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum SnapshotFormat {
    #[default]
    Json,
    Binary,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
struct InitOptions {
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<MenagerieConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_format: Option<SnapshotFormat>,
}

impl InitOptions {
    fn into_config(self) -> MenagerieConfig {
        let mut config = self.config.unwrap_or_default();
        if self.seed.is_some() {
            config.rng_seed = self.seed;
        }
        config
    }
}

impl Overlay {
    fn new(config: &MenagerieConfig, format: SnapshotFormat) -> Result<Self> {
        let scheduler = FrameScheduler::new(config, LatestFrameSink::default())
            .context("failed to build menagerie habitat")?;
        Ok(Self {
            scheduler,
            throttle: PoseThrottle::new(&config.pose),
            poses: None,
            format,
        })
    }

    fn tick(&mut self, now: f64, bounds: FrameBounds) -> Option<RenderFrame> {
        let outcome = self.scheduler.tick(bounds, self.poses.as_ref(), now);
        if outcome.report.skipped {
            return None;
        }
        self.scheduler.sink_mut().take()
    }
}

#[wasm_bindgen]
impl HabitatHandle {
    /// Advance one display frame. `now_ms` is the `requestAnimationFrame` timestamp and the
    /// bounds are the video element's client rect. Returns `null` while the rect is unusable.
    #[wasm_bindgen(js_name = tick)]
    pub fn tick_js(
        &self,
        now_ms: f64,
        left: f32,
        top: f32,
        width: f32,
        height: f32,
    ) -> Result<JsValue, JsValue> {
        let mut overlay = self.inner.borrow_mut();
        let bounds = FrameBounds::new(left, top, width, height);
        match overlay.tick(now_ms / 1000.0, bounds) {
            Some(frame) => encode_frame(&frame, overlay.format),
            None => Ok(JsValue::NULL),
        }
    }

    /// Feed a `deviceorientation` reading.
    #[wasm_bindgen(js_name = orientation)]
    pub fn orientation_js(&self, gamma: f32, beta: f32, now_ms: f64) {
        let command = ControlCommand::Orientation(OrientationSample { gamma, beta });
        self.inner
            .borrow_mut()
            .scheduler
            .apply(command, now_ms / 1000.0);
    }

    /// Feed a `devicemotion` reading. Returns true when it counted as a shake.
    #[wasm_bindgen(js_name = motion)]
    pub fn motion_js(&self, x: f32, y: f32, z: f32, now_ms: f64) -> bool {
        let command = ControlCommand::Motion(MotionSample { x, y, z });
        let outcome = self
            .inner
            .borrow_mut()
            .scheduler
            .apply(command, now_ms / 1000.0);
        outcome == CommandOutcome::ResetQueued
    }

    #[wasm_bindgen(js_name = reset)]
    pub fn reset_js(&self, now_ms: f64) {
        self.inner
            .borrow_mut()
            .scheduler
            .apply(ControlCommand::Reset, now_ms / 1000.0);
    }

    /// Flip the preferred camera and return the new facing mode (`"user"` or `"environment"`).
    /// The page is expected to reopen its stream with that `facingMode`.
    #[wasm_bindgen(js_name = toggleCamera)]
    pub fn toggle_camera_js(&self, now_ms: f64) -> String {
        let mut overlay = self.inner.borrow_mut();
        overlay
            .scheduler
            .apply(ControlCommand::ToggleCamera, now_ms / 1000.0);
        overlay.poses = None;
        overlay.throttle.reset();
        overlay.scheduler.facing().as_str().to_owned()
    }

    #[wasm_bindgen(getter)]
    pub fn facing(&self) -> String {
        self.inner.borrow().scheduler.facing().as_str().to_owned()
    }

    /// True when enough time has passed to run the pose detector again.
    #[wasm_bindgen(js_name = shouldEstimatePose)]
    pub fn should_estimate_pose_js(&self, now_ms: f64) -> bool {
        self.inner.borrow_mut().throttle.ready(now_ms / 1000.0)
    }

    /// Replace the detector output used by subsequent ticks.
    #[wasm_bindgen(js_name = setPoses)]
    pub fn set_poses_js(&self, snapshot: JsValue) -> Result<(), JsValue> {
        let snapshot = from_value::<PoseSnapshot>(snapshot).map_err(js_error)?;
        debug!(poses = snapshot.poses.len(), "pose snapshot received");
        self.inner.borrow_mut().poses = Some(snapshot);
        Ok(())
    }

    #[wasm_bindgen(js_name = clearPoses)]
    pub fn clear_poses_js(&self) {
        self.inner.borrow_mut().poses = None;
    }
}

#[wasm_bindgen]
pub fn init_habitat(options: JsValue) -> Result<HabitatHandle, JsValue> {
    let options = if options.is_null() || options.is_undefined() {
        InitOptions::default()
    } else {
        from_value::<InitOptions>(options).map_err(js_error)?
    };
    let format = options.snapshot_format.unwrap_or_default();
    let mut config = options.into_config();
    if config.rng_seed.is_none() {
        config.rng_seed = normalize_seed(Some(js_sys::Math::random() * u32::MAX as f64))
            .map_err(js_error)?;
    }
    config.validate().map_err(js_error)?;

    let overlay = Overlay::new(&config, format).map_err(js_error)?;
    Ok(HabitatHandle {
        inner: Rc::new(RefCell::new(overlay)),
    })
}

fn normalize_seed(seed: Option<f64>) -> Result<Option<u64>> {
    let Some(value) = seed else {
        return Ok(None);
    };
    ensure!(value.is_finite(), "seed must be a finite number");
    ensure!(value >= 0.0, "seed must be non-negative");
    let truncated = value.floor();
    ensure!(
        truncated <= u64::MAX as f64,
        "seed must be representable as u64"
    );
    Ok(Some(truncated as u64))
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsError::new(&err.to_string()).into()
}

fn encode_frame(frame: &RenderFrame, format: SnapshotFormat) -> Result<JsValue, JsValue> {
    match format {
        SnapshotFormat::Json => to_value(frame).map_err(js_error),
        SnapshotFormat::Binary => {
            let bytes = to_allocvec(frame).map_err(js_error)?;
            Ok(Uint8Array::from(bytes.as_slice()).into())
        }
    }
}

#[wasm_bindgen]
pub fn version() -> String {
    format!("menagerie-web {}", env!("CARGO_PKG_VERSION"))
}

#[wasm_bindgen]
pub fn default_init_options() -> Result<JsValue, JsValue> {
    to_value(&InitOptions::default()).map_err(js_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use menagerie_core::{Habitat, SensorState};
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn overlay_matches_native_habitat() {
        let cases = [(640.0_f32, 480.0_f32, 90_u32, 8102_u64), (360.0, 640.0, 45, 1337)];

        for (width, height, frames, seed) in cases {
            let config = MenagerieConfig {
                rng_seed: Some(seed),
                ..MenagerieConfig::default()
            };
            let bounds = FrameBounds::new(0.0, 0.0, width, height);

            let mut native = Habitat::new(&config).expect("native habitat");
            let mut overlay = Overlay::new(&config, SnapshotFormat::Json).expect("overlay");
            let mut last = None;
            for frame in 0..frames {
                let now = f64::from(frame) / 60.0;
                native.step(bounds, &SensorState::default(), None, now);
                last = overlay.tick(now, bounds);
            }

            let expected = native.render_frame(f64::from(frames - 1) / 60.0);
            let actual = last.expect("frame presented");
            assert_eq!(expected.tick, actual.tick);
            for (a, b) in expected.sprites.iter().zip(actual.sprites.iter()) {
                assert_eq!(a.name, b.name);
                assert!((a.x - b.x).abs() <= 1e-5);
                assert!((a.y - b.y).abs() <= 1e-5);
                assert_eq!(a.visible, b.visible);
            }
        }
    }

    #[wasm_bindgen_test]
    fn unusable_bounds_present_nothing() {
        let config = MenagerieConfig {
            rng_seed: Some(5),
            ..MenagerieConfig::default()
        };
        let mut overlay = Overlay::new(&config, SnapshotFormat::Json).expect("overlay");
        assert!(overlay.tick(0.0, FrameBounds::new(0.0, 0.0, 0.0, 0.0)).is_none());
        assert!(overlay.tick(0.016, FrameBounds::new(0.0, 0.0, 320.0, 240.0)).is_some());
    }

    #[wasm_bindgen_test]
    fn seeds_are_validated() {
        assert_eq!(normalize_seed(Some(12.7)).expect("seed"), Some(12));
        assert!(normalize_seed(Some(-1.0)).is_err());
        assert!(normalize_seed(Some(f64::NAN)).is_err());
        assert_eq!(normalize_seed(None).expect("none"), None);
    }
}
