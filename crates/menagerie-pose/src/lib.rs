//! Pose acquisition for native hosts.
//!
//! A [`PoseProvider`] owns the camera and the detector on a tokio task. It waits for the detector
//! to initialise, polls it no faster than the configured interval and publishes each result into
//! a watch channel. The frame loop reads the freshest snapshot through a [`PoseFeed`] without
//! ever waiting on the detector.

use std::future::Future;

use menagerie_core::{CameraFacing, Pose};
use thiserror::Error;

mod provider;
pub mod scripted;

pub use provider::{PoseFeed, PoseProvider, PoseProviderHandle};
pub use scripted::{ScriptedEstimator, SyntheticCamera};

/// One captured video frame at native resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Host timestamp in seconds.
    pub captured_at: f64,
    pub facing: CameraFacing,
    /// Packed RGBA pixels; empty for synthetic sources.
    pub pixels: Vec<u8>,
}

/// Errors surfaced by detectors and pose scripts.
#[derive(Debug, Error)]
pub enum PoseError {
    #[error("pose detector failed to initialise: {0}")]
    Init(String),
    #[error("pose estimation failed: {0}")]
    Estimate(String),
    #[error("invalid pose script at line {line}: {source}")]
    Script {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Source of live frames.
pub trait CameraSource: Send + 'static {
    /// Latest frame, or `None` when the stream has not produced one yet.
    fn capture(&mut self) -> Option<CameraFrame>;

    /// Switch between the front and back camera.
    fn set_facing(&mut self, facing: CameraFacing);
}

/// A pose-estimation model. Coordinates are in the frame's native pixels.
pub trait PoseEstimator: Send + 'static {
    fn estimate(
        &mut self,
        frame: &CameraFrame,
    ) -> impl Future<Output = Result<Vec<Pose>, PoseError>> + Send;
}
