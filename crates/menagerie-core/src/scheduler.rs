//! Frame scheduling: applies host commands, advances the habitat and presents the result.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::habitat::{Habitat, StepReport};
use crate::pose::PoseSnapshot;
use crate::sensors::{CameraFacing, MotionSample, OrientationSample, Session};
use crate::{ConfigError, FrameBounds, MenagerieConfig, RenderSink};

/// External input delivered between frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Manual trigger with the same effect as a shake.
    Reset,
    ToggleCamera,
    Orientation(OrientationSample),
    Motion(MotionSample),
}

/// What a command changed, so hosts can react (e.g. reopen the camera).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    ResetQueued,
    FacingChanged(CameraFacing),
    SensorsUpdated,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub report: StepReport,
    /// True when a pending shake or manual reset was applied before stepping.
    pub reset_applied: bool,
}

/// Drives the habitat once per display refresh and hands each frame to the sink.
pub struct FrameScheduler<S: RenderSink> {
    habitat: Habitat,
    session: Session,
    sink: S,
    pending_reset: bool,
}

impl<S: RenderSink> FrameScheduler<S> {
    pub fn new(config: &MenagerieConfig, sink: S) -> Result<Self, ConfigError> {
        let habitat = Habitat::new(config)?;
        Ok(Self {
            habitat,
            session: Session::new(&config.sensors),
            sink,
            pending_reset: false,
        })
    }

    /// Apply one host command received at `now` seconds.
    ///
    /// Resets are deferred to the next tick because only the tick knows the current bounds.
    pub fn apply(&mut self, command: ControlCommand, now: f64) -> CommandOutcome {
        match command {
            ControlCommand::Reset => {
                self.pending_reset = true;
                info!("manual reset requested");
                CommandOutcome::ResetQueued
            }
            ControlCommand::ToggleCamera => {
                let facing = self.session.toggle_camera();
                info!(facing = facing.as_str(), "camera toggled");
                CommandOutcome::FacingChanged(facing)
            }
            ControlCommand::Orientation(sample) => {
                self.session.sensors.on_orientation(sample);
                CommandOutcome::SensorsUpdated
            }
            ControlCommand::Motion(sample) => {
                if self.session.sensors.on_motion(sample, now) {
                    self.pending_reset = true;
                    debug!(now, "shake detected");
                    CommandOutcome::ResetQueued
                } else {
                    CommandOutcome::Ignored
                }
            }
        }
    }

    /// Run one frame: apply any pending reset, step, then present.
    pub fn tick(
        &mut self,
        bounds: FrameBounds,
        poses: Option<&PoseSnapshot>,
        now: f64,
    ) -> TickOutcome {
        let reset_applied = self.pending_reset && !bounds.is_degenerate();
        if reset_applied {
            self.habitat.reset_to_corners(bounds);
            self.pending_reset = false;
        }
        let sensors = self.session.sensors.state();
        let report = self.habitat.step(bounds, &sensors, poses, now);
        if !report.skipped {
            let frame = self.habitat.render_frame(now);
            self.sink.present(&frame);
        }
        TickOutcome {
            report,
            reset_applied,
        }
    }

    #[must_use]
    pub fn habitat(&self) -> &Habitat {
        &self.habitat
    }

    pub fn habitat_mut(&mut self) -> &mut Habitat {
        &mut self.habitat
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn facing(&self) -> CameraFacing {
        self.session.facing
    }

    #[must_use]
    pub fn reset_pending(&self) -> bool {
        self.pending_reset
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
