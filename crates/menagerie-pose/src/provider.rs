use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use menagerie_core::{CameraFacing, PoseConfig, PoseSnapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::{CameraSource, PoseError, PoseEstimator};

type SnapshotSlot = Option<Arc<PoseSnapshot>>;

/// Read side of the pose handoff. Always holds the most recent snapshot, never a queue.
#[derive(Debug, Clone)]
pub struct PoseFeed {
    rx: watch::Receiver<SnapshotSlot>,
}

impl PoseFeed {
    /// A feed with no provider behind it; always reports no poses.
    #[must_use]
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(None);
        Self { rx }
    }

    /// Latest snapshot, `None` until the detector has produced anything.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<PoseSnapshot>> {
        self.rx.borrow().clone()
    }

    /// Wait for the next publication. Returns `false` once the provider has stopped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Control side of a running provider. Dropping it stops the provider.
#[derive(Debug)]
pub struct PoseProviderHandle {
    facing: watch::Sender<CameraFacing>,
    task: JoinHandle<()>,
}

impl PoseProviderHandle {
    /// Ask the provider to switch cameras before its next capture.
    pub fn set_facing(&self, facing: CameraFacing) {
        self.facing.send_if_modified(|current| {
            if *current == facing {
                false
            } else {
                *current = facing;
                true
            }
        });
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the provider and wait for it to unwind.
    pub async fn shutdown(self) {
        self.task.abort();
        if let Err(err) = self.task.await
            && err.is_panic()
        {
            warn!(?err, "pose provider panicked");
        }
    }

    /// Wait for the provider to stop on its own (feed dropped or detector failed).
    pub async fn join(self) {
        let Self { facing, task } = self;
        if let Err(err) = task.await
            && err.is_panic()
        {
            warn!(?err, "pose provider panicked");
        }
        drop(facing);
    }
}

/// Spawns the polling task.
pub struct PoseProvider;

impl PoseProvider {
    /// Start polling on the current tokio runtime.
    ///
    /// `init` resolves to the ready detector. The feed reports nothing until it completes; if it
    /// fails the provider publishes an empty snapshot and stops.
    pub fn spawn<E, C, F>(init: F, camera: C, config: &PoseConfig) -> (PoseFeed, PoseProviderHandle)
    where
        E: PoseEstimator,
        C: CameraSource,
        F: Future<Output = Result<E, PoseError>> + Send + 'static,
    {
        let (snapshots, rx) = watch::channel(None);
        let (facing, facing_rx) = watch::channel(CameraFacing::default());
        let period = Duration::from_millis(config.poll_interval_ms.max(1));
        let task = tokio::spawn(run(init, camera, period, snapshots, facing_rx));
        (PoseFeed { rx }, PoseProviderHandle { facing, task })
    }
}

async fn run<E, C, F>(
    init: F,
    mut camera: C,
    period: Duration,
    snapshots: watch::Sender<SnapshotSlot>,
    mut facing: watch::Receiver<CameraFacing>,
) where
    E: PoseEstimator,
    C: CameraSource,
    F: Future<Output = Result<E, PoseError>> + Send,
{
    let mut estimator = tokio::select! {
        result = init => match result {
            Ok(estimator) => {
                info!(interval_ms = period.as_millis() as u64, "pose detector ready");
                estimator
            }
            Err(err) => {
                warn!(%err, "pose detector unavailable; continuing without poses");
                snapshots.send_replace(Some(Arc::new(PoseSnapshot::empty(0.0))));
                return;
            }
        },
        () = snapshots.closed() => return,
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            () = snapshots.closed() => {
                debug!("pose feed dropped; stopping provider");
                break;
            }
            changed = facing.changed() => {
                if changed.is_err() {
                    debug!("pose provider handle dropped; stopping provider");
                    break;
                }
                let next = *facing.borrow_and_update();
                info!(facing = next.as_str(), "switching camera");
                camera.set_facing(next);
            }
            _ = ticker.tick() => {
                let Some(frame) = camera.capture() else {
                    trace!("no camera frame yet");
                    continue;
                };
                let snapshot = match estimator.estimate(&frame).await {
                    Ok(poses) => {
                        trace!(poses = poses.len(), "pose estimate");
                        PoseSnapshot::new(
                            frame.width as f32,
                            frame.height as f32,
                            frame.captured_at,
                            poses,
                        )
                    }
                    Err(err) => {
                        warn!(%err, "pose estimation failed; publishing no poses");
                        PoseSnapshot::empty(frame.captured_at)
                    }
                };
                if snapshots.send(Some(Arc::new(snapshot))).is_err() {
                    break;
                }
            }
        }
    }
}
