use crossfire::mpmc;
use crossfire::{MAsyncTx, MRx, TryRecvError, TrySendError, detect_backoff_cfg};
use menagerie_core::{CameraFacing, CommandOutcome, ControlCommand, FrameScheduler, RenderSink};
use tracing::{debug, warn};

/// Commands accepted by the native frame loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostCommand {
    Control(ControlCommand),
    Quit,
}

pub type CommandSender = MAsyncTx<HostCommand>;
pub type CommandReceiver = MRx<HostCommand>;

pub fn create_command_bus(capacity: usize) -> (CommandSender, CommandReceiver) {
    detect_backoff_cfg();
    mpmc::bounded_tx_async_rx_blocking(capacity)
}

/// Queue a command without blocking. Returns `false` when it was dropped.
pub fn submit_command(sender: &CommandSender, command: HostCommand) -> bool {
    match sender.try_send(command) {
        Ok(()) => true,
        Err(TrySendError::Full(cmd)) => {
            warn!(?cmd, "control command queue full; dropping command");
            false
        }
        Err(TrySendError::Disconnected(cmd)) => {
            warn!(?cmd, "control command queue disconnected");
            false
        }
    }
}

/// What the frame loop has to act on after draining the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub applied: usize,
    pub quit: bool,
    /// Last camera facing requested during this drain, if any.
    pub facing: Option<CameraFacing>,
}

/// Apply every queued command to `scheduler` without waiting.
pub fn drain_pending_commands<S: RenderSink>(
    receiver: &CommandReceiver,
    scheduler: &mut FrameScheduler<S>,
    now: f64,
) -> DrainSummary {
    let mut summary = DrainSummary::default();
    loop {
        match receiver.try_recv() {
            Ok(HostCommand::Quit) => {
                summary.quit = true;
                break;
            }
            Ok(HostCommand::Control(command)) => {
                debug!(?command, "applying control command");
                if let CommandOutcome::FacingChanged(facing) = scheduler.apply(command, now) {
                    summary.facing = Some(facing);
                }
                summary.applied += 1;
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        }
    }
    summary
}
