use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use menagerie_core::{CameraFacing, FrameBounds, FrameScheduler, NullSink, PoseConfig, RenderSink};
use menagerie_pose::{
    PoseFeed, PoseProvider, PoseProviderHandle, ScriptedEstimator, SyntheticCamera,
};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::cli::{Cli, SinkKind};
use crate::command::{create_command_bus, drain_pending_commands};
use crate::config::load_config;
use crate::input::spawn_stdin_reader;
use crate::sinks::{JsonLinesSink, TracingSink};

const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Totals reported when the frame loop ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub resets: u64,
    pub facing: CameraFacing,
    pub elapsed: Duration,
}

fn build_sink(cli: &Cli) -> Result<Box<dyn RenderSink>> {
    Ok(match cli.sink {
        SinkKind::Log => Box::new(TracingSink),
        SinkKind::Null => Box::new(NullSink),
        SinkKind::Jsonl => {
            let writer: Box<dyn Write> = match &cli.output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path)
                        .with_context(|| format!("creating frame output {}", path.display()))?,
                )),
                None => Box::new(BufWriter::new(io::stdout())),
            };
            Box::new(JsonLinesSink::new(writer))
        }
    })
}

fn start_pose_provider(
    cli: &Cli,
    origin: Instant,
    config: &PoseConfig,
) -> (PoseFeed, Option<PoseProviderHandle>) {
    let Some(path) = cli.poses.clone() else {
        return (PoseFeed::detached(), None);
    };
    info!(script = %path.display(), "replaying pose script");
    let camera = SyntheticCamera::with_origin(cli.width as u32, cli.height as u32, origin);
    let (feed, handle) = PoseProvider::spawn(
        async move { ScriptedEstimator::from_path(path) },
        camera,
        config,
    );
    (feed, Some(handle))
}

/// Run the headless frame loop until the frame limit, `quit`, or Ctrl-C.
pub async fn run(cli: Cli) -> Result<RunSummary> {
    if cli.fps == 0 {
        bail!("--fps must be positive");
    }
    let bounds = FrameBounds::new(0.0, 0.0, cli.width, cli.height);
    if bounds.is_degenerate() {
        bail!("frame size {}x{} is not usable", cli.width, cli.height);
    }

    let overrides = cli.parsed_overrides()?;
    let mut config =
        load_config(cli.config.as_deref(), &overrides).context("loading configuration")?;
    if let Some(seed) = cli.seed {
        config.rng_seed = Some(seed);
    }

    let sink = build_sink(&cli)?;
    let mut scheduler = FrameScheduler::new(&config, sink).context("building habitat")?;

    let origin = Instant::now();
    let (feed, provider) = start_pose_provider(&cli, origin, &config.pose);

    let (commands, receiver) = create_command_bus(COMMAND_QUEUE_CAPACITY);
    if !cli.no_stdin {
        spawn_stdin_reader(commands.clone()).context("spawning stdin reader")?;
    }
    drop(commands);

    info!(
        sprites = scheduler.habitat().sprites().len(),
        fps = cli.fps,
        frames = cli.frames,
        width = cli.width,
        height = cli.height,
        seed = ?config.rng_seed,
        "starting menagerie"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(cli.fps)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut frames = 0_u64;
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(err) = result {
                    warn!(%err, "failed to listen for Ctrl-C");
                }
                info!("interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }

        let now = origin.elapsed().as_secs_f64();
        let drained = drain_pending_commands(&receiver, &mut scheduler, now);
        if let (Some(facing), Some(provider)) = (drained.facing, provider.as_ref()) {
            provider.set_facing(facing);
        }
        if drained.quit {
            info!("quit requested");
            break;
        }

        let snapshot = feed.latest();
        scheduler.tick(bounds, snapshot.as_deref(), now);
        frames += 1;
        if cli.frames > 0 && frames >= cli.frames {
            break;
        }
    }

    if let Some(provider) = provider {
        provider.shutdown().await;
    }

    let summary = RunSummary {
        frames,
        resets: scheduler.habitat().resets(),
        facing: scheduler.facing(),
        elapsed: origin.elapsed(),
    };
    info!(
        frames = summary.frames,
        resets = summary.resets,
        facing = summary.facing.as_str(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "menagerie stopped"
    );
    Ok(summary)
}
