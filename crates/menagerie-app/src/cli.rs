use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Where rendered frames go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Structured `tracing` events at debug level.
    Log,
    /// One JSON object per frame, to `--output` or stdout.
    Jsonl,
    /// Discard frames.
    Null,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "menagerie",
    version,
    about = "Animate sprite animals over a (synthetic) camera feed"
)]
pub struct Cli {
    /// JSON configuration layered over the built-in defaults.
    #[arg(long, env = "MENAGERIE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seed for reproducible runs; overrides `rng_seed` from the config file.
    #[arg(long, env = "MENAGERIE_SEED")]
    pub seed: Option<u64>,

    /// Override a single config value, e.g. `--set behavior.repulsion_strength=8`.
    #[arg(long = "set", value_name = "PATH=VALUE")]
    pub overrides: Vec<String>,

    /// Display refresh rate driving the frame loop.
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Stop after this many frames; 0 runs until `quit` or Ctrl-C.
    #[arg(long, default_value_t = 0)]
    pub frames: u64,

    /// Width of the camera element in display pixels.
    #[arg(long, default_value_t = 640.0)]
    pub width: f32,

    /// Height of the camera element in display pixels.
    #[arg(long, default_value_t = 480.0)]
    pub height: f32,

    /// JSON-lines pose script replayed as detector output.
    #[arg(long)]
    pub poses: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = SinkKind::Log)]
    pub sink: SinkKind,

    /// Output file for the `jsonl` sink.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Do not read control commands from stdin.
    #[arg(long)]
    pub no_stdin: bool,
}

impl Cli {
    /// Split `--set` arguments into path/value pairs. Values are JSON, falling back to a raw string.
    pub fn parsed_overrides(&self) -> anyhow::Result<Vec<(String, serde_json::Value)>> {
        self.overrides
            .iter()
            .map(|raw| {
                let Some((path, value)) = raw.split_once('=') else {
                    anyhow::bail!("override '{raw}' must look like PATH=VALUE");
                };
                Ok((path.trim().to_owned(), parse_value(value.trim())))
            })
            .collect()
    }
}

fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_owned()))
}
