//! Native headless host for the Menagerie overlay.
//!
//! Reads configuration and CLI flags, replays an optional pose script through the asynchronous
//! pose provider, accepts control commands on stdin and drives the frame scheduler at a fixed
//! refresh rate.

pub mod cli;
pub mod command;
pub mod config;
pub mod input;
pub mod runner;
pub mod sinks;

pub use cli::{Cli, SinkKind};
pub use command::{CommandReceiver, CommandSender, HostCommand};
pub use config::{ConfigLoadError, apply_patch, load_config};
pub use runner::{RunSummary, run};
pub use sinks::{JsonLinesSink, TracingSink};
