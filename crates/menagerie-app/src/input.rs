//! Line-oriented control commands read from stdin.
//!
//! ```text
//! reset               same as a shake
//! camera              toggle front/back camera
//! tilt <gamma> <beta> orientation sample in degrees
//! motion <x> <y> <z>  acceleration sample including gravity
//! quit                stop the frame loop
//! ```

use std::io::BufRead;
use std::thread;

use menagerie_core::{ControlCommand, MotionSample, OrientationSample};
use thiserror::Error;
use tracing::{debug, warn};

use crate::command::{CommandSender, HostCommand, submit_command};

#[derive(Debug, Error, PartialEq)]
pub enum ParseCommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{command}' expects {expected}")]
    Arguments {
        command: &'static str,
        expected: &'static str,
    },
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<HostCommand>, ParseCommandError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    if head.starts_with('#') {
        return Ok(None);
    }
    let args: Vec<f32> = words
        .map(str::parse::<f32>)
        .collect::<Result<_, _>>()
        .map_err(|_| arguments_for(head))?;

    let command = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("reset", []) => HostCommand::Control(ControlCommand::Reset),
        ("camera", []) => HostCommand::Control(ControlCommand::ToggleCamera),
        ("tilt", [gamma, beta]) => HostCommand::Control(ControlCommand::Orientation(
            OrientationSample {
                gamma: *gamma,
                beta: *beta,
            },
        )),
        ("motion", [x, y, z]) => {
            HostCommand::Control(ControlCommand::Motion(MotionSample {
                x: *x,
                y: *y,
                z: *z,
            }))
        }
        ("quit" | "exit", []) => HostCommand::Quit,
        _ => return Err(arguments_for(head)),
    };
    Ok(Some(command))
}

fn arguments_for(head: &str) -> ParseCommandError {
    let (command, expected) = match head.to_ascii_lowercase().as_str() {
        "reset" => ("reset", "no arguments"),
        "camera" => ("camera", "no arguments"),
        "quit" | "exit" => ("quit", "no arguments"),
        "tilt" => ("tilt", "<gamma> <beta>"),
        "motion" => ("motion", "<x> <y> <z>"),
        _ => return ParseCommandError::Unknown(head.to_owned()),
    };
    ParseCommandError::Arguments { command, expected }
}

/// Forward parsed lines from `reader` until EOF or `quit`.
pub fn pump_commands(reader: impl BufRead, sender: &CommandSender) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "failed to read control input");
                break;
            }
        };
        match parse_command(&line) {
            Ok(Some(command)) => {
                submit_command(sender, command);
                if command == HostCommand::Quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%err, line = %line, "ignoring control input"),
        }
    }
    debug!("control input closed");
}

/// Read commands from stdin on a dedicated thread.
pub fn spawn_stdin_reader(sender: CommandSender) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("menagerie-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            pump_commands(stdin.lock(), &sender);
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::create_command_bus;
    use crossfire::TryRecvError;
    use std::io::Cursor;

    #[test]
    fn parses_every_command() {
        assert_eq!(
            parse_command("reset"),
            Ok(Some(HostCommand::Control(ControlCommand::Reset)))
        );
        assert_eq!(
            parse_command("  CAMERA "),
            Ok(Some(HostCommand::Control(ControlCommand::ToggleCamera)))
        );
        assert_eq!(
            parse_command("tilt 30 -5.5"),
            Ok(Some(HostCommand::Control(ControlCommand::Orientation(
                OrientationSample {
                    gamma: 30.0,
                    beta: -5.5
                }
            ))))
        );
        assert_eq!(
            parse_command("motion 1 2 3"),
            Ok(Some(HostCommand::Control(ControlCommand::Motion(
                MotionSample {
                    x: 1.0,
                    y: 2.0,
                    z: 3.0
                }
            ))))
        );
        assert_eq!(parse_command("quit"), Ok(Some(HostCommand::Quit)));
        assert_eq!(parse_command(""), Ok(None));
        assert_eq!(parse_command("# note"), Ok(None));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            parse_command("dance"),
            Err(ParseCommandError::Unknown("dance".into()))
        );
        assert_eq!(
            parse_command("tilt 10"),
            Err(ParseCommandError::Arguments {
                command: "tilt",
                expected: "<gamma> <beta>"
            })
        );
        assert!(parse_command("motion a b c").is_err());
        assert!(parse_command("reset now").is_err());
    }

    #[test]
    fn pump_stops_at_quit() {
        let (tx, rx) = create_command_bus(8);
        pump_commands(Cursor::new("camera\nbogus\nquit\nreset\n"), &tx);
        assert_eq!(
            rx.try_recv().ok(),
            Some(HostCommand::Control(ControlCommand::ToggleCamera))
        );
        assert_eq!(rx.try_recv().ok(), Some(HostCommand::Quit));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
