//! Prompt command parsing.
//!
//! Every line entered at the prompt parses into one [`ControllerCommand`]
//! or an `InvalidCommand` error naming what went wrong. Parsing is
//! separate from execution so it can be tested without hardware or a
//! connected device.

use mlight_core::{MlightError, Resolution};

use crate::stage::ProjectorTarget;

/// One parsed prompt line.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCommand {
    /// `takefull <proj> <pos> [resolution]` — both sweeps at a stage
    /// position, vertical then horizontal.
    TakeFull {
        projector: u32,
        position: u32,
        resolution: Option<Resolution>,
    },
    /// `calibrate <nphotos>` — capture calibration stills.
    Calibrate { n_photos: u32 },
    /// `movearm <pos>` — move the linear stage.
    MoveArm { position: u32 },
    /// `proj <id|all> <on|off>` — switch projector power.
    Projector { target: ProjectorTarget, on: bool },
    /// `focuspoint <x> <y>` — focus on a normalized point.
    FocusPoint { x: f32, y: f32 },
    /// `cb` — checkerboard test pattern.
    Checkerboard,
    /// `black` / `white` — solid fills.
    Black,
    White,
    /// `status` — session and sequencer state.
    Status,
    Help,
    Quit,
}

/// Parse one prompt line.
pub fn parse(input: &str) -> Result<ControllerCommand, MlightError> {
    let mut words = input.split_whitespace();
    let Some(head) = words.next() else {
        return Err(MlightError::InvalidCommand("empty command".into()));
    };
    let args: Vec<&str> = words.collect();

    let arg = |i: usize, what: &str| -> Result<&str, MlightError> {
        args.get(i).copied().ok_or_else(|| {
            MlightError::InvalidCommand(format!("{head} requires {what}"))
        })
    };
    let num = |i: usize, what: &str| -> Result<u32, MlightError> {
        arg(i, what)?
            .parse()
            .map_err(|_| MlightError::InvalidCommand(format!("{what} must be a number")))
    };

    match head {
        "takefull" => {
            let projector = num(0, "<proj>")?;
            let position = num(1, "<pos>")?;
            let resolution = match args.get(2) {
                Some(s) => Some(s.parse::<Resolution>()?),
                None => None,
            };
            Ok(ControllerCommand::TakeFull {
                projector,
                position,
                resolution,
            })
        }
        "calibrate" => Ok(ControllerCommand::Calibrate {
            n_photos: num(0, "<nphotos>")?,
        }),
        "movearm" => Ok(ControllerCommand::MoveArm {
            position: num(0, "<pos>")?,
        }),
        "proj" => {
            let target = match arg(0, "<id|all>")? {
                "all" => ProjectorTarget::All,
                id => ProjectorTarget::Id(id.parse().map_err(|_| {
                    MlightError::InvalidCommand("projector id must be a number or 'all'".into())
                })?),
            };
            let on = match arg(1, "<on|off>")? {
                "on" => true,
                "off" => false,
                other => {
                    return Err(MlightError::InvalidCommand(format!(
                        "expected on or off, got {other:?}"
                    )))
                }
            };
            Ok(ControllerCommand::Projector { target, on })
        }
        "focuspoint" => {
            let coord = |i: usize, what: &str| -> Result<f32, MlightError> {
                arg(i, what)?.parse().map_err(|_| {
                    MlightError::InvalidCommand(format!("{what} must be a number in [0, 1]"))
                })
            };
            Ok(ControllerCommand::FocusPoint {
                x: coord(0, "<x>")?,
                y: coord(1, "<y>")?,
            })
        }
        "cb" => Ok(ControllerCommand::Checkerboard),
        "black" => Ok(ControllerCommand::Black),
        "white" => Ok(ControllerCommand::White),
        "status" => Ok(ControllerCommand::Status),
        "help" => Ok(ControllerCommand::Help),
        "quit" | "exit" => Ok(ControllerCommand::Quit),
        other => Err(MlightError::InvalidCommand(format!(
            "unknown command {other:?}; try help"
        ))),
    }
}

/// The `help` text.
pub fn help_text() -> &'static str {
    "commands:\n\
     \x20 takefull <proj> <pos> [max|high|medium|low]   capture both sweeps\n\
     \x20 calibrate <nphotos>                           calibration stills\n\
     \x20 movearm <pos>                                 move the linear stage\n\
     \x20 proj <id|all> <on|off>                        projector power\n\
     \x20 focuspoint <x> <y>                            focus on a point\n\
     \x20 cb | black | white                            test patterns\n\
     \x20 status                                        session state\n\
     \x20 help                                          this text\n\
     \x20 quit                                          exit"
}
