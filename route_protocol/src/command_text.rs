use std::num::ParseIntError;

use thiserror::Error;

use crate::{CommandPayload, Direction};

/// Largest `step` count a single command line may ask for.
pub const MAX_STEP_COUNT: u32 = 10_000;

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("{context} {value} is above the limit of {max}")]
    CountOutOfRange {
        value: u32,
        context: &'static str,
        max: u32,
    },
    #[error("invalid direction '{0}'")]
    InvalidDirection(String),
    #[error("invalid target '{target}' for {verb}")]
    InvalidTarget { verb: &'static str, target: String },
    #[error("unexpected flag '{0}'")]
    UnexpectedFlag(String),
}

pub fn parse_command_line(input: &str) -> Result<CommandPayload, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "click" | "edit" => {
            let x_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("x"))?;
            let y_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("y"))?;
            let x = parse_i32(x_str, "click x")?;
            let y = parse_i32(y_str, "click y")?;
            let reverse = match parts.next().map(|flag| flag.to_ascii_lowercase()) {
                None => false,
                Some(flag) if flag == "reverse" || flag == "shift" => true,
                Some(flag) => return Err(CommandParseError::UnexpectedFlag(flag)),
            };
            Ok(CommandPayload::Click { x, y, reverse })
        }
        "route" => {
            let x_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("x"))?;
            let y_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("y"))?;
            let dir_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("direction"))?;
            let x = parse_i32(x_str, "route x")?;
            let y = parse_i32(y_str, "route y")?;
            let direction = Direction::from_name(dir_str)
                .ok_or_else(|| CommandParseError::InvalidDirection(dir_str.to_string()))?;
            Ok(CommandPayload::Route { x, y, direction })
        }
        "mode" => Ok(CommandPayload::ToggleMode),
        "run" | "pause" => Ok(CommandPayload::ToggleRun),
        "step" => {
            let steps_str = parts.next().unwrap_or("1");
            let steps = parse_u32(steps_str, "step count")?;
            if steps > MAX_STEP_COUNT {
                return Err(CommandParseError::CountOutOfRange {
                    value: steps,
                    context: "step count",
                    max: MAX_STEP_COUNT,
                });
            }
            Ok(CommandPayload::Step { steps })
        }
        "undo" | "back" => {
            let steps_str = parts.next().unwrap_or("1");
            let steps = parse_u32(steps_str, "undo count")?;
            Ok(CommandPayload::Undo { steps })
        }
        "reset" => Ok(CommandPayload::Reset),
        "clear" => {
            let target = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("clear target"))?
                .to_ascii_lowercase();
            match target.as_str() {
                "pieces" | "board" => Ok(CommandPayload::ClearPieces),
                "routes" | "directions" => Ok(CommandPayload::ClearRoutes),
                _ => Err(CommandParseError::InvalidTarget {
                    verb: "clear",
                    target,
                }),
            }
        }
        "random" => {
            let target = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("random target"))?
                .to_ascii_lowercase();
            match target.as_str() {
                "pieces" => {
                    let count_str = parts
                        .next()
                        .ok_or(CommandParseError::MissingArgument("piece count"))?;
                    let count = parse_u32(count_str, "random piece count")?;
                    Ok(CommandPayload::RandomPieces { count })
                }
                "routes" | "directions" => Ok(CommandPayload::RandomRoutes),
                _ => Err(CommandParseError::InvalidTarget {
                    verb: "random",
                    target,
                }),
            }
        }
        "policy" | "ai" => Ok(CommandPayload::RequestPolicy),
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

fn parse_i32(value: &str, context: &'static str) -> Result<i32, CommandParseError> {
    value
        .parse::<i32>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_u32(value: &str, context: &'static str) -> Result<u32, CommandParseError> {
    value
        .parse::<u32>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}
