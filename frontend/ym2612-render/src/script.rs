//! Register-write scripts
//!
//! One command per line:
//!
//! ```text
//! # Comments start with '#'
//! w <port> <value>    write a byte to bus port 0-3
//! wait <cycles>       run for a number of 68000 cycles
//! frames <n>          run for a number of video frames
//! ```
//!
//! Numbers are decimal or `0x`-prefixed hexadecimal.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Write { port: u8, value: u8 },
    Wait { cycles: u32 },
    Frames { count: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("line {line}: unknown command '{command}'")]
    UnknownCommand { line: usize, command: String },
    #[error("line {line}: '{command}' takes {expected} argument(s), got {actual}")]
    ArgumentCount { line: usize, command: &'static str, expected: usize, actual: usize },
    #[error("line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },
    #[error("line {line}: {what} {value} is out of range (max {max})")]
    OutOfRange { line: usize, what: &'static str, value: u32, max: u32 },
}

/// Parse a full script. Line numbers in errors are 1-based.
///
/// # Errors
///
/// Returns an error for the first line that is not a valid command.
pub fn parse(script: &str) -> Result<Vec<Command>, ScriptError> {
    let mut commands = Vec::new();

    for (idx, line) in script.lines().enumerate() {
        let line_number = idx + 1;
        let line = line.split('#').next().unwrap_or_default();

        let tokens: Vec<_> = line.split_whitespace().collect();
        let Some((&command, arguments)) = tokens.split_first() else { continue };

        let command = match command.to_ascii_lowercase().as_str() {
            "w" => {
                expect_arguments(line_number, "w", 2, arguments)?;
                let port = parse_bounded(line_number, "port", arguments[0], 3)?;
                let value = parse_bounded(line_number, "value", arguments[1], 0xFF)?;
                Command::Write { port: port as u8, value: value as u8 }
            }
            "wait" => {
                expect_arguments(line_number, "wait", 1, arguments)?;
                Command::Wait { cycles: parse_number(line_number, arguments[0])? }
            }
            "frames" => {
                expect_arguments(line_number, "frames", 1, arguments)?;
                Command::Frames { count: parse_number(line_number, arguments[0])? }
            }
            _ => {
                return Err(ScriptError::UnknownCommand {
                    line: line_number,
                    command: command.into(),
                });
            }
        };

        commands.push(command);
    }

    Ok(commands)
}

fn expect_arguments(
    line: usize,
    command: &'static str,
    expected: usize,
    arguments: &[&str],
) -> Result<(), ScriptError> {
    if arguments.len() != expected {
        return Err(ScriptError::ArgumentCount {
            line,
            command,
            expected,
            actual: arguments.len(),
        });
    }

    Ok(())
}

fn parse_number(line: usize, token: &str) -> Result<u32, ScriptError> {
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => token.parse(),
    };

    parsed.map_err(|_| ScriptError::InvalidNumber { line, token: token.into() })
}

fn parse_bounded(
    line: usize,
    what: &'static str,
    token: &str,
    max: u32,
) -> Result<u32, ScriptError> {
    let value = parse_number(line, token)?;
    if value > max {
        return Err(ScriptError::OutOfRange { line, what, value, max });
    }

    Ok(value)
}
