//! `-v/--verbose` and `DEVICETRUST_LOG_LEVEL`.
//!
//! Each `-v` raises the default filter one step past `error`. The environment
//! variable takes either a level name or its step number. `RUST_LOG` still
//! overrides the result per target.

use clap::{Arg, ArgAction, Command, builder::ValueParser};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order; the index is the step.
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(|level: &str| -> Result<u8, String> {
        let level = level.trim().to_ascii_lowercase();
        let step = match level.parse::<usize>() {
            Ok(step) if step < LOG_LEVELS.len() => Some(step),
            Ok(_) => None,
            Err(_) => LOG_LEVELS.iter().position(|name| *name == level),
        };
        step.and_then(|step| u8::try_from(step).ok()).ok_or_else(|| {
            format!(
                "invalid log level '{level}', expected one of {} or 0-{}",
                LOG_LEVELS.join(", "),
                LOG_LEVELS.len() - 1
            )
        })
    })
}

/// Default filter for a verbosity step. `None` keeps the subscriber default.
#[must_use]
pub const fn verbosity_level(step: u8) -> Option<Level> {
    match step {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help(format!(
                "Verbosity level: {} (default: error)",
                LOG_LEVELS.join(", ")
            ))
            .env("DEVICETRUST_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
