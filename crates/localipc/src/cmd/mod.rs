use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept clients forever; print every streamed item and acknowledge it.
    Serve(ServeArgs),
    /// Stream items to a server and print its reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint path to bind (socket file, or \\.\pipe\NAME on Windows).
    pub endpoint: PathBuf,
    /// Octal mode applied to the socket file.
    #[arg(long, default_value = "622", value_parser = parse_mode)]
    pub mode: u32,
    /// Per-item read timeout (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s", env = "LOCALIPC_READ_TIMEOUT")]
    pub read_timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Endpoint path to connect to.
    pub endpoint: PathBuf,
    /// Items to stream; each is parsed as JSON, falling back to a string.
    #[arg(conflicts_with = "count")]
    pub items: Vec<String>,
    /// Stream the integers 0..N instead of explicit items.
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
    /// Budget for connecting and for each read and write (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s", env = "LOCALIPC_TIMEOUT")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

fn parse_mode(input: &str) -> Result<u32, String> {
    let digits = input.strip_prefix("0o").unwrap_or(input);
    let mode = u32::from_str_radix(digits, 8).map_err(|err| format!("invalid octal mode: {err}"))?;
    if mode > 0o777 {
        return Err(format!("mode {input} exceeds 777"));
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn parse_mode_reads_octal() {
        assert_eq!(parse_mode("622").unwrap(), 0o622);
        assert_eq!(parse_mode("0o600").unwrap(), 0o600);
        assert!(parse_mode("9").is_err());
        assert!(parse_mode("1777").is_err());
    }
}
