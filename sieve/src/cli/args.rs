use std::path::PathBuf;

use clap::Parser;
use humantime::Duration;

#[derive(Parser, Debug)]
#[command(name = "sieve", about = "In-kernel triage of open and splice events")]
pub struct Cli {
	#[arg(long, help = "Agent configuration file (TOML)")]
	pub config: Option<PathBuf>,

	#[arg(long, help = "Policy file (TOML), overrides the one named in the configuration")]
	pub policy: Option<PathBuf>,

	#[arg(
		long = "constant",
		value_name = "KEY=VALUE",
		value_parser = parse_constant,
		help = "Kernel layout constant, repeatable. Overrides the configuration (e.g. pipe_buffer_flags_offset=24)"
	)]
	pub constants: Vec<(String, u64)>,

	#[arg(long, help = "Time duration (e.g., 20s, 5m, 1h). Runs until interrupted when omitted")]
	pub time: Option<Duration>,

	#[arg(long, default_value = "10s", help = "Interval between two stats reports")]
	pub stats_interval: Duration,
}

/// Parses `key=value`, the value in decimal or `0x` hexadecimal.
pub fn parse_constant(s: &str) -> Result<(String, u64), String> {
	let (key, value) = s.split_once('=').ok_or_else(|| format!("'{s}' is not KEY=VALUE"))?;
	let key = key.trim();
	if key.is_empty() {
		return Err(format!("'{s}' has an empty key"));
	}

	let value = value.trim();
	let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
		Some(hex) => u64::from_str_radix(hex, 16),
		None => value.parse::<u64>(),
	};
	let value = parsed.map_err(|e| format!("invalid value in '{s}': {e}"))?;

	Ok((key.to_string(), value))
}

// region:    --- Tests


// endregion: --- Tests
