//! Agent configuration.
//!
//! ```toml
//! policy = "/etc/sieve/policy.toml"
//! events = ["open", "splice"]
//!
//! [constants]
//! kernel_has_legacy_pipe_inode_info = 0
//! sizeof_pipe_buffer = 40
//! # ...every kernel layout constant
//!
//! [discarders]
//! ttl = "10s"
//! sweep_interval = "30s"
//! mount_poll_interval = "5s"
//! ```

use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
	time::Duration,
};

use serde::Deserialize;
use sieve_common::{event_mask_of, ConstantTable, EventType};

use crate::{Error, Result};

/// Event kinds the eBPF object has hooks for.
pub const HOOKED_EVENTS: [EventType; 2] = [EventType::Open, EventType::Splice];

const DEFAULT_TTL: Duration = Duration::from_secs(10);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_MOUNT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigRaw {
	policy: Option<PathBuf>,
	events: Option<Vec<String>>,
	#[serde(default)]
	constants: BTreeMap<String, u64>,
	#[serde(default)]
	discarders: DiscardersRaw,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DiscardersRaw {
	ttl: Option<String>,
	sweep_interval: Option<String>,
	mount_poll_interval: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscarderConfig {
	pub ttl: Duration,
	pub sweep_interval: Duration,
	pub mount_poll_interval: Duration,
}

impl Default for DiscarderConfig {
	fn default() -> Self {
		Self {
			ttl: DEFAULT_TTL,
			sweep_interval: DEFAULT_SWEEP_INTERVAL,
			mount_poll_interval: DEFAULT_MOUNT_POLL_INTERVAL,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	pub policy: Option<PathBuf>,
	pub events: Vec<EventType>,
	pub constants: BTreeMap<String, u64>,
	pub discarders: DiscarderConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			policy: None,
			events: HOOKED_EVENTS.to_vec(),
			constants: BTreeMap::new(),
			discarders: DiscarderConfig::default(),
		}
	}
}

impl Config {
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|cause| Error::ConfigRead {
			path: path.to_path_buf(),
			cause,
		})?;
		Self::from_toml(&content)
	}

	pub fn from_toml(content: &str) -> Result<Self> {
		let raw: ConfigRaw = toml::from_str(content)?;

		let events = match raw.events {
			Some(names) => names
				.iter()
				.map(|name| parse_hooked_event(name))
				.collect::<Result<Vec<_>>>()?,
			None => HOOKED_EVENTS.to_vec(),
		};

		let defaults = DiscarderConfig::default();
		let discarders = DiscarderConfig {
			ttl: parse_duration_or(raw.discarders.ttl, defaults.ttl)?,
			sweep_interval: parse_duration_or(raw.discarders.sweep_interval, defaults.sweep_interval)?,
			mount_poll_interval: parse_duration_or(raw.discarders.mount_poll_interval, defaults.mount_poll_interval)?,
		};

		Ok(Self {
			policy: raw.policy,
			events,
			constants: raw.constants,
			discarders,
		})
	}

	/// Builds the constant table from the configuration, then the command line
	/// overrides on top.
	pub fn constant_table(&self, overrides: &[(String, u64)]) -> Result<ConstantTable> {
		let entries = self
			.constants
			.iter()
			.chain(overrides.iter().map(|(k, v)| (k, v)))
			.map(|(k, v)| (k.as_str(), *v));

		Ok(ConstantTable::from_entries(entries)?)
	}

	pub fn enabled_mask(&self) -> u64 {
		event_mask_of(&self.events)
	}
}

pub fn parse_hooked_event(name: &str) -> Result<EventType> {
	let event = EventType::from_name(name).ok_or_else(|| Error::UnknownEvent(name.to_string()))?;
	if !HOOKED_EVENTS.contains(&event) {
		return Err(Error::UnhookedEvent(event));
	}
	Ok(event)
}

fn parse_duration_or(value: Option<String>, default: Duration) -> Result<Duration> {
	match value {
		Some(value) => humantime::parse_duration(&value).map_err(|cause| Error::InvalidDuration { value, cause }),
		None => Ok(default),
	}
}

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;
	use sieve_common::{ConstantKey, ConstantSource};

	fn fx_constants_toml() -> String {
		ConstantKey::ALL
			.iter()
			.map(|key| format!("{} = {}\n", key.name(), key.index() * 4))
			.collect()
	}

	#[test]
	fn config_full_file() -> Result<()> {
		// -- Setup & Fixtures
		let fx_toml = format!(
			r#"
policy = "/etc/sieve/policy.toml"
events = ["splice"]

[discarders]
ttl = "2m"
sweep_interval = "15s"

[constants]
{}"#,
			fx_constants_toml()
		);

		// -- Exec
		let config = Config::from_toml(&fx_toml)?;

		// -- Check
		assert_eq!(config.policy, Some(PathBuf::from("/etc/sieve/policy.toml")));
		assert_eq!(config.events, vec![EventType::Splice]);
		assert_eq!(config.enabled_mask(), EventType::Splice.mask());
		assert_eq!(config.discarders.ttl, Duration::from_secs(120));
		assert_eq!(config.discarders.sweep_interval, Duration::from_secs(15));
		assert_eq!(config.discarders.mount_poll_interval, DEFAULT_MOUNT_POLL_INTERVAL);
		assert_eq!(config.constants.len(), ConstantKey::ALL.len());

		Ok(())
	}

	#[test]
	fn config_empty_file_defaults() -> Result<()> {
		// -- Exec
		let config = Config::from_toml("")?;

		// -- Check
		assert_eq!(config, Config::default());
		assert_eq!(config.enabled_mask(), EventType::Open.mask() | EventType::Splice.mask());

		Ok(())
	}

	#[test]
	fn config_rejects_bad_values() -> Result<()> {
		// -- Exec & Check
		assert!(matches!(
			Config::from_toml("[discarders]\nttl = \"soon\""),
			Err(Error::InvalidDuration { .. })
		));
		assert!(matches!(
			Config::from_toml("events = [\"exec\"]"),
			Err(Error::UnknownEvent(name)) if name == "exec"
		));
		assert!(matches!(
			Config::from_toml("events = [\"mkdir\"]"),
			Err(Error::UnhookedEvent(EventType::Mkdir))
		));
		assert!(matches!(Config::from_toml("verbose = true"), Err(Error::TomlDe(_))));

		Ok(())
	}

	#[test]
	fn constant_table_overrides_win() -> Result<()> {
		// -- Setup & Fixtures
		let config = Config::from_toml(&format!("[constants]\n{}", fx_constants_toml()))?;
		let fx_overrides = vec![("pipe_buffer_flags_offset".to_string(), 24)];

		// -- Exec
		let table = config.constant_table(&fx_overrides)?;

		// -- Check
		assert_eq!(table.resolve(ConstantKey::PipeBufferFlagsOffset), 24);
		assert_eq!(
			table.resolve(ConstantKey::InodeInoOffset),
			ConstantKey::InodeInoOffset.index() as u64 * 4
		);

		Ok(())
	}

	#[test]
	fn constant_table_missing_keys_fail() -> Result<()> {
		// -- Setup & Fixtures
		let config = Config::from_toml("[constants]\nsizeof_pipe_buffer = 40")?;

		// -- Exec
		let res = config.constant_table(&[]);

		// -- Check
		assert!(matches!(res, Err(Error::Constant(sieve_common::ConstantError::Missing(missing))) if missing.len() == ConstantKey::ALL.len() - 1));

		Ok(())
	}
}

// endregion: --- Tests
