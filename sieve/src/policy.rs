//! Policy files and their publication to the filter catalog.
//!
//! A policy file has one table per event kind:
//!
//! ```toml
//! [open]
//! mode = "deny"
//! basenames = ["shadow", "sudoers"]
//! auids = [0]
//! auid_range = { min = 1000, max = 1999 }
//!
//! [open.flags]
//! flags = 0x241     # O_WRONLY | O_CREAT | O_TRUNC
//!
//! [splice]
//! mode = "deny"
//!
//! [splice.flags]
//! pipe_exit_flag = 0x10
//! ```
//!
//! Event kinds without a table are unfiltered.

use std::{collections::BTreeMap, path::Path};

use serde::Deserialize;
use sieve_common::{
	Basename, CatalogKey, EventMaskFilter, EventType, Filter, FlagField, Policy, PolicyMode, U32FlagsFilter,
	U32RangeFilter, U64FlagsFilter, AUID_APPROVERS_CAPACITY, BASENAME_APPROVERS_CAPACITY,
};
use tracing::warn;

use crate::{config::parse_hooked_event, Error, Result};

// region:    --- Raw

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeRaw {
	NoFilter,
	Accept,
	Deny,
}

impl From<ModeRaw> for PolicyMode {
	fn from(value: ModeRaw) -> Self {
		match value {
			ModeRaw::NoFilter => PolicyMode::NoFilter,
			ModeRaw::Accept => PolicyMode::Accept,
			ModeRaw::Deny => PolicyMode::Deny,
		}
	}
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct RangeRaw {
	min: u32,
	max: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventPolicyRaw {
	mode: ModeRaw,
	#[serde(default)]
	basenames: Vec<String>,
	#[serde(default)]
	flags: BTreeMap<String, u64>,
	#[serde(default)]
	auids: Vec<u32>,
	auid_range: Option<RangeRaw>,
}

// endregion: --- Raw

// region:    --- Compiled

/// Validated policy, as the set of catalog entries it publishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledPolicy {
	entries: BTreeMap<CatalogKey, Filter>,
}

impl CompiledPolicy {
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|cause| Error::ConfigRead {
			path: path.to_path_buf(),
			cause,
		})?;
		Self::from_toml(&content)
	}

	pub fn from_toml(content: &str) -> Result<Self> {
		let raw: BTreeMap<String, EventPolicyRaw> = toml::from_str(content)?;

		let mut entries = BTreeMap::new();
		let mut basenames: BTreeMap<Basename, u64> = BTreeMap::new();
		let mut auids: BTreeMap<u32, u64> = BTreeMap::new();

		for (name, policy) in raw {
			let event = parse_hooked_event(&name)?;

			for name in &policy.basenames {
				let basename = Basename::new(name.as_bytes()).ok_or_else(|| Error::InvalidBasename(name.clone()))?;
				*basenames.entry(basename).or_default() |= event.mask();
			}

			for (field_name, value) in &policy.flags {
				let field = FlagField::from_name(event, field_name).ok_or_else(|| Error::UnknownFlagField {
					event,
					field: field_name.clone(),
				})?;
				entries.insert(CatalogKey::Flags(event, field), compile_flags(field, *value)?);
			}

			for auid in &policy.auids {
				*auids.entry(*auid).or_default() |= event.mask();
			}

			if let Some(RangeRaw { min, max }) = policy.auid_range {
				if min > max {
					return Err(Error::InvertedAuidRange { event, min, max });
				}
				entries.insert(CatalogKey::AuidRange(event), Filter::Range(U32RangeFilter { min, max }));
			}

			// flag and auid approvers make a rejection depend on the caller, not
			// on the object alone
			let contextual = !policy.flags.is_empty() || !policy.auids.is_empty() || policy.auid_range.is_some();
			entries.insert(
				CatalogKey::Policy(event),
				Filter::Policy(Policy::new(policy.mode.into(), contextual)),
			);
		}

		check_capacity("basename", basenames.len(), BASENAME_APPROVERS_CAPACITY)?;
		check_capacity("auid", auids.len(), AUID_APPROVERS_CAPACITY)?;

		for (basename, event_mask) in basenames {
			entries.insert(CatalogKey::Basename(basename), Filter::EventMask(EventMaskFilter { event_mask }));
		}
		for (auid, event_mask) in auids {
			entries.insert(CatalogKey::Auid(auid), Filter::EventMask(EventMaskFilter { event_mask }));
		}

		Ok(Self { entries })
	}

	pub fn get(&self, key: &CatalogKey) -> Option<&Filter> {
		self.entries.get(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&CatalogKey, &Filter)> {
		self.entries.iter()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

fn check_capacity(kind: &'static str, count: usize, capacity: u32) -> Result<()> {
	if count > capacity as usize {
		return Err(Error::TooManyApprovers { kind, count, capacity });
	}
	Ok(())
}

fn compile_flags(field: FlagField, value: u64) -> Result<Filter> {
	if field.is_wide() {
		return Ok(Filter::U64Flags(U64FlagsFilter::new(value)));
	}
	let value = u32::try_from(value).map_err(|_| Error::FlagOutOfRange {
		field: field.name(),
		value,
	})?;
	Ok(Filter::U32Flags(U32FlagsFilter::new(value)))
}

// endregion: --- Compiled

// region:    --- Publish

/// Write side of the filter catalog. Every call replaces or removes exactly
/// one element, so the hot path never sees a half-written entry.
pub trait CatalogWriter {
	fn put(&mut self, key: &CatalogKey, filter: &Filter) -> Result<()>;

	fn remove(&mut self, key: &CatalogKey) -> Result<()>;

	/// Invalidates every discarder created under earlier policies.
	fn bump_discarders_revision(&mut self) -> Result<u32>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
	pub written: usize,
	pub removed: usize,
	pub revision: u32,
}

/// Moves the catalog from `previous` to `next`: new and changed entries are
/// written, entries `next` no longer has are removed, then the discarders
/// revision is bumped.
///
/// The revision is bumped even when a write fails, since the entries written
/// before it may already have changed what the approvers decide.
pub fn publish<W: CatalogWriter>(writer: &mut W, previous: &CompiledPolicy, next: &CompiledPolicy) -> Result<PublishReport> {
	let mut report = PublishReport::default();
	let applied = apply(writer, previous, next, &mut report);
	report.revision = writer.bump_discarders_revision()?;
	applied?;
	Ok(report)
}

/// Publishes `next` over `previous`, and on failure moves the catalog back to
/// `previous`. The error returned is the one that stopped the publication.
pub fn republish<W: CatalogWriter>(
	writer: &mut W,
	previous: &CompiledPolicy,
	next: &CompiledPolicy,
) -> Result<PublishReport> {
	let err = match publish(writer, previous, next) {
		Ok(report) => return Ok(report),
		Err(err) => err,
	};
	if let Err(rollback) = publish(writer, next, previous) {
		warn!("catalog rollback failed, approvers may follow a mix of both policies: {rollback}");
	}
	Err(err)
}

fn apply<W: CatalogWriter>(
	writer: &mut W,
	previous: &CompiledPolicy,
	next: &CompiledPolicy,
	report: &mut PublishReport,
) -> Result<()> {
	for (key, filter) in next.iter() {
		if previous.get(key) == Some(filter) {
			continue;
		}
		writer.put(key, filter)?;
		report.written += 1;
	}

	for (key, _) in previous.iter() {
		if next.get(key).is_none() {
			writer.remove(key)?;
			report.removed += 1;
		}
	}

	Ok(())
}

// endregion: --- Publish

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;

	#[derive(Debug, Clone, PartialEq, Eq)]
	enum Op {
		Put(CatalogKey),
		Remove(CatalogKey),
		Bump,
	}

	#[derive(Default)]
	struct MemWriter {
		entries: BTreeMap<CatalogKey, Filter>,
		revision: u32,
		ops: Vec<Op>,
		/// Puts of new keys fail past this many entries, like a full map.
		capacity: Option<usize>,
	}

	impl CatalogWriter for MemWriter {
		fn put(&mut self, key: &CatalogKey, filter: &Filter) -> crate::Result<()> {
			let full = self.capacity.is_some_and(|cap| self.entries.len() >= cap);
			if full && !self.entries.contains_key(key) {
				return Err(Error::custom("map full"));
			}
			self.entries.insert(*key, *filter);
			self.ops.push(Op::Put(*key));
			Ok(())
		}

		fn remove(&mut self, key: &CatalogKey) -> crate::Result<()> {
			self.entries.remove(key);
			self.ops.push(Op::Remove(*key));
			Ok(())
		}

		fn bump_discarders_revision(&mut self) -> crate::Result<u32> {
			self.revision += 1;
			self.ops.push(Op::Bump);
			Ok(self.revision)
		}
	}

	const FX_POLICY: &str = r#"
[open]
mode = "deny"
basenames = ["shadow", "passwd"]
auids = [0]

[open.flags]
flags = 0x241
resolve = 0x8

[splice]
mode = "deny"
basenames = ["shadow"]
auids = [0]
auid_range = { min = 1000, max = 1999 }

[splice.flags]
pipe_exit_flag = 0x10
"#;

	fn fx_basename(name: &str) -> Result<Basename> {
		Ok(Basename::new(name.as_bytes()).ok_or("bad fixture basename")?)
	}

	#[test]
	fn compile_full_policy() -> Result<()> {
		// -- Exec
		let policy = CompiledPolicy::from_toml(FX_POLICY)?;

		// -- Check
		let both = EventType::Open.mask() | EventType::Splice.mask();
		assert_eq!(
			policy.get(&CatalogKey::Basename(fx_basename("shadow")?)),
			Some(&Filter::EventMask(EventMaskFilter { event_mask: both }))
		);
		assert_eq!(
			policy.get(&CatalogKey::Basename(fx_basename("passwd")?)),
			Some(&Filter::EventMask(EventMaskFilter {
				event_mask: EventType::Open.mask()
			}))
		);
		assert_eq!(
			policy.get(&CatalogKey::Auid(0)),
			Some(&Filter::EventMask(EventMaskFilter { event_mask: both }))
		);
		assert_eq!(
			policy.get(&CatalogKey::Flags(EventType::Open, FlagField::OpenFlags)),
			Some(&Filter::U32Flags(U32FlagsFilter::new(0x241)))
		);
		assert_eq!(
			policy.get(&CatalogKey::Flags(EventType::Open, FlagField::Openat2Resolve)),
			Some(&Filter::U64Flags(U64FlagsFilter::new(0x8)))
		);
		assert_eq!(
			policy.get(&CatalogKey::AuidRange(EventType::Splice)),
			Some(&Filter::Range(U32RangeFilter { min: 1000, max: 1999 }))
		);
		assert_eq!(
			policy.get(&CatalogKey::Policy(EventType::Open)),
			Some(&Filter::Policy(Policy::new(PolicyMode::Deny, true)))
		);
		// 2 basenames, 1 auid, 3 flags, 1 range, 2 policies
		assert_eq!(policy.len(), 9);

		Ok(())
	}

	#[test]
	fn compile_basename_only_policy_is_object_scoped() -> Result<()> {
		// -- Exec
		let policy = CompiledPolicy::from_toml("[open]\nmode = \"deny\"\nbasenames = [\"shadow\"]")?;

		// -- Check
		assert_eq!(
			policy.get(&CatalogKey::Policy(EventType::Open)),
			Some(&Filter::Policy(Policy::new(PolicyMode::Deny, false)))
		);

		Ok(())
	}

	#[test]
	fn compile_rejects_malformed_values() -> Result<()> {
		// -- Setup & Fixtures
		let fx_long = "x".repeat(64);

		// -- Exec & Check
		assert!(matches!(
			CompiledPolicy::from_toml(&format!("[open]\nmode = \"deny\"\nbasenames = [\"{fx_long}\"]")),
			Err(Error::InvalidBasename(_))
		));
		assert!(matches!(
			CompiledPolicy::from_toml("[open]\nmode = \"deny\"\nbasenames = [\"etc/shadow\"]"),
			Err(Error::InvalidBasename(_))
		));
		assert!(matches!(
			CompiledPolicy::from_toml("[splice]\nmode = \"deny\"\nauid_range = { min = 10, max = 9 }"),
			Err(Error::InvertedAuidRange { min: 10, max: 9, .. })
		));
		assert!(matches!(
			CompiledPolicy::from_toml("[open]\nmode = \"deny\"\n[open.flags]\npipe_exit_flag = 1"),
			Err(Error::UnknownFlagField { .. })
		));
		assert!(matches!(
			CompiledPolicy::from_toml("[open]\nmode = \"deny\"\n[open.flags]\nflags = 0x100000000"),
			Err(Error::FlagOutOfRange { field: "flags", .. })
		));
		assert!(matches!(
			CompiledPolicy::from_toml("[exec]\nmode = \"deny\""),
			Err(Error::UnknownEvent(_))
		));
		assert!(matches!(
			CompiledPolicy::from_toml("[open]\nmode = \"maybe\""),
			Err(Error::TomlDe(_))
		));

		Ok(())
	}

	#[test]
	fn publish_writes_then_bumps_revision() -> Result<()> {
		// -- Setup & Fixtures
		let mut writer = MemWriter::default();
		let next = CompiledPolicy::from_toml(FX_POLICY)?;

		// -- Exec
		let report = publish(&mut writer, &CompiledPolicy::default(), &next)?;

		// -- Check
		assert_eq!(report.written, next.len());
		assert_eq!(report.removed, 0);
		assert_eq!(report.revision, 1);
		assert_eq!(writer.ops.last(), Some(&Op::Bump));
		assert_eq!(writer.entries.len(), next.len());

		Ok(())
	}

	#[test]
	fn publish_replaces_changed_and_removes_stale() -> Result<()> {
		// -- Setup & Fixtures
		let mut writer = MemWriter::default();
		let previous = CompiledPolicy::from_toml(FX_POLICY)?;
		publish(&mut writer, &CompiledPolicy::default(), &previous)?;
		writer.ops.clear();
		let next = CompiledPolicy::from_toml("[open]\nmode = \"deny\"\nbasenames = [\"shadow\"]")?;

		// -- Exec
		let report = publish(&mut writer, &previous, &next)?;

		// -- Check
		// the open policy loses its contextual bit and shadow loses splice
		assert_eq!(report.written, 2);
		assert_eq!(report.removed, previous.len() - 2);
		assert_eq!(report.revision, 2);
		assert_eq!(writer.entries, next.entries);
		let first_remove = writer.ops.iter().position(|op| matches!(op, Op::Remove(_)));
		let last_put = writer.ops.iter().rposition(|op| matches!(op, Op::Put(_)));
		assert!(last_put < first_remove);
		assert_eq!(writer.ops.last(), Some(&Op::Bump));

		Ok(())
	}

	#[test]
	fn publish_same_policy_only_bumps() -> Result<()> {
		// -- Setup & Fixtures
		let mut writer = MemWriter::default();
		let policy = CompiledPolicy::from_toml(FX_POLICY)?;

		// -- Exec
		let report = publish(&mut writer, &policy, &policy)?;

		// -- Check
		assert_eq!(report, PublishReport { written: 0, removed: 0, revision: 1 });
		assert_eq!(writer.ops, vec![Op::Bump]);

		Ok(())
	}

	#[test]
	fn compile_rejects_more_approvers_than_maps_hold() -> Result<()> {
		// -- Setup & Fixtures
		let fx_names = |count: usize| (0..count).map(|i| format!("\"f{i}\"")).collect::<Vec<_>>().join(", ");
		let fx_auids = (0..129).map(|i| i.to_string()).collect::<Vec<_>>().join(", ");

		// -- Exec
		let full = CompiledPolicy::from_toml(&format!("[open]\nmode = \"deny\"\nbasenames = [{}]", fx_names(255)));
		let over = CompiledPolicy::from_toml(&format!("[open]\nmode = \"deny\"\nbasenames = [{}]", fx_names(256)));
		let over_auids = CompiledPolicy::from_toml(&format!("[open]\nmode = \"deny\"\nauids = [{fx_auids}]"));

		// -- Check
		assert_eq!(full?.len(), 256);
		assert!(matches!(
			over,
			Err(Error::TooManyApprovers {
				kind: "basename",
				count: 256,
				capacity: 255
			})
		));
		assert!(matches!(
			over_auids,
			Err(Error::TooManyApprovers {
				kind: "auid",
				count: 129,
				..
			})
		));

		Ok(())
	}

	#[test]
	fn publish_failed_write_still_bumps_revision() -> Result<()> {
		// -- Setup & Fixtures
		let mut writer = MemWriter {
			capacity: Some(3),
			..Default::default()
		};
		let next = CompiledPolicy::from_toml(FX_POLICY)?;

		// -- Exec
		let res = publish(&mut writer, &CompiledPolicy::default(), &next);

		// -- Check
		assert!(res.is_err());
		assert_eq!(writer.entries.len(), 3);
		assert_eq!(writer.revision, 1);
		assert_eq!(writer.ops.last(), Some(&Op::Bump));

		Ok(())
	}

	#[test]
	fn republish_failure_restores_previous_entries() -> Result<()> {
		// -- Setup & Fixtures
		let mut writer = MemWriter::default();
		let previous = CompiledPolicy::from_toml("[open]\nmode = \"deny\"\nbasenames = [\"shadow\"]")?;
		publish(&mut writer, &CompiledPolicy::default(), &previous)?;
		writer.capacity = Some(previous.len() + 2);
		let next = CompiledPolicy::from_toml(FX_POLICY)?;

		// -- Exec
		let res = republish(&mut writer, &previous, &next);

		// -- Check
		assert!(res.is_err());
		assert_eq!(writer.entries, previous.entries);
		// initial publish, failed publish, rollback
		assert_eq!(writer.revision, 3);

		Ok(())
	}

	#[test]
	fn republish_success_matches_publish() -> Result<()> {
		// -- Setup & Fixtures
		let mut writer = MemWriter::default();
		let next = CompiledPolicy::from_toml(FX_POLICY)?;

		// -- Exec
		let report = republish(&mut writer, &CompiledPolicy::default(), &next)?;

		// -- Check
		assert_eq!(report.written, next.len());
		assert_eq!(report.revision, 1);
		assert_eq!(writer.entries, next.entries);

		Ok(())
	}
}

// endregion: --- Tests
