//! Approver filter records and the catalog they are looked up in.
//!
//! The records below are the exact values stored in the kernel maps. The
//! `FilterCatalog` trait is the read side the approver engine works against;
//! the eBPF program implements it over its maps, tests implement it over plain
//! collections.

use zerocopy_derive::{FromBytes, Immutable, KnownLayout};

use crate::EventType;

pub const BASENAME_FILTER_SIZE: usize = 64;

/// Only this many bytes of a path are scanned when extracting a basename.
/// Also the size of the buffer the hot path copies user paths into (`PATH_MAX`).
pub const MAX_PATH_SCAN: usize = 4096;

pub const BASENAME_APPROVERS_CAPACITY: u32 = 255;
pub const AUID_APPROVERS_CAPACITY: u32 = 128;

// region:    --- Basename

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromBytes, Immutable, KnownLayout)]
pub struct Basename {
	pub value: [u8; BASENAME_FILTER_SIZE],
}

impl Default for Basename {
	fn default() -> Self {
		Self {
			value: [0; BASENAME_FILTER_SIZE],
		}
	}
}

impl Basename {
	/// Builds a basename key. Names that would not leave room for the trailing
	/// nul, or that contain a `/` or a nul byte, are rejected.
	pub fn new(name: &[u8]) -> Option<Self> {
		if name.is_empty() || name.len() >= BASENAME_FILTER_SIZE {
			return None;
		}
		if name.iter().any(|b| *b == b'/' || *b == 0) {
			return None;
		}

		let mut basename = Self::default();
		basename.value[..name.len()].copy_from_slice(name);
		Some(basename)
	}

	/// Extracts the last component of a nul-terminated or plain path. A
	/// component that does not fit yields the empty basename.
	pub fn from_path(path: &[u8]) -> Self {
		let len = path.iter().take(MAX_PATH_SCAN).position(|b| *b == 0).unwrap_or(path.len().min(MAX_PATH_SCAN));
		let path = &path[..len];

		let start = path.iter().rposition(|b| *b == b'/').map(|pos| pos + 1).unwrap_or(0);
		let name = &path[start..];

		Self::new(name).unwrap_or_default()
	}

	/// Basename of a path copied by a bounded string read into a buffer of
	/// `capacity` bytes. A copy that fills the buffer may have been cut short,
	/// so its last component is unknown: `None`.
	pub fn from_bounded_copy(copied: &[u8], capacity: usize) -> Option<Self> {
		let len = copied.iter().position(|b| *b == 0).unwrap_or(copied.len());
		if len + 1 >= capacity {
			return None;
		}
		Some(Self::from_path(&copied[..len]))
	}

	pub fn is_empty(&self) -> bool {
		self.value[0] == 0
	}

	pub fn as_bytes(&self) -> &[u8] {
		let len = self.value.iter().position(|b| *b == 0).unwrap_or(BASENAME_FILTER_SIZE);
		&self.value[..len]
	}
}

// endregion: --- Basename

// region:    --- Policy

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyMode {
	NoFilter = 0,
	Accept = 1,
	Deny = 2,
}

impl PolicyMode {
	pub const fn from_u8(value: u8) -> Self {
		match value {
			1 => PolicyMode::Accept,
			2 => PolicyMode::Deny,
			_ => PolicyMode::NoFilter,
		}
	}
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct Policy {
	pub mode: u8,
	/// Non-zero when a rejection depends on process context (auid) rather than
	/// on the object alone, in which case it must not seed a discarder.
	pub contextual: u8,
	pub _pad: [u8; 6],
}

impl Policy {
	pub const fn new(mode: PolicyMode, contextual: bool) -> Self {
		Self {
			mode: mode as u8,
			contextual: contextual as u8,
			_pad: [0; 6],
		}
	}

	pub const fn mode(&self) -> PolicyMode {
		PolicyMode::from_u8(self.mode)
	}
}

impl Default for Policy {
	fn default() -> Self {
		Self::new(PolicyMode::NoFilter, false)
	}
}

// endregion: --- Policy

// region:    --- Filter records

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct EventMaskFilter {
	pub event_mask: u64,
}

impl EventMaskFilter {
	pub fn matches(&self, event: EventType) -> bool {
		self.event_mask & event.mask() != 0
	}
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct U32FlagsFilter {
	pub flags: u32,
	pub is_set: u8,
	pub _pad: [u8; 3],
}

impl U32FlagsFilter {
	pub const fn new(flags: u32) -> Self {
		Self {
			flags,
			is_set: 1,
			_pad: [0; 3],
		}
	}

	pub fn matches(&self, value: u32) -> bool {
		self.is_set != 0 && self.flags & value != 0
	}
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct U64FlagsFilter {
	pub flags: u64,
	pub is_set: u8,
	pub _pad: [u8; 7],
}

impl U64FlagsFilter {
	pub const fn new(flags: u64) -> Self {
		Self {
			flags,
			is_set: 1,
			_pad: [0; 7],
		}
	}

	pub fn matches(&self, value: u64) -> bool {
		self.is_set != 0 && self.flags & value != 0
	}
}

/// Inclusive range.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct U32RangeFilter {
	pub min: u32,
	pub max: u32,
}

impl U32RangeFilter {
	pub fn contains(&self, value: u32) -> bool {
		self.min <= value && value <= self.max
	}
}

// endregion: --- Filter records

// region:    --- Flag fields

/// Syscall argument a flags approver applies to. The discriminant is the
/// second half of the flags approver map key.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlagField {
	OpenFlags = 0,
	Openat2Resolve = 1,
	SpliceEntryFlags = 2,
	SpliceExitFlags = 3,
}

impl FlagField {
	pub const ALL: [FlagField; 4] = [
		FlagField::OpenFlags,
		FlagField::Openat2Resolve,
		FlagField::SpliceEntryFlags,
		FlagField::SpliceExitFlags,
	];

	/// Wide fields are matched against a `U64FlagsFilter`.
	pub const fn is_wide(self) -> bool {
		matches!(self, FlagField::Openat2Resolve)
	}

	pub const fn event(self) -> EventType {
		match self {
			FlagField::OpenFlags | FlagField::Openat2Resolve => EventType::Open,
			FlagField::SpliceEntryFlags | FlagField::SpliceExitFlags => EventType::Splice,
		}
	}

	pub const fn name(self) -> &'static str {
		match self {
			FlagField::OpenFlags => "flags",
			FlagField::Openat2Resolve => "resolve",
			FlagField::SpliceEntryFlags => "pipe_entry_flag",
			FlagField::SpliceExitFlags => "pipe_exit_flag",
		}
	}

	pub fn from_name(event: EventType, name: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|field| field.event() == event && field.name() == name)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlagValue {
	pub field: FlagField,
	pub value: u64,
}

impl FlagValue {
	pub const fn new(field: FlagField, value: u64) -> Self {
		Self { field, value }
	}
}

/// Key of the flags approver maps: `(event index, flag field)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromBytes, Immutable, KnownLayout)]
pub struct FlagsKey {
	pub event_type: u32,
	pub field: u32,
}

impl FlagsKey {
	pub const fn new(event: EventType, field: FlagField) -> Self {
		Self {
			event_type: event.index(),
			field: field as u32,
		}
	}
}

// endregion: --- Flag fields

// region:    --- Catalog

/// One published filter value, as handed to the catalog writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
	Policy(Policy),
	EventMask(EventMaskFilter),
	U32Flags(U32FlagsFilter),
	U64Flags(U64FlagsFilter),
	Range(U32RangeFilter),
}

/// Location of one filter entry in the catalog. Basename and exact auid
/// approvers are shared by all event kinds and carry an event mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CatalogKey {
	Policy(EventType),
	Basename(Basename),
	Flags(EventType, FlagField),
	Auid(u32),
	AuidRange(EventType),
}

impl PartialOrd for Basename {
	fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Basename {
	fn cmp(&self, other: &Self) -> core::cmp::Ordering {
		self.value.cmp(&other.value)
	}
}

/// Read side of the filter catalog. A missing entry is the same as an unset one.
pub trait FilterCatalog {
	fn enabled_events(&self) -> EventMaskFilter;

	fn policy(&self, event: EventType) -> Option<Policy>;

	/// Event mask of the basename approver for `basename`.
	fn basename_approver(&self, basename: &Basename) -> Option<EventMaskFilter>;

	fn u32_flags_approver(&self, event: EventType, field: FlagField) -> Option<U32FlagsFilter>;

	fn u64_flags_approver(&self, event: EventType, field: FlagField) -> Option<U64FlagsFilter>;

	/// Event mask of the exact auid approver for `auid`.
	fn auid_approver(&self, auid: u32) -> Option<EventMaskFilter>;

	fn auid_range_approver(&self, event: EventType) -> Option<U32RangeFilter>;
}

// endregion: --- Catalog

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;

	#[test]
	fn basename_from_path_takes_last_component() -> Result<()> {
		// -- Exec & Check
		assert_eq!(Basename::from_path(b"/etc/passwd\0garbage").as_bytes(), b"passwd");
		assert_eq!(Basename::from_path(b"passwd").as_bytes(), b"passwd");
		assert!(Basename::from_path(b"/etc/").is_empty());
		assert!(Basename::from_path(b"").is_empty());

		Ok(())
	}

	#[test]
	fn basename_of_truncated_copy_is_unknown() -> Result<()> {
		// -- Setup & Fixtures
		let mut fx_path = b"/etc".to_vec();
		while fx_path.len() < 251 {
			fx_path.extend_from_slice(b"/.");
		}
		fx_path.extend_from_slice(b"/passwd");
		// what a 256 byte string read keeps: 255 bytes and the nul
		let mut fx_cut = fx_path[..255].to_vec();
		fx_cut.push(0);

		// -- Exec
		let cut = Basename::from_bounded_copy(&fx_cut, 256);
		let whole = Basename::from_bounded_copy(&fx_path, MAX_PATH_SCAN);

		// -- Check
		assert_eq!(cut, None);
		assert_eq!(whole.as_ref().map(|b| b.as_bytes()), Some(&b"passwd"[..]));
		assert_eq!(Basename::from_bounded_copy(b"/tmp/\0", MAX_PATH_SCAN), Some(Basename::default()));

		Ok(())
	}

	#[test]
	fn basename_too_long_is_empty() -> Result<()> {
		// -- Setup & Fixtures
		let fx_name = [b'a'; BASENAME_FILTER_SIZE];
		let fx_fits = [b'a'; BASENAME_FILTER_SIZE - 1];

		// -- Exec & Check
		assert!(Basename::new(&fx_name).is_none());
		assert!(Basename::from_path(&fx_name).is_empty());
		assert_eq!(Basename::new(&fx_fits).map(|b| b.as_bytes().len()), Some(BASENAME_FILTER_SIZE - 1));

		Ok(())
	}

	#[test]
	fn flags_filter_requires_is_set() -> Result<()> {
		// -- Setup & Fixtures
		let fx_unset = U32FlagsFilter {
			flags: 0o1,
			is_set: 0,
			_pad: [0; 3],
		};
		let fx_set = U32FlagsFilter::new(0o1 | 0o100);

		// -- Exec & Check
		assert!(!fx_unset.matches(0o1));
		assert!(fx_set.matches(0o100));
		assert!(!fx_set.matches(0o2));
		assert!(U64FlagsFilter::new(1 << 40).matches(1 << 40));

		Ok(())
	}

	#[test]
	fn range_filter_is_inclusive() -> Result<()> {
		// -- Setup & Fixtures
		let fx_range = U32RangeFilter { min: 10, max: 20 };

		// -- Exec & Check
		assert!(fx_range.contains(10));
		assert!(fx_range.contains(20));
		assert!(!fx_range.contains(9));
		assert!(!fx_range.contains(21));

		Ok(())
	}

	#[test]
	fn flag_fields_resolve_per_event() -> Result<()> {
		// -- Exec & Check
		assert_eq!(FlagField::from_name(EventType::Open, "flags"), Some(FlagField::OpenFlags));
		assert_eq!(FlagField::from_name(EventType::Splice, "flags"), None);
		assert_eq!(
			FlagField::from_name(EventType::Splice, "pipe_exit_flag"),
			Some(FlagField::SpliceExitFlags)
		);
		assert!(FlagField::Openat2Resolve.is_wide());

		Ok(())
	}
}

// endregion: --- Tests
