use zerocopy_derive::{FromBytes, Immutable, KnownLayout};

use crate::{Basename, PathKey};

/// Size of the arrays indexed by event type (index 0 is unused).
pub const EVENT_MAX: usize = 11;

/// Discardable event kinds form the contiguous range `Open..=Utimes`.
pub const FIRST_DISCARDER: EventType = EventType::Open;
pub const LAST_DISCARDER: EventType = EventType::Utimes;
pub const DISCARDER_SLOTS: usize = (LAST_DISCARDER as usize) - (FIRST_DISCARDER as usize) + 1;

#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
	Open = 1,
	Mkdir = 2,
	Link = 3,
	Rename = 4,
	Unlink = 5,
	Rmdir = 6,
	Chmod = 7,
	Chown = 8,
	Utimes = 9,
	Splice = 10,
}

impl EventType {
	pub const ALL: [EventType; EVENT_MAX - 1] = [
		EventType::Open,
		EventType::Mkdir,
		EventType::Link,
		EventType::Rename,
		EventType::Unlink,
		EventType::Rmdir,
		EventType::Chmod,
		EventType::Chown,
		EventType::Utimes,
		EventType::Splice,
	];

	pub const fn from_u64(value: u64) -> Option<Self> {
		match value {
			1 => Some(EventType::Open),
			2 => Some(EventType::Mkdir),
			3 => Some(EventType::Link),
			4 => Some(EventType::Rename),
			5 => Some(EventType::Unlink),
			6 => Some(EventType::Rmdir),
			7 => Some(EventType::Chmod),
			8 => Some(EventType::Chown),
			9 => Some(EventType::Utimes),
			10 => Some(EventType::Splice),
			_ => None,
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|evt| evt.name() == name)
	}

	pub const fn name(self) -> &'static str {
		match self {
			EventType::Open => "open",
			EventType::Mkdir => "mkdir",
			EventType::Link => "link",
			EventType::Rename => "rename",
			EventType::Unlink => "unlink",
			EventType::Rmdir => "rmdir",
			EventType::Chmod => "chmod",
			EventType::Chown => "chown",
			EventType::Utimes => "utimes",
			EventType::Splice => "splice",
		}
	}

	/// Bit of this event kind in every `event_mask` field.
	pub const fn mask(self) -> u64 {
		1 << (self as u64 - 1)
	}

	pub const fn index(self) -> u32 {
		self as u32
	}

	/// Slot in `DiscarderParams::timestamps`, `None` for kinds that cannot be discarded.
	pub const fn discarder_slot(self) -> Option<usize> {
		let value = self as usize;
		if value < FIRST_DISCARDER as usize || value > LAST_DISCARDER as usize {
			return None;
		}
		Some(value - FIRST_DISCARDER as usize)
	}
}

impl core::fmt::Display for EventType {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.write_str(self.name())
	}
}

/// Builds an `event_mask` out of a list of event kinds.
pub fn event_mask_of(events: &[EventType]) -> u64 {
	events.iter().fold(0, |mask, evt| mask | evt.mask())
}

// region:    --- Ring buffer records

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout)]
pub struct EventHeader {
	pub event_type: u64,
	pub timestamp: u64,
	pub pid: u32,
	pub tgid: u32,
	pub approval: u8, // see `Approval`
	pub _pad0: [u8; 7],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout)]
pub struct OpenEvent {
	pub header: EventHeader,
	pub file: PathKey,
	pub retval: i64,
	pub flags: u32,
	pub mode: u32,
	pub basename: Basename,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout)]
pub struct SpliceEvent {
	pub header: EventHeader,
	pub retval: i64,
	pub pipe_entry_flag: u32,
	pub pipe_exit_flag: u32,
}

#[derive(Clone, Copy, Debug)]
pub enum SieveEvent {
	Open(OpenEvent),
	Splice(SpliceEvent),
}

// endregion: --- Ring buffer records

// region:    --- Syscall cache

/// In-flight syscall state, keyed by `pid_tgid`, carried from the enter
/// tracepoint through the kernel hooks to the exit tracepoint.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout)]
pub struct SyscallCache {
	pub event_type: u64,
	pub timestamp: u64,
	pub file: PathKey,
	pub pipe: u64,
	pub flags: u32,
	pub mode: u32,
	pub pipe_entry_flag: u32,
	pub auid: u32,
	pub approval: u8,
	pub object_scoped: u8,
	pub has_file: u8,
	pub has_auid: u8,
	pub _pad0: [u8; 4],
	pub basename: Basename,
}

// endregion: --- Syscall cache

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;

	#[test]
	fn event_masks_are_distinct_bits() -> Result<()> {
		// -- Exec
		let combined = event_mask_of(&EventType::ALL);

		// -- Check
		assert_eq!(combined.count_ones() as usize, EventType::ALL.len());
		assert_eq!(EventType::Open.mask(), 1);
		assert_eq!(EventType::Splice.mask(), 1 << 9);

		Ok(())
	}

	#[test]
	fn discarder_slots_cover_the_discardable_range() -> Result<()> {
		// -- Check
		assert_eq!(EventType::Open.discarder_slot(), Some(0));
		assert_eq!(EventType::Utimes.discarder_slot(), Some(DISCARDER_SLOTS - 1));
		assert_eq!(EventType::Splice.discarder_slot(), None);

		Ok(())
	}

	#[test]
	fn event_names_resolve_both_ways() -> Result<()> {
		// -- Exec & Check
		for evt in EventType::ALL {
			assert_eq!(EventType::from_name(evt.name()), Some(evt));
			assert_eq!(EventType::from_u64(evt as u64), Some(evt));
		}
		assert_eq!(EventType::from_u64(0), None);
		assert_eq!(EventType::from_name("exec"), None);

		Ok(())
	}
}

// endregion: --- Tests
