//! Control-plane side of the inode discarders: revision bumps, sweeping and
//! eviction.

use std::sync::{Arc, Mutex};

use aya::maps::{Array, HashMap, MapData};
use sieve_common::{
	mount_revision_slot, DiscarderEngine, EntryState, InodeDiscarderKey, InodeDiscarderParams, InodeDiscarderStore,
	InsertMode, RevisionSource,
};
use tracing::debug;

use crate::Result;

// uapi/linux/bpf.h
const BPF_ANY: u64 = 0;
const BPF_NOEXIST: u64 = 1;

/// `CLOCK_MONOTONIC` in nanoseconds, the clock `bpf_ktime_get_ns` reads.
pub fn monotonic_ns() -> u64 {
	let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
	let ret = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
	if ret != 0 {
		return 0;
	}
	(ts.tv_sec as u64).saturating_mul(1_000_000_000).saturating_add(ts.tv_nsec as u64)
}

// region:    --- Revisions

pub type SharedRevisions = Arc<Mutex<RevisionMaps>>;

pub struct RevisionMaps {
	discarders: Array<MapData, u32>,
	mounts: Array<MapData, u32>,
}

impl RevisionMaps {
	pub fn new(discarders: Array<MapData, u32>, mounts: Array<MapData, u32>) -> Self {
		Self { discarders, mounts }
	}

	pub fn into_shared(self) -> SharedRevisions {
		Arc::new(Mutex::new(self))
	}

	pub fn bump_discarders(&mut self) -> Result<u32> {
		let next = self.discarders.get(&0, 0)?.wrapping_add(1);
		self.discarders.set(0, next, 0)?;
		Ok(next)
	}

	/// Bumps the slot `mount_id` shares with other mounts; their discarders go
	/// stale as well.
	pub fn bump_mount(&mut self, mount_id: u32) -> Result<u32> {
		let slot = mount_revision_slot(mount_id);
		let next = self.mounts.get(&slot, 0)?.wrapping_add(1);
		self.mounts.set(slot, next, 0)?;
		Ok(next)
	}

	pub fn snapshot(&self) -> Result<RevisionSnapshot> {
		let discarders = self.discarders.get(&0, 0)?;
		let mounts = self.mounts.iter().collect::<core::result::Result<Vec<_>, _>>()?;
		Ok(RevisionSnapshot { discarders, mounts })
	}
}

/// Revisions copied out of the kernel at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionSnapshot {
	pub discarders: u32,
	pub mounts: Vec<u32>,
}

impl RevisionSource for RevisionSnapshot {
	fn discarders_revision(&self) -> u32 {
		self.discarders
	}

	fn mount_revision(&self, mount_id: u32) -> u32 {
		self.mounts
			.get(mount_revision_slot(mount_id) as usize)
			.copied()
			.unwrap_or_default()
	}
}

// endregion: --- Revisions

// region:    --- Table

/// Userspace handle on the kernel discarder map.
pub struct DiscarderTable {
	map: Mutex<HashMap<MapData, InodeDiscarderKey, InodeDiscarderParams>>,
}

impl DiscarderTable {
	pub fn new(map: HashMap<MapData, InodeDiscarderKey, InodeDiscarderParams>) -> Self {
		Self { map: Mutex::new(map) }
	}

	/// Entries readable right now. Keys the kernel evicts during the walk are
	/// skipped.
	pub fn entries(&self) -> Result<Vec<(InodeDiscarderKey, InodeDiscarderParams)>> {
		let map = self.map.lock()?;
		Ok(map.iter().filter_map(|entry| entry.ok()).collect())
	}

	/// Removes every stale or expired entry and returns how many went away.
	pub fn sweep<V: RevisionSource>(&self, now: u64, revisions: &V) -> Result<usize> {
		let doomed = sweep_candidates(self.entries()?, now, revisions);
		let removed = doomed.iter().filter(|key| DiscarderEngine::evict(self, key)).count();
		debug!("discarder sweep: {removed} of {} candidates removed", doomed.len());
		Ok(removed)
	}
}

impl InodeDiscarderStore for DiscarderTable {
	fn get(&self, key: &InodeDiscarderKey) -> Option<InodeDiscarderParams> {
		let map = self.map.lock().ok()?;
		map.get(key, 0).ok()
	}

	fn insert(&self, key: &InodeDiscarderKey, params: &InodeDiscarderParams, mode: InsertMode) -> core::result::Result<(), i64> {
		let flags = match mode {
			InsertMode::Any => BPF_ANY,
			InsertMode::NoExist => BPF_NOEXIST,
		};
		let mut map = self.map.lock().map_err(|_| -1i64)?;
		map.insert(key, params, flags).map_err(|_| -1i64)
	}

	fn remove(&self, key: &InodeDiscarderKey) -> bool {
		match self.map.lock() {
			Ok(mut map) => map.remove(key).is_ok(),
			Err(_) => false,
		}
	}
}

/// Keys whose entries no lookup would honor anymore.
pub fn sweep_candidates<V, I>(entries: I, now: u64, revisions: &V) -> Vec<InodeDiscarderKey>
where
	V: RevisionSource,
	I: IntoIterator<Item = (InodeDiscarderKey, InodeDiscarderParams)>,
{
	entries
		.into_iter()
		.filter(|(key, params)| EntryState::classify(params, key, now, revisions) != EntryState::Retained)
		.map(|(key, _)| key)
		.collect()
}

// endregion: --- Table

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;
	use sieve_common::{DiscarderParams, PathKey, MOUNT_REVISION_SLOTS};

	fn fx_entry(revision: u32, mount_revision: u32, expire_at: u64) -> InodeDiscarderParams {
		InodeDiscarderParams {
			params: DiscarderParams {
				event_mask: 1,
				expire_at,
				is_retained: 1,
				revision,
				..Default::default()
			},
			mount_revision,
			_pad: 0,
		}
	}

	fn fx_key(inode: u64, mount_id: u32) -> InodeDiscarderKey {
		InodeDiscarderKey::new(PathKey::new(inode, mount_id), true)
	}

	#[test]
	fn sweep_removes_exactly_stale_and_expired() -> Result<()> {
		// -- Setup & Fixtures
		let mut mounts = vec![0; MOUNT_REVISION_SLOTS as usize];
		mounts[7] = 2;
		let fx_revisions = RevisionSnapshot { discarders: 3, mounts };
		let fx_now = 1_000;
		let fx_entries = vec![
			(fx_key(1, 5), fx_entry(3, 0, 2_000)), // retained
			(fx_key(2, 5), fx_entry(2, 0, 2_000)), // old policy
			(fx_key(3, 7), fx_entry(3, 1, 2_000)), // mount went away
			(fx_key(4, 7), fx_entry(3, 2, 2_000)), // retained
			(fx_key(5, 5), fx_entry(3, 0, 1_000)), // expired
		];

		// -- Exec
		let doomed = sweep_candidates(fx_entries, fx_now, &fx_revisions);

		// -- Check
		assert_eq!(doomed, vec![fx_key(2, 5), fx_key(3, 7), fx_key(5, 5)]);

		Ok(())
	}

	#[test]
	fn snapshot_mount_slots_wrap() -> Result<()> {
		// -- Setup & Fixtures
		let mut mounts = vec![0; MOUNT_REVISION_SLOTS as usize];
		mounts[3] = 9;
		let fx_revisions = RevisionSnapshot { discarders: 0, mounts };

		// -- Check
		assert_eq!(fx_revisions.mount_revision(3), 9);
		assert_eq!(fx_revisions.mount_revision(MOUNT_REVISION_SLOTS + 3), 9);
		assert_eq!(RevisionSnapshot::default().mount_revision(3), 0);

		Ok(())
	}

	#[test]
	fn monotonic_clock_advances() -> Result<()> {
		// -- Exec
		let first = monotonic_ns();
		let second = monotonic_ns();

		// -- Check
		assert!(first > 0);
		assert!(second >= first);

		Ok(())
	}
}

// endregion: --- Tests
