//! Inode discarders: a negative cache of objects judged uninteresting.
//!
//! Entries are never locked. Every stored field is checked on lookup against
//! the current global and per-mount revisions and against the expiry time, and
//! any mismatch reads as "not discarded". A torn entry observed while another
//! CPU refreshes it therefore degrades to forwarding the event.

use zerocopy_derive::{FromBytes, Immutable, KnownLayout};

use crate::{DiscarderStatsSink, EventType, Verdict, DISCARDER_SLOTS};

/// Number of per-mount revision counters; mount ids share slots modulo this.
pub const MOUNT_REVISION_SLOTS: u32 = 4096;

pub const fn mount_revision_slot(mount_id: u32) -> u32 {
	mount_id & (MOUNT_REVISION_SLOTS - 1)
}

// region:    --- Keys & params

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, FromBytes, Immutable, KnownLayout)]
pub struct PathKey {
	pub inode: u64,
	pub mount_id: u32,
	pub _pad: u32,
}

impl PathKey {
	pub const fn new(inode: u64, mount_id: u32) -> Self {
		Self {
			inode,
			mount_id,
			_pad: 0,
		}
	}
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, FromBytes, Immutable, KnownLayout)]
pub struct InodeDiscarderKey {
	pub path_key: PathKey,
	/// Non-zero for a file discarder, zero for a directory one.
	pub is_leaf: u32,
	pub _pad: u32,
}

impl InodeDiscarderKey {
	pub const fn new(path_key: PathKey, is_leaf: bool) -> Self {
		Self {
			path_key,
			is_leaf: is_leaf as u32,
			_pad: 0,
		}
	}
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct DiscarderParams {
	pub event_mask: u64,
	/// Last discard time per discardable event kind.
	pub timestamps: [u64; DISCARDER_SLOTS],
	pub expire_at: u64,
	pub is_retained: u32,
	pub revision: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct InodeDiscarderParams {
	pub params: DiscarderParams,
	pub mount_revision: u32,
	pub _pad: u32,
}

/// One lookup; `event_type` is the raw wire value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscarderLookup {
	pub event_type: u64,
	pub discarder: InodeDiscarderKey,
	pub now: u64,
}

// endregion: --- Keys & params

// region:    --- Store seams

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertMode {
	/// Create or replace.
	Any,
	/// Create only; fails if the key exists.
	NoExist,
}

/// Fixed-capacity storage of inode discarders. `get` copies the entry out.
pub trait InodeDiscarderStore {
	fn get(&self, key: &InodeDiscarderKey) -> Option<InodeDiscarderParams>;

	fn insert(&self, key: &InodeDiscarderKey, params: &InodeDiscarderParams, mode: InsertMode) -> Result<(), i64>;

	fn remove(&self, key: &InodeDiscarderKey) -> bool;
}

/// Current revision counters. Both only ever increase.
pub trait RevisionSource {
	fn discarders_revision(&self) -> u32;

	fn mount_revision(&self, mount_id: u32) -> u32;
}

// endregion: --- Store seams

// region:    --- State machine

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
	Retained,
	Stale,
	Expired,
}

impl EntryState {
	pub fn classify<V: RevisionSource>(entry: &InodeDiscarderParams, key: &InodeDiscarderKey, now: u64, revisions: &V) -> Self {
		if entry.params.revision != revisions.discarders_revision() {
			return EntryState::Stale;
		}
		if entry.mount_revision != revisions.mount_revision(key.path_key.mount_id) {
			return EntryState::Stale;
		}
		if now >= entry.params.expire_at {
			return EntryState::Expired;
		}
		EntryState::Retained
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardOutcome {
	/// absent -> retained
	Created,
	/// stale or expired -> retained, overwritten in place
	Refreshed,
	/// retained, event bit merged into the first writer's entry
	Merged,
	/// a concurrent writer owns the entry, or the store refused the write
	Lost,
	/// the event kind has no discarder slot
	Unsupported,
}

pub struct DiscarderEngine;

impl DiscarderEngine {
	/// True only for a retained entry covering the event. Everything else,
	/// including an unknown event type, is "not discarded".
	pub fn is_discarded_by_inode<D, V, S>(store: &D, revisions: &V, stats: &S, lookup: &DiscarderLookup) -> bool
	where
		D: InodeDiscarderStore,
		V: RevisionSource,
		S: DiscarderStatsSink,
	{
		let Some(event) = EventType::from_u64(lookup.event_type) else {
			return false;
		};
		if event.discarder_slot().is_none() {
			return false;
		}
		let Some(entry) = store.get(&lookup.discarder) else {
			return false;
		};

		if EntryState::classify(&entry, &lookup.discarder, lookup.now, revisions) != EntryState::Retained {
			return false;
		}
		if entry.params.event_mask & event.mask() == 0 {
			return false;
		}

		stats.event_discarded(event);
		true
	}

	/// Records that `key` produces nothing interesting for `event`.
	pub fn discard_inode<D, V, S>(
		store: &D,
		revisions: &V,
		stats: &S,
		event: EventType,
		key: &InodeDiscarderKey,
		now: u64,
		ttl: u64,
	) -> DiscardOutcome
	where
		D: InodeDiscarderStore,
		V: RevisionSource,
		S: DiscarderStatsSink,
	{
		let Some(slot) = event.discarder_slot() else {
			return DiscardOutcome::Unsupported;
		};

		let Some(mut entry) = store.get(key) else {
			let fresh = Self::fresh_entry(revisions, event, slot, key, now, ttl);
			return match store.insert(key, &fresh, InsertMode::NoExist) {
				Ok(()) => {
					stats.discarder_added(event);
					DiscardOutcome::Created
				}
				Err(_) => DiscardOutcome::Lost,
			};
		};

		let state = EntryState::classify(&entry, key, now, revisions);
		if state == EntryState::Retained && entry.params.is_retained != 0 {
			let newly_covered = entry.params.event_mask & event.mask() == 0;
			entry.params.event_mask |= event.mask();
			entry.params.timestamps[slot] = now;
			if store.insert(key, &entry, InsertMode::Any).is_err() {
				return DiscardOutcome::Lost;
			}
			if newly_covered {
				stats.discarder_added(event);
			}
			return DiscardOutcome::Merged;
		}

		let fresh = Self::fresh_entry(revisions, event, slot, key, now, ttl);
		if store.insert(key, &fresh, InsertMode::Any).is_err() {
			return DiscardOutcome::Lost;
		}
		stats.discarder_added(event);
		DiscardOutcome::Refreshed
	}

	/// Applies the approvers' verdict on `event` to the object it resolved to,
	/// and tells whether the event is forwarded. An approval evicts whatever
	/// discarder the object has: a discarder never hides an approved event. A
	/// rejection that only depends on the object seeds or keeps one.
	#[allow(clippy::too_many_arguments)]
	pub fn settle<D, V, S>(
		store: &D,
		revisions: &V,
		stats: &S,
		event: EventType,
		verdict: &Verdict,
		key: &InodeDiscarderKey,
		now: u64,
		ttl: u64,
	) -> bool
	where
		D: InodeDiscarderStore,
		V: RevisionSource,
		S: DiscarderStatsSink,
	{
		if verdict.approval.is_approved() {
			Self::evict(store, key);
			return true;
		}
		if !verdict.object_scoped {
			return false;
		}

		let lookup = DiscarderLookup {
			event_type: event as u64,
			discarder: *key,
			now,
		};
		if !Self::is_discarded_by_inode(store, revisions, stats, &lookup) {
			Self::discard_inode(store, revisions, stats, event, key, now, ttl);
		}
		false
	}

	/// Removes the entry, whatever its state.
	pub fn evict<D: InodeDiscarderStore>(store: &D, key: &InodeDiscarderKey) -> bool {
		store.remove(key)
	}

	fn fresh_entry<V: RevisionSource>(
		revisions: &V,
		event: EventType,
		slot: usize,
		key: &InodeDiscarderKey,
		now: u64,
		ttl: u64,
	) -> InodeDiscarderParams {
		let mut timestamps = [0; DISCARDER_SLOTS];
		timestamps[slot] = now;
		InodeDiscarderParams {
			params: DiscarderParams {
				event_mask: event.mask(),
				timestamps,
				expire_at: now.saturating_add(ttl),
				is_retained: 1,
				revision: revisions.discarders_revision(),
			},
			mount_revision: revisions.mount_revision(key.path_key.mount_id),
			_pad: 0,
		}
	}
}

// endregion: --- State machine

// region:    --- Tests


// endregion: --- Tests
