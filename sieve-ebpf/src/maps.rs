use aya_ebpf::{
	bindings::{BPF_ANY, BPF_NOEXIST},
	macros::map,
	maps::{Array, HashMap, LruHashMap, PerCpuArray, RingBuf},
};
use sieve_common::{
	mount_revision_slot, Approval, ApproverStats, ApproverStatsSink, Basename, DiscarderStats, DiscarderStatsSink,
	EventMaskFilter, EventType, FilterCatalog, FlagField, FlagsKey, InodeDiscarderKey, InodeDiscarderParams,
	InodeDiscarderStore, InsertMode, Policy, RevisionSource, SyscallCache, U32FlagsFilter, U32RangeFilter, U64FlagsFilter,
	AUID_APPROVERS_CAPACITY, BASENAME_APPROVERS_CAPACITY, EVENT_MAX, MAX_PATH_SCAN, MOUNT_REVISION_SLOTS,
};

pub const PATH_SCRATCH_LEN: usize = MAX_PATH_SCAN;

#[map]
pub static EVT_MAP: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

// region:    --- Filter catalog

#[map]
static ENABLED_EVENTS: Array<EventMaskFilter> = Array::with_max_entries(1, 0);

#[map]
static FILTER_POLICY: Array<Policy> = Array::with_max_entries(EVENT_MAX as u32, 0);

#[map]
static BASENAME_APPROVERS: HashMap<Basename, EventMaskFilter> =
	HashMap::with_max_entries(BASENAME_APPROVERS_CAPACITY, 0);

#[map]
static U32_FLAGS_APPROVERS: HashMap<FlagsKey, U32FlagsFilter> = HashMap::with_max_entries(64, 0);

#[map]
static U64_FLAGS_APPROVERS: HashMap<FlagsKey, U64FlagsFilter> = HashMap::with_max_entries(64, 0);

#[map]
static AUID_APPROVERS: HashMap<u32, EventMaskFilter> = HashMap::with_max_entries(AUID_APPROVERS_CAPACITY, 0);

#[map]
static AUID_RANGE_APPROVERS: HashMap<u32, U32RangeFilter> = HashMap::with_max_entries(EVENT_MAX as u32, 0);

pub struct MapCatalog;

impl FilterCatalog for MapCatalog {
	fn enabled_events(&self) -> EventMaskFilter {
		ENABLED_EVENTS.get_ptr(0).map(|f| unsafe { *f }).unwrap_or_default()
	}

	fn policy(&self, event: EventType) -> Option<Policy> {
		FILTER_POLICY.get_ptr(event.index()).map(|p| unsafe { *p })
	}

	fn basename_approver(&self, basename: &Basename) -> Option<EventMaskFilter> {
		unsafe { BASENAME_APPROVERS.get(basename) }.copied()
	}

	fn u32_flags_approver(&self, event: EventType, field: FlagField) -> Option<U32FlagsFilter> {
		unsafe { U32_FLAGS_APPROVERS.get(&FlagsKey::new(event, field)) }.copied()
	}

	fn u64_flags_approver(&self, event: EventType, field: FlagField) -> Option<U64FlagsFilter> {
		unsafe { U64_FLAGS_APPROVERS.get(&FlagsKey::new(event, field)) }.copied()
	}

	fn auid_approver(&self, auid: u32) -> Option<EventMaskFilter> {
		unsafe { AUID_APPROVERS.get(&auid) }.copied()
	}

	fn auid_range_approver(&self, event: EventType) -> Option<U32RangeFilter> {
		unsafe { AUID_RANGE_APPROVERS.get(&event.index()) }.copied()
	}
}

// endregion: --- Filter catalog

// region:    --- Discarders

#[map]
static INODE_DISCARDERS: LruHashMap<InodeDiscarderKey, InodeDiscarderParams> = LruHashMap::with_max_entries(4096, 0);

#[map]
static DISCARDERS_REVISION: Array<u32> = Array::with_max_entries(1, 0);

#[map]
static INODE_DISC_REVISIONS: Array<u32> = Array::with_max_entries(MOUNT_REVISION_SLOTS, 0);

pub struct MapDiscarders;

impl InodeDiscarderStore for MapDiscarders {
	fn get(&self, key: &InodeDiscarderKey) -> Option<InodeDiscarderParams> {
		unsafe { INODE_DISCARDERS.get(key) }.copied()
	}

	fn insert(&self, key: &InodeDiscarderKey, params: &InodeDiscarderParams, mode: InsertMode) -> Result<(), i64> {
		let flags = match mode {
			InsertMode::Any => BPF_ANY,
			InsertMode::NoExist => BPF_NOEXIST,
		};
		INODE_DISCARDERS.insert(key, params, flags as u64).map_err(|e| e as i64)
	}

	fn remove(&self, key: &InodeDiscarderKey) -> bool {
		INODE_DISCARDERS.remove(key).is_ok()
	}
}

pub struct MapRevisions;

impl RevisionSource for MapRevisions {
	fn discarders_revision(&self) -> u32 {
		DISCARDERS_REVISION.get_ptr(0).map(|r| unsafe { *r }).unwrap_or(0)
	}

	fn mount_revision(&self, mount_id: u32) -> u32 {
		INODE_DISC_REVISIONS
			.get_ptr(mount_revision_slot(mount_id))
			.map(|r| unsafe { *r })
			.unwrap_or(0)
	}
}

// endregion: --- Discarders

// region:    --- Stats

#[map]
static APPROVER_STATS: PerCpuArray<ApproverStats> = PerCpuArray::with_max_entries(EVENT_MAX as u32, 0);

#[map]
static DISCARDER_STATS: PerCpuArray<DiscarderStats> = PerCpuArray::with_max_entries(EVENT_MAX as u32, 0);

/// Per-CPU slots need no atomics: a program is not preempted on its CPU.
pub struct PerCpuStats;

impl ApproverStatsSink for PerCpuStats {
	fn record(&self, event: EventType, approval: Approval) {
		if let Some(stats) = APPROVER_STATS.get_ptr_mut(event.index()) {
			unsafe { *(*stats).counter_mut(approval) += 1 };
		}
	}
}

impl DiscarderStatsSink for PerCpuStats {
	fn discarder_added(&self, event: EventType) {
		if let Some(stats) = DISCARDER_STATS.get_ptr_mut(event.index()) {
			unsafe { (*stats).discarders_added += 1 };
		}
	}

	fn event_discarded(&self, event: EventType) {
		if let Some(stats) = DISCARDER_STATS.get_ptr_mut(event.index()) {
			unsafe { (*stats).event_discarded += 1 };
		}
	}
}

// endregion: --- Stats

// region:    --- Syscall cache

#[map]
pub static SYSCALLS: LruHashMap<u64, SyscallCache> = LruHashMap::with_max_entries(1024, 0);

#[map]
pub static PATH_SCRATCH: PerCpuArray<[u8; PATH_SCRATCH_LEN]> = PerCpuArray::with_max_entries(1, 0);

// endregion: --- Syscall cache
