use aya::{
	maps::{Array, HashMap, Map, MapData, MapError, PerCpuArray, RingBuf},
	sys::SyscallError,
	Ebpf,
};
use sieve_common::{
	ApproverStats, Basename, CatalogKey, DiscarderStats, EventMaskFilter, EventType, Filter, FlagField, FlagsKey, Policy,
	U32FlagsFilter, U32RangeFilter, U64FlagsFilter,
};

use crate::{
	discarders::{DiscarderTable, RevisionMaps, SharedRevisions},
	policy::CatalogWriter,
	Error, Result,
};

/// Every map the control plane drives, taken out of the loaded object.
pub struct SieveMaps {
	pub events: RingBuf<MapData>,
	pub catalog: CatalogMaps,
	pub discarders: DiscarderTable,
	pub revisions: SharedRevisions,
	pub approver_stats: PerCpuArray<MapData, ApproverStats>,
	pub discarder_stats: PerCpuArray<MapData, DiscarderStats>,
}

impl SieveMaps {
	pub fn take(ebpf: &mut Ebpf) -> Result<Self> {
		let revisions = RevisionMaps::new(
			Array::try_from(take(ebpf, "DISCARDERS_REVISION")?)?,
			Array::try_from(take(ebpf, "INODE_DISC_REVISIONS")?)?,
		)
		.into_shared();

		let catalog = CatalogMaps {
			enabled_events: Array::try_from(take(ebpf, "ENABLED_EVENTS")?)?,
			policies: Array::try_from(take(ebpf, "FILTER_POLICY")?)?,
			basenames: HashMap::try_from(take(ebpf, "BASENAME_APPROVERS")?)?,
			u32_flags: HashMap::try_from(take(ebpf, "U32_FLAGS_APPROVERS")?)?,
			u64_flags: HashMap::try_from(take(ebpf, "U64_FLAGS_APPROVERS")?)?,
			auids: HashMap::try_from(take(ebpf, "AUID_APPROVERS")?)?,
			auid_ranges: HashMap::try_from(take(ebpf, "AUID_RANGE_APPROVERS")?)?,
			revisions: revisions.clone(),
		};

		Ok(Self {
			events: RingBuf::try_from(take(ebpf, "EVT_MAP")?)?,
			catalog,
			discarders: DiscarderTable::new(HashMap::try_from(take(ebpf, "INODE_DISCARDERS")?)?),
			revisions,
			approver_stats: PerCpuArray::try_from(take(ebpf, "APPROVER_STATS")?)?,
			discarder_stats: PerCpuArray::try_from(take(ebpf, "DISCARDER_STATS")?)?,
		})
	}
}

fn take(ebpf: &mut Ebpf, name: &'static str) -> Result<Map> {
	ebpf.take_map(name).ok_or(Error::EbpfMapNotFound(name))
}

// region:    --- Catalog

pub struct CatalogMaps {
	enabled_events: Array<MapData, EventMaskFilter>,
	policies: Array<MapData, Policy>,
	basenames: HashMap<MapData, Basename, EventMaskFilter>,
	u32_flags: HashMap<MapData, FlagsKey, U32FlagsFilter>,
	u64_flags: HashMap<MapData, FlagsKey, U64FlagsFilter>,
	auids: HashMap<MapData, u32, EventMaskFilter>,
	auid_ranges: HashMap<MapData, u32, U32RangeFilter>,
	revisions: SharedRevisions,
}

impl CatalogMaps {
	pub fn set_enabled_events(&mut self, event_mask: u64) -> Result<()> {
		self.enabled_events.set(0, EventMaskFilter { event_mask }, 0)?;
		Ok(())
	}
}

impl CatalogWriter for CatalogMaps {
	fn put(&mut self, key: &CatalogKey, filter: &Filter) -> Result<()> {
		match (key, filter) {
			(CatalogKey::Policy(event), Filter::Policy(policy)) => self.policies.set(event.index(), policy, 0)?,
			(CatalogKey::Basename(basename), Filter::EventMask(mask)) => self.basenames.insert(basename, mask, 0)?,
			(CatalogKey::Flags(event, field), Filter::U32Flags(flags)) if !field.is_wide() => {
				self.u32_flags.insert(FlagsKey::new(*event, *field), flags, 0)?
			}
			(CatalogKey::Flags(event, field), Filter::U64Flags(flags)) if field.is_wide() => {
				self.u64_flags.insert(FlagsKey::new(*event, *field), flags, 0)?
			}
			(CatalogKey::Auid(auid), Filter::EventMask(mask)) => self.auids.insert(auid, mask, 0)?,
			(CatalogKey::AuidRange(event), Filter::Range(range)) => self.auid_ranges.insert(event.index(), range, 0)?,
			_ => return Err(Error::CatalogMismatch),
		}
		Ok(())
	}

	fn remove(&mut self, key: &CatalogKey) -> Result<()> {
		match key {
			// array slots cannot be deleted; the default is "no filter"
			CatalogKey::Policy(event) => self.policies.set(event.index(), Policy::default(), 0)?,
			CatalogKey::Basename(basename) => ignore_missing(self.basenames.remove(basename))?,
			CatalogKey::Flags(event, field) => remove_flags(self, *event, *field)?,
			CatalogKey::Auid(auid) => ignore_missing(self.auids.remove(auid))?,
			CatalogKey::AuidRange(event) => ignore_missing(self.auid_ranges.remove(&event.index()))?,
		}
		Ok(())
	}

	fn bump_discarders_revision(&mut self) -> Result<u32> {
		self.revisions.lock()?.bump_discarders()
	}
}

fn remove_flags(maps: &mut CatalogMaps, event: EventType, field: FlagField) -> Result<()> {
	let key = FlagsKey::new(event, field);
	if field.is_wide() {
		ignore_missing(maps.u64_flags.remove(&key))
	} else {
		ignore_missing(maps.u32_flags.remove(&key))
	}
}

/// A rollback may remove keys that were never written.
fn ignore_missing(res: core::result::Result<(), MapError>) -> Result<()> {
	match res {
		Err(MapError::SyscallError(SyscallError { io_error, .. })) if io_error.raw_os_error() == Some(libc::ENOENT) => Ok(()),
		res => Ok(res?),
	}
}

// endregion: --- Catalog
