use zerocopy_derive::{FromBytes, Immutable, KnownLayout};

use crate::{Approval, EventType};

/// Approver counters of one event type. Kept per CPU in the kernel and summed
/// with `accumulate` on read.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct ApproverStats {
	pub rejected: u64,
	pub approved_by_policy: u64,
	pub approved_by_basename: u64,
	pub approved_by_flag: u64,
	pub approved_by_auid: u64,
}

impl ApproverStats {
	pub fn counter_mut(&mut self, approval: Approval) -> &mut u64 {
		match approval {
			Approval::Rejected => &mut self.rejected,
			Approval::ByPolicy => &mut self.approved_by_policy,
			Approval::ByBasename => &mut self.approved_by_basename,
			Approval::ByFlag => &mut self.approved_by_flag,
			Approval::ByAuid => &mut self.approved_by_auid,
		}
	}

	pub fn accumulate(&mut self, other: &ApproverStats) {
		self.rejected += other.rejected;
		self.approved_by_policy += other.approved_by_policy;
		self.approved_by_basename += other.approved_by_basename;
		self.approved_by_flag += other.approved_by_flag;
		self.approved_by_auid += other.approved_by_auid;
	}

	pub fn total(&self) -> u64 {
		self.rejected + self.approved_by_policy + self.approved_by_basename + self.approved_by_flag + self.approved_by_auid
	}
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct DiscarderStats {
	pub discarders_added: u64,
	pub event_discarded: u64,
}

impl DiscarderStats {
	pub fn accumulate(&mut self, other: &DiscarderStats) {
		self.discarders_added += other.discarders_added;
		self.event_discarded += other.event_discarded;
	}
}

pub trait DiscarderStatsSink {
	fn discarder_added(&self, event: EventType);

	fn event_discarded(&self, event: EventType);
}

// region:    --- Host counters

#[cfg(any(test, feature = "user"))]
pub use host::*;

#[cfg(any(test, feature = "user"))]
mod host {
	use std::sync::atomic::{AtomicU64, Ordering};

	use crate::*;

	#[derive(Debug, Default)]
	struct ApproverCounters([AtomicU64; 5]);

	/// Approver counters for every event type, shared by reference.
	#[derive(Debug, Default)]
	pub struct AtomicApproverStats {
		events: [ApproverCounters; EVENT_MAX],
	}

	impl AtomicApproverStats {
		pub fn snapshot(&self, event: EventType) -> ApproverStats {
			let [rejected, policy, basename, flag, auid] = &self.events[event.index() as usize].0;
			ApproverStats {
				rejected: rejected.load(Ordering::Relaxed),
				approved_by_policy: policy.load(Ordering::Relaxed),
				approved_by_basename: basename.load(Ordering::Relaxed),
				approved_by_flag: flag.load(Ordering::Relaxed),
				approved_by_auid: auid.load(Ordering::Relaxed),
			}
		}
	}

	impl ApproverStatsSink for AtomicApproverStats {
		fn record(&self, event: EventType, approval: Approval) {
			self.events[event.index() as usize].0[approval as usize].fetch_add(1, Ordering::Relaxed);
		}
	}

	#[derive(Debug, Default)]
	pub struct AtomicDiscarderStats {
		added: [AtomicU64; EVENT_MAX],
		discarded: [AtomicU64; EVENT_MAX],
	}

	impl AtomicDiscarderStats {
		pub fn snapshot(&self, event: EventType) -> DiscarderStats {
			let idx = event.index() as usize;
			DiscarderStats {
				discarders_added: self.added[idx].load(Ordering::Relaxed),
				event_discarded: self.discarded[idx].load(Ordering::Relaxed),
			}
		}
	}

	impl DiscarderStatsSink for AtomicDiscarderStats {
		fn discarder_added(&self, event: EventType) {
			self.added[event.index() as usize].fetch_add(1, Ordering::Relaxed);
		}

		fn event_discarded(&self, event: EventType) {
			self.discarded[event.index() as usize].fetch_add(1, Ordering::Relaxed);
		}
	}
}

// endregion: --- Host counters

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;
	use crate::ApproverStatsSink;

	#[test]
	fn accumulate_sums_per_cpu_values() -> Result<()> {
		// -- Setup & Fixtures
		let fx_cpus = [
			ApproverStats {
				rejected: 3,
				approved_by_basename: 1,
				..Default::default()
			},
			ApproverStats {
				rejected: 2,
				approved_by_auid: 4,
				..Default::default()
			},
		];

		// -- Exec
		let mut merged = ApproverStats::default();
		fx_cpus.iter().for_each(|cpu| merged.accumulate(cpu));

		// -- Check
		assert_eq!(merged.rejected, 5);
		assert_eq!(merged.approved_by_basename, 1);
		assert_eq!(merged.approved_by_auid, 4);
		assert_eq!(merged.total(), 10);

		Ok(())
	}

	#[test]
	fn atomic_stats_record_one_counter_per_call() -> Result<()> {
		// -- Setup & Fixtures
		let stats = AtomicApproverStats::default();

		// -- Exec
		stats.record(EventType::Splice, Approval::ByFlag);
		stats.record(EventType::Splice, Approval::Rejected);

		// -- Check
		let snap = stats.snapshot(EventType::Splice);
		assert_eq!((snap.approved_by_flag, snap.rejected, snap.total()), (1, 1, 2));
		assert_eq!(stats.snapshot(EventType::Open).total(), 0);

		Ok(())
	}
}

// endregion: --- Tests
