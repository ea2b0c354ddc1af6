//! Approvers: the coarse, policy driven first pass over every event.
//!
//! The engine only reads the catalog. Its verdict also tells whether a
//! rejection may seed a discarder, which is the case only when nothing but
//! the object itself decided it.

use crate::{Basename, EventType, FilterCatalog, FlagValue, PolicyMode};

pub const MAX_FLAG_VALUES: usize = 2;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Approval {
	Rejected = 0,
	ByPolicy = 1,
	ByBasename = 2,
	ByFlag = 3,
	ByAuid = 4,
}

impl Approval {
	pub const fn from_u8(value: u8) -> Self {
		match value {
			1 => Approval::ByPolicy,
			2 => Approval::ByBasename,
			3 => Approval::ByFlag,
			4 => Approval::ByAuid,
			_ => Approval::Rejected,
		}
	}

	pub const fn is_approved(self) -> bool {
		!matches!(self, Approval::Rejected)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
	pub approval: Approval,
	/// The rejection only depends on the object itself, so it may seed a discarder.
	pub object_scoped: bool,
}

impl Verdict {
	const fn approved(approval: Approval) -> Self {
		Self {
			approval,
			object_scoped: false,
		}
	}
}

/// What the hook collected about one event.
#[derive(Clone, Copy, Debug)]
pub struct ApproverInput<'a> {
	pub event_type: EventType,
	pub basename: Option<&'a Basename>,
	pub flags: [Option<FlagValue>; MAX_FLAG_VALUES],
	pub auid: Option<u32>,
	/// Set when the hook could not read everything it should have, e.g. a path
	/// cut short. The verdict stands, but it says nothing about the object.
	pub incomplete: bool,
}

impl<'a> ApproverInput<'a> {
	pub fn new(event_type: EventType) -> Self {
		Self {
			event_type,
			basename: None,
			flags: [None; MAX_FLAG_VALUES],
			auid: None,
			incomplete: false,
		}
	}

	pub fn with_basename(mut self, basename: &'a Basename) -> Self {
		self.basename = Some(basename);
		self
	}

	/// Adds a flag value; values past `MAX_FLAG_VALUES` are ignored.
	pub fn with_flag(mut self, flag: FlagValue) -> Self {
		if let Some(slot) = self.flags.iter_mut().find(|slot| slot.is_none()) {
			*slot = Some(flag);
		}
		self
	}

	pub fn with_auid(mut self, auid: u32) -> Self {
		self.auid = Some(auid);
		self
	}

	pub fn mark_incomplete(mut self) -> Self {
		self.incomplete = true;
		self
	}
}

pub trait ApproverStatsSink {
	fn record(&self, event: EventType, approval: Approval);
}

pub struct ApproverEngine;

impl ApproverEngine {
	/// Classifies one event. Exactly one counter of `stats` moves per call.
	pub fn approve<F, S>(catalog: &F, stats: &S, input: &ApproverInput<'_>) -> Verdict
	where
		F: FilterCatalog,
		S: ApproverStatsSink,
	{
		let verdict = Self::evaluate(catalog, input);
		stats.record(input.event_type, verdict.approval);
		verdict
	}

	fn evaluate<F: FilterCatalog>(catalog: &F, input: &ApproverInput<'_>) -> Verdict {
		let event = input.event_type;

		if !catalog.enabled_events().matches(event) {
			return Verdict {
				approval: Approval::Rejected,
				object_scoped: false,
			};
		}

		let policy = catalog.policy(event).unwrap_or_default();
		match policy.mode() {
			PolicyMode::NoFilter | PolicyMode::Accept => return Verdict::approved(Approval::ByPolicy),
			PolicyMode::Deny => {}
		}

		if let Some(basename) = input.basename.filter(|b| !b.is_empty()) {
			if catalog.basename_approver(basename).is_some_and(|f| f.matches(event)) {
				return Verdict::approved(Approval::ByBasename);
			}
		}

		for flag in input.flags.iter().flatten() {
			let matched = if flag.field.is_wide() {
				catalog
					.u64_flags_approver(event, flag.field)
					.is_some_and(|f| f.matches(flag.value))
			} else {
				catalog
					.u32_flags_approver(event, flag.field)
					.is_some_and(|f| f.matches(flag.value as u32))
			};
			if matched {
				return Verdict::approved(Approval::ByFlag);
			}
		}

		if let Some(auid) = input.auid {
			if catalog.auid_range_approver(event).is_some_and(|r| r.contains(auid)) {
				return Verdict::approved(Approval::ByAuid);
			}
			if catalog.auid_approver(auid).is_some_and(|f| f.matches(event)) {
				return Verdict::approved(Approval::ByAuid);
			}
		}

		Verdict {
			approval: Approval::Rejected,
			object_scoped: policy.contextual == 0 && !input.incomplete,
		}
	}
}

// region:    --- Test catalog


// endregion: --- Test catalog

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::{test_catalog::MemCatalog, *};
	use crate::*;

	fn fx_deny_catalog(event: EventType) -> MemCatalog {
		let mut catalog = MemCatalog {
			enabled: event_mask_of(&EventType::ALL),
			..Default::default()
		};
		catalog.policies.insert(event, Policy::new(PolicyMode::Deny, false));
		catalog
	}

	#[test]
	fn approve_basename_end_to_end() -> Result<()> {
		// -- Setup & Fixtures
		let mut catalog = fx_deny_catalog(EventType::Open);
		let fx_passwd = Basename::new(b"passwd").ok_or("basename")?;
		catalog.basenames.insert(
			fx_passwd,
			EventMaskFilter {
				event_mask: EventType::Open.mask(),
			},
		);
		let stats = AtomicApproverStats::default();
		let fx_path = Basename::from_path(b"/etc/passwd\0");

		// -- Exec
		let verdict = ApproverEngine::approve(&catalog, &stats, &ApproverInput::new(EventType::Open).with_basename(&fx_path));

		// -- Check
		assert_eq!(verdict.approval, Approval::ByBasename);
		let snap = stats.snapshot(EventType::Open);
		assert_eq!(snap.approved_by_basename, 1);
		assert_eq!(snap.total(), 1);

		Ok(())
	}

	#[test]
	fn approve_auid_range_is_inclusive() -> Result<()> {
		// -- Setup & Fixtures
		let mut catalog = fx_deny_catalog(EventType::Open);
		catalog
			.auid_ranges
			.insert(EventType::Open, U32RangeFilter { min: 10, max: 20 });
		let stats = AtomicApproverStats::default();

		// -- Exec
		let approvals: Vec<_> = [9, 10, 20, 21]
			.into_iter()
			.map(|auid| ApproverEngine::approve(&catalog, &stats, &ApproverInput::new(EventType::Open).with_auid(auid)).approval)
			.collect();

		// -- Check
		assert_eq!(
			approvals,
			vec![Approval::Rejected, Approval::ByAuid, Approval::ByAuid, Approval::Rejected]
		);
		let snap = stats.snapshot(EventType::Open);
		assert_eq!((snap.rejected, snap.approved_by_auid, snap.total()), (2, 2, 4));

		Ok(())
	}

	#[test]
	fn approve_unset_flags_never_match() -> Result<()> {
		// -- Setup & Fixtures
		let mut catalog = fx_deny_catalog(EventType::Open);
		catalog.u32_flags.insert(
			(EventType::Open, FlagField::OpenFlags),
			U32FlagsFilter {
				flags: u32::MAX,
				is_set: 0,
				_pad: [0; 3],
			},
		);
		let stats = AtomicApproverStats::default();
		let fx_input = ApproverInput::new(EventType::Open).with_flag(FlagValue::new(FlagField::OpenFlags, 0o1101));

		// -- Exec
		let verdict = ApproverEngine::approve(&catalog, &stats, &fx_input);

		// -- Check
		assert_eq!(verdict.approval, Approval::Rejected);
		assert!(verdict.object_scoped);

		// same filter once set
		catalog
			.u32_flags
			.insert((EventType::Open, FlagField::OpenFlags), U32FlagsFilter::new(0o1000));
		let verdict = ApproverEngine::approve(&catalog, &stats, &fx_input);
		assert_eq!(verdict.approval, Approval::ByFlag);

		Ok(())
	}

	#[test]
	fn approve_empty_basename_is_inert() -> Result<()> {
		// -- Setup & Fixtures
		let mut catalog = fx_deny_catalog(EventType::Open);
		catalog.basenames.insert(
			Basename::default(),
			EventMaskFilter {
				event_mask: u64::MAX,
			},
		);
		let stats = AtomicApproverStats::default();
		let fx_empty = Basename::from_path(b"/tmp/\0");

		// -- Exec
		let verdict = ApproverEngine::approve(&catalog, &stats, &ApproverInput::new(EventType::Open).with_basename(&fx_empty));

		// -- Check
		assert_eq!(verdict.approval, Approval::Rejected);

		Ok(())
	}

	#[test]
	fn approve_policy_modes_and_enabled_mask() -> Result<()> {
		// -- Setup & Fixtures
		let mut catalog = MemCatalog {
			enabled: EventType::Open.mask(),
			..Default::default()
		};
		catalog
			.policies
			.insert(EventType::Open, Policy::new(PolicyMode::Accept, false));
		let stats = AtomicApproverStats::default();

		// -- Exec
		let open = ApproverEngine::approve(&catalog, &stats, &ApproverInput::new(EventType::Open));
		let splice = ApproverEngine::approve(&catalog, &stats, &ApproverInput::new(EventType::Splice));
		catalog.enabled |= EventType::Splice.mask();
		let splice_no_policy = ApproverEngine::approve(&catalog, &stats, &ApproverInput::new(EventType::Splice));

		// -- Check
		assert_eq!(open.approval, Approval::ByPolicy);
		assert_eq!(splice.approval, Approval::Rejected);
		assert!(!splice.object_scoped);
		assert_eq!(splice_no_policy.approval, Approval::ByPolicy);
		assert_eq!(stats.snapshot(EventType::Splice).total(), 2);

		Ok(())
	}

	#[test]
	fn approve_incomplete_input_is_not_object_scoped() -> Result<()> {
		// -- Setup & Fixtures
		let catalog = fx_deny_catalog(EventType::Open);
		let stats = AtomicApproverStats::default();
		let fx_input = ApproverInput::new(EventType::Open).mark_incomplete();

		// -- Exec
		let verdict = ApproverEngine::approve(&catalog, &stats, &fx_input);

		// -- Check
		assert_eq!(verdict.approval, Approval::Rejected);
		assert!(!verdict.object_scoped);
		assert_eq!(stats.snapshot(EventType::Open).rejected, 1);

		Ok(())
	}

	#[test]
	fn approve_contextual_policy_rejection_is_not_object_scoped() -> Result<()> {
		// -- Setup & Fixtures
		let mut catalog = fx_deny_catalog(EventType::Open);
		catalog
			.policies
			.insert(EventType::Open, Policy::new(PolicyMode::Deny, true));
		catalog.auids.insert(
			1000,
			EventMaskFilter {
				event_mask: EventType::Open.mask(),
			},
		);
		let stats = AtomicApproverStats::default();

		// -- Exec
		let rejected = ApproverEngine::approve(&catalog, &stats, &ApproverInput::new(EventType::Open).with_auid(0));
		let approved = ApproverEngine::approve(&catalog, &stats, &ApproverInput::new(EventType::Open).with_auid(1000));

		// -- Check
		assert_eq!(rejected.approval, Approval::Rejected);
		assert!(!rejected.object_scoped);
		assert_eq!(approved.approval, Approval::ByAuid);

		Ok(())
	}
}

// endregion: --- Tests
