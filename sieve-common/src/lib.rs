#![cfg_attr(not(any(test, feature = "user")), no_std)]

// region:    --- Modules
mod approver;
mod constants;
mod discarder;
mod event;
mod filter;
mod kernel;
mod pipe;
mod stats;
mod syscall;
// endregion: --- Modules

pub use approver::*;
pub use constants::*;
pub use discarder::*;
pub use event::*;
pub use filter::*;
pub use kernel::*;
pub use pipe::*;
pub use stats::*;
pub use syscall::*;

/// Marks the wire and map types as plain old data for the userspace `aya` maps.
#[cfg(feature = "user")]
mod pod {
	use crate::*;

	macro_rules! impl_pod {
		($($ty:ty),* $(,)?) => {
			$(unsafe impl aya::Pod for $ty {})*
		};
	}

	impl_pod!(
		Policy,
		Basename,
		EventMaskFilter,
		U32FlagsFilter,
		U64FlagsFilter,
		U32RangeFilter,
		FlagsKey,
		PathKey,
		InodeDiscarderKey,
		DiscarderParams,
		InodeDiscarderParams,
		ApproverStats,
		DiscarderStats,
	);
}
