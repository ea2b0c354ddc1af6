//! Raw `syscalls:sys_enter_*` / `sys_exit_*` tracepoint records.
//!
//! Field order and widths are those of the raw records. The syscall number is
//! a signed 64-bit field on enter and a signed 32-bit one on exit.

use zerocopy_derive::{FromBytes, Immutable, KnownLayout};

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout)]
pub struct TracepointHeader {
	pub common_type: u16,
	pub common_flags: u8,
	pub common_preempt_count: u8,
	pub common_pid: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout)]
pub struct EnterSysOpenCtx {
	pub header: TracepointHeader,
	pub syscall_nr: i64,
	pub filename: u64,
	pub flags: i32,
	pub mode: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout)]
pub struct EnterSysOpenatCtx {
	pub header: TracepointHeader,
	pub syscall_nr: i64,
	pub dfd: i32,
	pub _pad0: i32,
	pub filename: u64,
	pub flags: i32,
	pub mode: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout)]
pub struct EnterSysOpenat2Ctx {
	pub header: TracepointHeader,
	pub syscall_nr: i64,
	pub dfd: i32,
	pub _pad0: i32,
	pub filename: u64,
	/// `struct open_how *`, a user pointer.
	pub how: u64,
	pub usize: u64,
}

/// `struct open_how`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, FromBytes, Immutable, KnownLayout)]
pub struct Openat2OpenHow {
	pub flags: u64,
	pub mode: u64,
	pub resolve: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout)]
pub struct EnterSysSpliceCtx {
	pub header: TracepointHeader,
	pub syscall_nr: i64,
	pub fd_in: i64,
	pub off_in: u64,
	pub fd_out: i64,
	pub off_out: u64,
	pub len: u64,
	pub flags: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout)]
pub struct ExitSysCtx {
	pub header: TracepointHeader,
	pub syscall_nr: i32,
	pub _pad0: i32,
	pub ret: i64,
}

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use core::mem::{offset_of, size_of};

	use super::*;

	#[test]
	fn enter_layouts_match_tracepoint_format() -> Result<()> {
		// -- Check
		assert_eq!(size_of::<TracepointHeader>(), 8);
		assert_eq!(offset_of!(EnterSysOpenCtx, syscall_nr), 8);
		assert_eq!(offset_of!(EnterSysOpenCtx, filename), 16);
		assert_eq!(offset_of!(EnterSysOpenCtx, flags), 24);
		assert_eq!(offset_of!(EnterSysOpenCtx, mode), 28);
		assert_eq!(offset_of!(EnterSysOpenatCtx, filename), 24);
		assert_eq!(offset_of!(EnterSysOpenatCtx, flags), 32);
		assert_eq!(offset_of!(EnterSysOpenat2Ctx, how), 32);
		assert_eq!(offset_of!(EnterSysOpenat2Ctx, usize), 40);
		assert_eq!(offset_of!(EnterSysSpliceCtx, flags), 56);

		Ok(())
	}

	#[test]
	fn exit_layout_has_narrow_syscall_nr() -> Result<()> {
		// -- Check
		assert_eq!(offset_of!(ExitSysCtx, syscall_nr), 8);
		assert_eq!(offset_of!(ExitSysCtx, ret), 16);
		assert_eq!(size_of::<Openat2OpenHow>(), 24);

		Ok(())
	}
}

// endregion: --- Tests
