use aya_ebpf::helpers::{
	bpf_probe_read_kernel, bpf_probe_read_user_str_bytes,
	r#gen::{bpf_get_current_task, bpf_ktime_get_ns},
};
use sieve_common::{read_task_auid, Basename, KernelReader};
use zerocopy::FromBytes;

use crate::{constants::LoadedConstants, maps::{PATH_SCRATCH, PATH_SCRATCH_LEN}};

pub struct ProbeReader;

impl KernelReader for ProbeReader {
	#[inline(always)]
	fn read<T: FromBytes + Copy>(&self, base: u64, offset: u64) -> Option<T> {
		let addr = base.checked_add(offset)?;
		unsafe { bpf_probe_read_kernel(addr as *const T) }.ok()
	}
}

#[inline(always)]
pub fn now() -> u64 {
	unsafe { bpf_ktime_get_ns() }
}

/// Audit login uid of the current task, `None` if it cannot be read.
#[inline(always)]
pub fn current_auid() -> Option<u32> {
	let task = unsafe { bpf_get_current_task() };
	read_task_auid(&LoadedConstants, &ProbeReader, task)
}

/// Basename of a user-space path, `None` when the path could not be read
/// whole.
#[inline(always)]
pub fn read_user_basename(filename: u64) -> Option<Basename> {
	if filename == 0 {
		return None;
	}
	let buf = PATH_SCRATCH.get_ptr_mut(0)?;
	let buf = unsafe { &mut *buf };
	let path = unsafe { bpf_probe_read_user_str_bytes(filename as *const u8, buf) }.ok()?;
	Basename::from_bounded_copy(path, PATH_SCRATCH_LEN)
}
