#![no_std]
#![no_main]

use aya_ebpf::{
	macros::{kprobe, kretprobe, tracepoint},
	programs::{ProbeContext, RetProbeContext, TracePointContext},
};

mod constants;
mod hooks;
mod maps;
mod utils;

// region:    --- Open family

#[tracepoint]
pub fn sys_enter_open(ctx: TracePointContext) -> u32 {
	match hooks::try_sys_enter_open(ctx) {
		Ok(ret) => ret,
		Err(ret) => ret.try_into().unwrap_or(1),
	}
}

#[tracepoint]
pub fn sys_enter_openat(ctx: TracePointContext) -> u32 {
	match hooks::try_sys_enter_openat(ctx) {
		Ok(ret) => ret,
		Err(ret) => ret.try_into().unwrap_or(1),
	}
}

#[tracepoint]
pub fn sys_enter_openat2(ctx: TracePointContext) -> u32 {
	match hooks::try_sys_enter_openat2(ctx) {
		Ok(ret) => ret,
		Err(ret) => ret.try_into().unwrap_or(1),
	}
}

#[kprobe]
pub fn vfs_open(ctx: ProbeContext) -> u32 {
	match hooks::try_vfs_open(ctx) {
		Ok(ret) => ret,
		Err(ret) => ret.try_into().unwrap_or(1),
	}
}

/// Attached to the exit of `open`, `openat` and `openat2`.
#[tracepoint]
pub fn sys_exit_open(ctx: TracePointContext) -> u32 {
	match hooks::try_sys_exit_open(ctx) {
		Ok(ret) => ret,
		Err(ret) => ret.try_into().unwrap_or(1),
	}
}

// endregion: --- Open family

// region:    --- Splice

#[tracepoint]
pub fn sys_enter_splice(ctx: TracePointContext) -> u32 {
	match hooks::try_sys_enter_splice(ctx) {
		Ok(ret) => ret,
		Err(ret) => ret.try_into().unwrap_or(1),
	}
}

#[kretprobe]
pub fn get_pipe_info(ctx: RetProbeContext) -> u32 {
	match hooks::try_get_pipe_info(ctx) {
		Ok(ret) => ret,
		Err(ret) => ret.try_into().unwrap_or(1),
	}
}

#[tracepoint]
pub fn sys_exit_splice(ctx: TracePointContext) -> u32 {
	match hooks::try_sys_exit_splice(ctx) {
		Ok(ret) => ret,
		Err(ret) => ret.try_into().unwrap_or(1),
	}
}

// endregion: --- Splice

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
	loop {}
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
