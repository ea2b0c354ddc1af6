use aya_ebpf::{
	helpers::bpf_get_current_pid_tgid,
	programs::{RetProbeContext, TracePointContext},
};
use aya_log_ebpf::error;
use sieve_common::{
	pipe_bufs, pipe_last_buffer_flags, Approval, ApproverEngine, ApproverInput, Basename, EventHeader, EventType,
	ExitSysCtx, FlagField, FlagValue, PathKey, SpliceEvent, SyscallCache,
};

use crate::{
	constants::LoadedConstants,
	maps::{MapCatalog, PerCpuStats, EVT_MAP, SYSCALLS},
	utils::{current_auid, now, ProbeReader},
};

pub fn try_sys_enter_splice(_ctx: TracePointContext) -> Result<u32, i64> {
	let auid = current_auid();

	let entry = SyscallCache {
		event_type: EventType::Splice as u64,
		timestamp: now(),
		file: PathKey::default(),
		pipe: 0,
		flags: 0,
		mode: 0,
		pipe_entry_flag: 0,
		auid: auid.unwrap_or(u32::MAX),
		approval: Approval::Rejected as u8,
		object_scoped: 0,
		has_file: 0,
		has_auid: auid.is_some() as u8,
		_pad0: [0; 4],
		basename: Basename::default(),
	};

	SYSCALLS.insert(&bpf_get_current_pid_tgid(), &entry, 0)?;
	Ok(0)
}

// struct pipe_inode_info *get_pipe_info(struct file *file, bool for_splice)
pub fn try_get_pipe_info(ctx: RetProbeContext) -> Result<u32, i64> {
	let Some(entry) = SYSCALLS.get_ptr_mut(&bpf_get_current_pid_tgid()) else {
		return Ok(0);
	};
	let entry = unsafe { &mut *entry };
	if entry.event_type != EventType::Splice as u64 || entry.pipe != 0 {
		return Ok(0);
	}

	let pipe: u64 = ctx.ret().unwrap_or(0);
	if pipe == 0 {
		// not a pipe, the other end may still be one
		return Ok(0);
	}

	entry.pipe = pipe;
	if let Some(bufs) = pipe_bufs(&LoadedConstants, &ProbeReader, pipe) {
		entry.pipe_entry_flag = pipe_last_buffer_flags(&LoadedConstants, &ProbeReader, pipe, bufs);
	}

	Ok(0)
}

pub fn try_sys_exit_splice(ctx: TracePointContext) -> Result<u32, i64> {
	let pid_tgid = bpf_get_current_pid_tgid();
	let Some(entry) = (unsafe { SYSCALLS.get(&pid_tgid) }).copied() else {
		return Ok(0);
	};
	if entry.event_type != EventType::Splice as u64 {
		return Ok(0);
	}
	let _ = SYSCALLS.remove(&pid_tgid);

	let pipe_exit_flag = match pipe_bufs(&LoadedConstants, &ProbeReader, entry.pipe) {
		Some(bufs) => pipe_last_buffer_flags(&LoadedConstants, &ProbeReader, entry.pipe, bufs),
		None => 0,
	};

	let mut input = ApproverInput::new(EventType::Splice)
		.with_flag(FlagValue::new(FlagField::SpliceEntryFlags, entry.pipe_entry_flag as u64))
		.with_flag(FlagValue::new(FlagField::SpliceExitFlags, pipe_exit_flag as u64));
	if entry.has_auid != 0 {
		input = input.with_auid(entry.auid);
	}

	let verdict = ApproverEngine::approve(&MapCatalog, &PerCpuStats, &input);
	if !verdict.approval.is_approved() {
		return Ok(0);
	}

	let exit: ExitSysCtx = unsafe { ctx.read_at(0)? };

	let event = SpliceEvent {
		header: EventHeader {
			event_type: EventType::Splice as u64,
			timestamp: entry.timestamp,
			pid: pid_tgid as u32,
			tgid: (pid_tgid >> 32) as u32,
			approval: verdict.approval as u8,
			_pad0: [0; 7],
		},
		retval: exit.ret,
		pipe_entry_flag: entry.pipe_entry_flag,
		pipe_exit_flag,
	};

	if let Err(e) = EVT_MAP.output(&event, 0) {
		error!(&ctx, "ringbuf write failed: {}", e);
	}

	Ok(0)
}
