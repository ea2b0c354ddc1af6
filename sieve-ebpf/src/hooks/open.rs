use aya_ebpf::{
	helpers::{bpf_get_current_pid_tgid, bpf_probe_read_user},
	programs::{ProbeContext, TracePointContext},
};
use aya_log_ebpf::error;
use sieve_common::{
	read_path_key, Approval, ApproverEngine, ApproverInput, DiscarderEngine, EnterSysOpenCtx, EnterSysOpenat2Ctx,
	EnterSysOpenatCtx, EventHeader, EventType, ExitSysCtx, FlagField, FlagValue, InodeDiscarderKey, OpenEvent,
	Openat2OpenHow, PathKey, SyscallCache, Verdict,
};

use crate::{
	constants::{discarder_ttl, LoadedConstants},
	maps::{MapCatalog, MapDiscarders, MapRevisions, PerCpuStats, EVT_MAP, SYSCALLS},
	utils::{current_auid, now, read_user_basename, ProbeReader},
};

// region:    --- Enter

pub fn try_sys_enter_open(ctx: TracePointContext) -> Result<u32, i64> {
	let args: EnterSysOpenCtx = unsafe { ctx.read_at(0)? };
	cache_open(args.filename, args.flags as u32, args.mode as u32, None)
}

pub fn try_sys_enter_openat(ctx: TracePointContext) -> Result<u32, i64> {
	let args: EnterSysOpenatCtx = unsafe { ctx.read_at(0)? };
	cache_open(args.filename, args.flags as u32, args.mode as u32, None)
}

pub fn try_sys_enter_openat2(ctx: TracePointContext) -> Result<u32, i64> {
	let args: EnterSysOpenat2Ctx = unsafe { ctx.read_at(0)? };
	let how: Openat2OpenHow = if args.how == 0 {
		Openat2OpenHow::default()
	} else {
		unsafe { bpf_probe_read_user(args.how as *const Openat2OpenHow)? }
	};
	cache_open(args.filename, how.flags as u32, how.mode as u32, Some(how.resolve))
}

/// Runs the approvers on what the syscall arguments tell, and parks the verdict
/// until the file is known.
fn cache_open(filename: u64, flags: u32, mode: u32, resolve: Option<u64>) -> Result<u32, i64> {
	let basename = read_user_basename(filename);
	let auid = current_auid();

	let mut input = ApproverInput::new(EventType::Open).with_flag(FlagValue::new(FlagField::OpenFlags, flags as u64));
	input = match &basename {
		Some(basename) => input.with_basename(basename),
		None => input.mark_incomplete(),
	};
	if let Some(resolve) = resolve {
		input = input.with_flag(FlagValue::new(FlagField::Openat2Resolve, resolve));
	}
	if let Some(auid) = auid {
		input = input.with_auid(auid);
	}

	let verdict = ApproverEngine::approve(&MapCatalog, &PerCpuStats, &input);

	let entry = SyscallCache {
		event_type: EventType::Open as u64,
		timestamp: now(),
		file: PathKey::default(),
		pipe: 0,
		flags,
		mode,
		pipe_entry_flag: 0,
		auid: auid.unwrap_or(u32::MAX),
		approval: verdict.approval as u8,
		object_scoped: verdict.object_scoped as u8,
		has_file: 0,
		has_auid: auid.is_some() as u8,
		_pad0: [0; 4],
		basename: basename.unwrap_or_default(),
	};

	SYSCALLS.insert(&bpf_get_current_pid_tgid(), &entry, 0)?;
	Ok(0)
}

// endregion: --- Enter

// region:    --- vfs_open

// int vfs_open(const struct path *path, struct file *file)
pub fn try_vfs_open(ctx: ProbeContext) -> Result<u32, i64> {
	let pid_tgid = bpf_get_current_pid_tgid();
	let Some(entry) = SYSCALLS.get_ptr_mut(&pid_tgid) else {
		return Ok(0);
	};
	let entry = unsafe { &mut *entry };
	if entry.event_type != EventType::Open as u64 || entry.has_file != 0 {
		return Ok(0);
	}

	let path: u64 = ctx.arg(0).ok_or(1i64)?;
	let Some(file) = read_path_key(&LoadedConstants, &ProbeReader, path) else {
		return Ok(0);
	};
	entry.file = file;
	entry.has_file = 1;

	let key = InodeDiscarderKey::new(file, true);
	let verdict = Verdict {
		approval: Approval::from_u8(entry.approval),
		object_scoped: entry.object_scoped != 0,
	};
	let forward = DiscarderEngine::settle(
		&MapDiscarders,
		&MapRevisions,
		&PerCpuStats,
		EventType::Open,
		&verdict,
		&key,
		now(),
		discarder_ttl(),
	);
	if !forward {
		let _ = SYSCALLS.remove(&pid_tgid);
	}

	Ok(0)
}

// endregion: --- vfs_open

// region:    --- Exit

pub fn try_sys_exit_open(ctx: TracePointContext) -> Result<u32, i64> {
	let pid_tgid = bpf_get_current_pid_tgid();
	let Some(entry) = (unsafe { SYSCALLS.get(&pid_tgid) }).copied() else {
		return Ok(0);
	};
	if entry.event_type != EventType::Open as u64 {
		return Ok(0);
	}
	let _ = SYSCALLS.remove(&pid_tgid);

	if !Approval::from_u8(entry.approval).is_approved() {
		return Ok(0);
	}

	let exit: ExitSysCtx = unsafe { ctx.read_at(0)? };

	let event = OpenEvent {
		header: EventHeader {
			event_type: EventType::Open as u64,
			timestamp: entry.timestamp,
			pid: pid_tgid as u32,
			tgid: (pid_tgid >> 32) as u32,
			approval: entry.approval,
			_pad0: [0; 7],
		},
		file: entry.file,
		retval: exit.ret,
		flags: entry.flags,
		mode: entry.mode,
		basename: entry.basename,
	};

	if let Err(e) = EVT_MAP.output(&event, 0) {
		error!(&ctx, "ringbuf write failed: {}", e);
	}

	Ok(0)
}

// endregion: --- Exit
