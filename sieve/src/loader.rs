use std::time::Duration;

use aya::{
	programs::{KProbe, TracePoint},
	Ebpf, EbpfLoader,
};
use sieve_common::ConstantTable;
use tracing::{debug, info, warn};

use crate::{Error, Result};

const DISCARDER_TTL_SYMBOL: &str = "DISCARDER_TTL_NS";

/// Bump the memlock rlimit. This is needed for older kernels that don't use the
/// new memcg based accounting, see https://lwn.net/Articles/837122/
pub fn bump_memlock_rlimit() {
	let rlim = libc::rlimit {
		rlim_cur: libc::RLIM_INFINITY,
		rlim_max: libc::RLIM_INFINITY,
	};
	let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
	if ret != 0 {
		debug!("remove limit on locked memory failed, ret is: {ret}");
	}
}

/// Loads the object with every kernel layout constant and the discarder TTL
/// written into its globals. A global missing from the object fails the load.
pub fn load(constants: &ConstantTable, discarder_ttl: Duration) -> Result<Ebpf> {
	let globals: Vec<(&'static str, u64)> = constants
		.iter()
		.map(|(key, value)| (key.symbol(), value))
		.chain([(DISCARDER_TTL_SYMBOL, discarder_ttl.as_nanos().min(u64::MAX as u128) as u64)])
		.collect();

	let mut loader = EbpfLoader::new();
	for (symbol, value) in &globals {
		loader.set_global(*symbol, value, true);
	}

	let mut ebpf = loader.load(aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/sieve")))?;
	if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
		// This can happen if you remove all log statements from your eBPF program.
		warn!("failed to initialize eBPF logger: {e}");
	}

	info!("eBPF object loaded with {} globals", globals.len());
	Ok(ebpf)
}

/// Attaches every hook. Maps must already hold the catalog.
pub fn attach_hooks(ebpf: &mut Ebpf) -> Result<()> {
	attach_tracepoint(ebpf, "sys_enter_open", &["sys_enter_open"], true)?;
	attach_tracepoint(ebpf, "sys_enter_openat", &["sys_enter_openat"], false)?;
	attach_tracepoint(ebpf, "sys_enter_openat2", &["sys_enter_openat2"], true)?;
	attach_tracepoint(
		ebpf,
		"sys_exit_open",
		&["sys_exit_open", "sys_exit_openat", "sys_exit_openat2"],
		true,
	)?;
	attach_kprobe(ebpf, "vfs_open")?;

	attach_tracepoint(ebpf, "sys_enter_splice", &["sys_enter_splice"], false)?;
	attach_kprobe(ebpf, "get_pipe_info")?;
	attach_tracepoint(ebpf, "sys_exit_splice", &["sys_exit_splice"], false)?;

	Ok(())
}

/// Loads `program` once and attaches it to each syscall tracepoint in
/// `targets`. With `optional`, targets the kernel lacks (no `open` on arm64,
/// no `openat2` before 5.6) are skipped.
fn attach_tracepoint(ebpf: &mut Ebpf, program: &'static str, targets: &[&str], optional: bool) -> Result<()> {
	let tp: &mut TracePoint = ebpf
		.program_mut(program)
		.ok_or(Error::EbpfProgNotFound(program))?
		.try_into()?;
	tp.load()?;

	for target in targets {
		match tp.attach("syscalls", target) {
			Ok(_) => debug!("attached {program} to syscalls/{target}"),
			Err(e) if optional => warn!("skipping syscalls/{target}: {e}"),
			Err(e) => return Err(e.into()),
		}
	}
	Ok(())
}

fn attach_kprobe(ebpf: &mut Ebpf, program: &'static str) -> Result<()> {
	let kp: &mut KProbe = ebpf
		.program_mut(program)
		.ok_or(Error::EbpfProgNotFound(program))?
		.try_into()?;
	kp.load()?;
	kp.attach(program, 0)?;
	debug!("attached {program}");
	Ok(())
}
