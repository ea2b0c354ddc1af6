use sieve_common::{Approval, OpenEvent, SieveEvent, SpliceEvent};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{error::Result, trx::Rx};

/// Last stop of the events the kernel let through.
pub struct EventLogWorker {
	rx: Rx<SieveEvent>,
	shutdown: CancellationToken,
}

impl EventLogWorker {
	pub fn start(rx: Rx<SieveEvent>, shutdown: CancellationToken) -> Result<Self> {
		Ok(EventLogWorker { rx, shutdown })
	}

	pub async fn run(self) -> Result<()> {
		loop {
			let evt = tokio::select! {
				_ = self.shutdown.cancelled() => break,
				evt = self.rx.recv() => evt?,
			};
			info!(target: "event", "{}", describe(&evt));
		}

		let pending = self.rx.drain();
		if pending > 0 {
			info!("{pending} events left unreported on '{}'", self.rx.name());
		}
		Ok(())
	}
}

pub fn describe(evt: &SieveEvent) -> String {
	match evt {
		SieveEvent::Open(open) => describe_open(open),
		SieveEvent::Splice(splice) => describe_splice(splice),
	}
}

fn describe_open(evt: &OpenEvent) -> String {
	format!(
		"[OPEN] PID:{} | TGID:{} | {} | ino:{} mnt:{} | flags:{:#o} mode:{:#o} | ret:{} | {}",
		evt.header.pid,
		evt.header.tgid,
		String::from_utf8_lossy(evt.basename.as_bytes()),
		evt.file.inode,
		evt.file.mount_id,
		evt.flags,
		evt.mode,
		evt.retval,
		approval_to_str(evt.header.approval),
	)
}

fn describe_splice(evt: &SpliceEvent) -> String {
	format!(
		"[SPLICE] PID:{} | TGID:{} | pipe flags:{:#x} -> {:#x} | ret:{} | {}",
		evt.header.pid,
		evt.header.tgid,
		evt.pipe_entry_flag,
		evt.pipe_exit_flag,
		evt.retval,
		approval_to_str(evt.header.approval),
	)
}

fn approval_to_str(approval: u8) -> &'static str {
	match Approval::from_u8(approval) {
		Approval::Rejected => "rejected",
		Approval::ByPolicy => "policy",
		Approval::ByBasename => "basename",
		Approval::ByFlag => "flag",
		Approval::ByAuid => "auid",
	}
}

// region:    --- Tests


// endregion: --- Tests
