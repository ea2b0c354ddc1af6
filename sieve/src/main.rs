// region:    --- Modules
mod cli;
mod config;
mod discarders;
mod error;
mod loader;
mod maps;
mod policy;
mod supervisor;
mod trx;
mod workers;
// endregion: --- Modules

use crate::{
	cli::args::Cli,
	config::Config,
	maps::SieveMaps,
	policy::{publish, CompiledPolicy},
	supervisor::Supervisor,
	trx::new_channel,
	workers::{EventLogWorker, MountWatchWorker, PolicyWatchWorker, RingBufWorker, StatsWorker, SweepWorker},
};

pub use self::error::{Error, Result};
use clap::Parser;
use sieve_common::SieveEvent;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
	let args = Cli::parse();
	tracing_subscriber::fmt()
		.with_target(false)
		.with_env_filter(EnvFilter::from_default_env())
		.init();

	// -- Everything that can be wrong with the input fails before loading
	let config = match &args.config {
		Some(path) => Config::from_file(path)?,
		None => Config::default(),
	};
	let constants = config.constant_table(&args.constants)?;
	let policy_path = args.policy.clone().or_else(|| config.policy.clone());
	let policy = match &policy_path {
		Some(path) => CompiledPolicy::from_file(path)?,
		None => CompiledPolicy::default(),
	};

	loader::bump_memlock_rlimit();
	let mut ebpf = loader::load(&constants, config.discarders.ttl)?;

	let SieveMaps {
		events,
		mut catalog,
		discarders,
		revisions,
		approver_stats,
		discarder_stats,
	} = SieveMaps::take(&mut ebpf)?;

	catalog.set_enabled_events(config.enabled_mask())?;
	if policy.is_empty() {
		info!("no policy, every event kind is unfiltered");
	} else {
		let report = publish(&mut catalog, &CompiledPolicy::default(), &policy)?;
		info!("policy published: {} entries", report.written);
	}

	loader::attach_hooks(&mut ebpf)?;

	let mut supervisor = Supervisor::new();
	let (event_tx, event_rx) = new_channel::<SieveEvent>("events");

	let ringbuf_worker = RingBufWorker::start(events, event_tx, supervisor.token())?;
	let event_log_worker = EventLogWorker::start(event_rx, supervisor.token())?;
	let stats_worker = StatsWorker::start(
		approver_stats,
		discarder_stats,
		config.events.clone(),
		*args.stats_interval,
		supervisor.token(),
	)?;
	let sweep_worker = SweepWorker::start(
		discarders,
		revisions.clone(),
		config.discarders.sweep_interval,
		supervisor.token(),
	)?;
	let mount_worker = MountWatchWorker::start(revisions, config.discarders.mount_poll_interval, supervisor.token())?;

	supervisor.spawn("ringbuf", ringbuf_worker.run());
	supervisor.spawn("event_log", event_log_worker.run());
	supervisor.spawn("stats", stats_worker.run());
	supervisor.spawn("sweep", sweep_worker.run());
	supervisor.spawn("mount_watch", mount_worker.run());

	if let Some(path) = policy_path {
		let policy_worker = PolicyWatchWorker::start(path, catalog, policy, supervisor.token())?;
		supervisor.spawn("policy_watch", policy_worker.run());
	}

	let token = supervisor.token();
	match args.time {
		Some(duration) => {
			tokio::select! {
				_ = token.cancelled() => {}
				_ = tokio::time::sleep(duration.into()) => info!("run time elapsed"),
			}
		}
		None => {
			tokio::select! {
				_ = token.cancelled() => {}
				res = tokio::signal::ctrl_c() => {
					res?;
					info!("interrupted");
				}
			}
		}
	}

	supervisor.shutdown().await?;

	// detaches every hook
	drop(ebpf);

	Ok(())
}
