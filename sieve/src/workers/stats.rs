use std::time::Duration;

use aya::maps::{MapData, PerCpuArray};
use sieve_common::{ApproverStats, DiscarderStats, EventType};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;

/// Periodically folds the per-CPU counters and reports them.
pub struct StatsWorker {
	approvers: PerCpuArray<MapData, ApproverStats>,
	discarders: PerCpuArray<MapData, DiscarderStats>,
	events: Vec<EventType>,
	interval: Duration,
	shutdown: CancellationToken,
}

impl StatsWorker {
	pub fn start(
		approvers: PerCpuArray<MapData, ApproverStats>,
		discarders: PerCpuArray<MapData, DiscarderStats>,
		events: Vec<EventType>,
		interval: Duration,
		shutdown: CancellationToken,
	) -> Result<Self> {
		Ok(StatsWorker {
			approvers,
			discarders,
			events,
			interval,
			shutdown,
		})
	}

	pub async fn run(self) -> Result<()> {
		let mut ticker = tokio::time::interval(self.interval);
		ticker.tick().await;

		loop {
			tokio::select! {
				_ = self.shutdown.cancelled() => break,
				_ = ticker.tick() => self.report()?,
			}
		}

		// final totals on the way out
		self.report()
	}

	fn report(&self) -> Result<()> {
		for event in &self.events {
			let approvers = merge_approver_stats(self.approvers.get(&event.index(), 0)?.iter());
			let discarders = merge_discarder_stats(self.discarders.get(&event.index(), 0)?.iter());
			if approvers.total() == 0 && discarders == DiscarderStats::default() {
				continue;
			}
			info!(
				target: "stats",
				"[{event}] rejected:{} policy:{} basename:{} flag:{} auid:{} | discarders added:{} discarded:{}",
				approvers.rejected,
				approvers.approved_by_policy,
				approvers.approved_by_basename,
				approvers.approved_by_flag,
				approvers.approved_by_auid,
				discarders.discarders_added,
				discarders.event_discarded,
			);
		}
		Ok(())
	}
}

pub fn merge_approver_stats<'a>(per_cpu: impl IntoIterator<Item = &'a ApproverStats>) -> ApproverStats {
	per_cpu.into_iter().fold(ApproverStats::default(), |mut acc, cpu| {
		acc.accumulate(cpu);
		acc
	})
}

pub fn merge_discarder_stats<'a>(per_cpu: impl IntoIterator<Item = &'a DiscarderStats>) -> DiscarderStats {
	per_cpu.into_iter().fold(DiscarderStats::default(), |mut acc, cpu| {
		acc.accumulate(cpu);
		acc
	})
}

// region:    --- Tests


// endregion: --- Tests
