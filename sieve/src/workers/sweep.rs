use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
	discarders::{monotonic_ns, DiscarderTable, SharedRevisions},
	error::Result,
};

/// Removes discarders no lookup would honor anymore, so the LRU map keeps
/// room for live ones.
pub struct SweepWorker {
	discarders: DiscarderTable,
	revisions: SharedRevisions,
	interval: Duration,
	shutdown: CancellationToken,
}

impl SweepWorker {
	pub fn start(
		discarders: DiscarderTable,
		revisions: SharedRevisions,
		interval: Duration,
		shutdown: CancellationToken,
	) -> Result<Self> {
		Ok(SweepWorker {
			discarders,
			revisions,
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
				_ = ticker.tick() => {
					let removed = self.sweep_once()?;
					if removed > 0 {
						debug!("swept {removed} discarders");
					}
				}
			}
		}
		Ok(())
	}

	fn sweep_once(&self) -> Result<usize> {
		// snapshot first: a revision bumped during the walk only makes more
		// entries stale on the next pass
		let snapshot = self.revisions.lock()?.snapshot()?;
		self.discarders.sweep(monotonic_ns(), &snapshot)
	}
}
