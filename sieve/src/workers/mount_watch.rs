use std::{collections::BTreeSet, path::PathBuf, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{discarders::SharedRevisions, error::Result};

const MOUNTINFO: &str = "/proc/self/mountinfo";

/// Polls the mount table and bumps the revision of every mount that went
/// away, so a new filesystem reusing its id and inode numbers never inherits
/// its discarders.
pub struct MountWatchWorker {
	revisions: SharedRevisions,
	mountinfo: PathBuf,
	interval: Duration,
	known: BTreeSet<u32>,
	shutdown: CancellationToken,
}

impl MountWatchWorker {
	pub fn start(revisions: SharedRevisions, interval: Duration, shutdown: CancellationToken) -> Result<Self> {
		let mountinfo = PathBuf::from(MOUNTINFO);
		let known = parse_mount_ids(&std::fs::read_to_string(&mountinfo)?);
		debug!("watching {} mounts", known.len());

		Ok(MountWatchWorker {
			revisions,
			mountinfo,
			interval,
			known,
			shutdown,
		})
	}

	pub async fn run(mut self) -> Result<()> {
		let mut ticker = tokio::time::interval(self.interval);
		ticker.tick().await;

		loop {
			tokio::select! {
				_ = self.shutdown.cancelled() => break,
				_ = ticker.tick() => self.poll().await?,
			}
		}
		Ok(())
	}

	async fn poll(&mut self) -> Result<()> {
		let content = match tokio::fs::read_to_string(&self.mountinfo).await {
			Ok(content) => content,
			Err(e) => {
				warn!("cannot read {}: {e}", self.mountinfo.display());
				return Ok(());
			}
		};
		let current = parse_mount_ids(&content);

		let vanished = vanished_mounts(&self.known, &current);
		if !vanished.is_empty() {
			let mut revisions = self.revisions.lock()?;
			for mount_id in &vanished {
				let revision = revisions.bump_mount(*mount_id)?;
				debug!("mount {mount_id} went away, revision now {revision}");
			}
		}

		self.known = current;
		Ok(())
	}
}

/// Mount ids, the first field of every `mountinfo` line.
pub fn parse_mount_ids(mountinfo: &str) -> BTreeSet<u32> {
	mountinfo
		.lines()
		.filter_map(|line| line.split_whitespace().next())
		.filter_map(|id| id.parse().ok())
		.collect()
}

pub fn vanished_mounts(known: &BTreeSet<u32>, current: &BTreeSet<u32>) -> Vec<u32> {
	known.difference(current).copied().collect()
}

// region:    --- Tests


// endregion: --- Tests
