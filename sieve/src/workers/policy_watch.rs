use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use notify::{INotifyWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, NoCache};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
	error::{Error, Result},
	maps::CatalogMaps,
	policy::{republish, CompiledPolicy},
	trx::{new_channel, Rx},
};

pub struct PolicyReload;

/// Republishes the policy file whenever it changes. A file that no longer
/// compiles, or that cannot be written to the maps, leaves the published
/// policy in place.
pub struct PolicyWatchWorker {
	rx: Rx<PolicyReload>,
	_debouncer: Debouncer<INotifyWatcher, NoCache>,
	policy_path: PathBuf,
	catalog: CatalogMaps,
	current: CompiledPolicy,
	shutdown: CancellationToken,
}

impl PolicyWatchWorker {
	pub fn start(
		policy_path: PathBuf,
		catalog: CatalogMaps,
		current: CompiledPolicy,
		shutdown: CancellationToken,
	) -> Result<Self> {
		let (tx, rx) = new_channel::<PolicyReload>("policy");

		// editors replace files, so watch the directory and filter on the name
		let dir = policy_path
			.parent()
			.filter(|dir| !dir.as_os_str().is_empty())
			.unwrap_or(Path::new("."))
			.to_path_buf();
		let file_name = policy_path
			.file_name()
			.ok_or_else(|| Error::custom(format!("'{}' is not a file path", policy_path.display())))?
			.to_os_string();

		let mut debouncer = new_debouncer(Duration::from_secs(1), None, move |res: DebounceEventResult| {
			let Ok(events) = res else {
				return;
			};
			let touched = events
				.iter()
				.flat_map(|evt| evt.paths.iter())
				.any(|path| path.file_name() == Some(file_name.as_os_str()));
			if touched {
				let _ = tx.send_sync(PolicyReload);
			}
		})?;

		debouncer.watch(&dir, RecursiveMode::NonRecursive)?;

		Ok(PolicyWatchWorker {
			rx,
			_debouncer: debouncer,
			policy_path,
			catalog,
			current,
			shutdown,
		})
	}

	pub async fn run(mut self) -> Result<()> {
		loop {
			tokio::select! {
				_ = self.shutdown.cancelled() => break,
				reload = self.rx.recv() => {
					reload?;
					self.rx.drain();
					self.reload();
				}
			}
		}
		Ok(())
	}

	fn reload(&mut self) {
		let next = match CompiledPolicy::from_file(&self.policy_path) {
			Ok(next) => next,
			Err(e) => {
				warn!("policy '{}' rejected, keeping the current one: {e}", self.policy_path.display());
				return;
			}
		};

		match republish(&mut self.catalog, &self.current, &next) {
			Ok(report) => {
				info!(
					"policy reloaded: {} written, {} removed, discarders revision {}",
					report.written, report.removed, report.revision
				);
				self.current = next;
			}
			Err(e) => warn!(
				"policy '{}' could not be published, keeping the current one: {e}",
				self.policy_path.display()
			),
		}
	}
}
