use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::Result;

/// Owns the worker tasks and the token that stops them.
pub struct Supervisor {
	shutdown: CancellationToken,
	tasks: JoinSet<(&'static str, Result<()>)>,
}

impl Supervisor {
	pub fn new() -> Self {
		Self {
			shutdown: CancellationToken::new(),
			tasks: JoinSet::new(),
		}
	}

	pub fn token(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	/// Spawns a named worker. A worker that returns, with or without an error,
	/// cancels the token so the whole agent winds down with it.
	pub fn spawn<F>(&mut self, name: &'static str, fut: F)
	where
		F: Future<Output = Result<()>> + Send + 'static,
	{
		let shutdown = self.shutdown.clone();
		self.tasks.spawn(async move {
			let res = fut.await;
			if !shutdown.is_cancelled() {
				info!("worker '{name}' stopped, shutting down");
				shutdown.cancel();
			}
			(name, res)
		});
	}

	/// Cancels every worker and waits for them. Returns the first worker error;
	/// later ones are only logged.
	pub async fn shutdown(mut self) -> Result<()> {
		info!("Supervisor shutdown starting");
		self.shutdown.cancel();

		let mut first_err = None;
		while let Some(res) = self.tasks.join_next().await {
			let (name, res) = res?;
			if let Err(err) = res {
				error!("worker '{name}' failed: {err}");
				first_err.get_or_insert(err);
			}
		}
		info!("Supervisor shutdown complete");

		match first_err {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

// region:    --- Tests


// endregion: --- Tests
