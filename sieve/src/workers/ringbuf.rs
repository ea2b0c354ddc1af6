use aya::maps::{MapData, RingBuf};
use sieve_common::{EventHeader, EventType, OpenEvent, SieveEvent, SpliceEvent};
use tokio::io::unix::AsyncFd;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zerocopy::FromBytes;

use crate::{
	error::{Error, Result},
	trx::Tx,
};

pub struct RingBufWorker {
	ringbuf_fd: AsyncFd<RingBuf<MapData>>,
	tx: Tx<SieveEvent>,
	shutdown: CancellationToken,
}

impl RingBufWorker {
	pub fn start(ringbuf: RingBuf<MapData>, tx: Tx<SieveEvent>, shutdown: CancellationToken) -> Result<Self> {
		let ringbuf_fd = AsyncFd::new(ringbuf)?;
		debug!("ring buffer feeding channel '{}'", tx.name());
		Ok(RingBufWorker { ringbuf_fd, tx, shutdown })
	}

	pub async fn run(mut self) -> Result<()> {
		loop {
			let mut guard = tokio::select! {
				_ = self.shutdown.cancelled() => break,
				guard = self.ringbuf_fd.readable_mut() => guard?,
			};

			let ring_buf = guard.get_inner_mut();
			while let Some(item) = ring_buf.next() {
				match parse_event_from_bytes(item.as_ref()) {
					Ok(evt) => self.tx.send(evt).await?,
					Err(e) => debug!("dropping ring buffer record: {e}"),
				}
			}

			guard.clear_ready();
		}
		Ok(())
	}
}

/// Records are copied out, so the ring buffer slot alignment does not matter.
pub fn parse_event_from_bytes(data: &[u8]) -> Result<SieveEvent> {
	let (header, _) = EventHeader::read_from_prefix(data).map_err(|_| Error::InvalidEventSize)?;

	match EventType::from_u64(header.event_type) {
		Some(EventType::Open) => {
			let (evt, _) = OpenEvent::read_from_prefix(data).map_err(|_| Error::InvalidEventSize)?;
			Ok(SieveEvent::Open(evt))
		}
		Some(EventType::Splice) => {
			let (evt, _) = SpliceEvent::read_from_prefix(data).map_err(|_| Error::InvalidEventSize)?;
			Ok(SieveEvent::Splice(evt))
		}
		_ => Err(Error::UnknownEventType(header.event_type)),
	}
}

// region:    --- Tests


// endregion: --- Tests
