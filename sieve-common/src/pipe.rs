//! Pipe buffer locator.
//!
//! Finds the flags word of the last written `pipe_buffer` of a
//! `pipe_inode_info`, on kernels with either the legacy `curbuf`/`nrbufs`
//! array or the `head`/`ring_size` ring. Which layout is running and where its
//! fields live is entirely data: see `ConstantKey`.
//!
//! Capacities are trusted to be powers of two only after checking. A zero or
//! non power of two capacity yields no slot, and therefore zero flags.

use crate::{ConstantKey, ConstantSource, KernelReader};

/// Field offsets and sizes for one walk, resolved fresh from the constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipeRingDescriptor {
	pub uses_legacy_layout: bool,
	/// `curbuf` (legacy) or `head` (ring).
	pub head_or_curbuf_offset: u64,
	/// `nrbufs`, legacy only.
	pub nrbufs_offset: u64,
	/// `buffers` (legacy) or `ring_size` (ring).
	pub buffers_or_ring_size_offset: u64,
	pub bufs_offset: u64,
	pub flags_offset: u64,
	pub buffer_size: u64,
}

impl PipeRingDescriptor {
	pub fn resolve<C: ConstantSource>(constants: &C) -> Self {
		let uses_legacy_layout = constants.resolve_flag(ConstantKey::KernelHasLegacyPipeInodeInfo);

		let (head_or_curbuf_offset, buffers_or_ring_size_offset) = if uses_legacy_layout {
			(
				constants.resolve(ConstantKey::PipeInodeInfoCurbufOffset),
				constants.resolve(ConstantKey::PipeInodeInfoBuffersOffset),
			)
		} else {
			(
				constants.resolve(ConstantKey::PipeInodeInfoHeadOffset),
				constants.resolve(ConstantKey::PipeInodeInfoRingSizeOffset),
			)
		};

		Self {
			uses_legacy_layout,
			head_or_curbuf_offset,
			nrbufs_offset: constants.resolve(ConstantKey::PipeInodeInfoNrbufsOffset),
			buffers_or_ring_size_offset,
			bufs_offset: constants.resolve(ConstantKey::PipeInodeInfoBufsOffset),
			flags_offset: constants.resolve(ConstantKey::PipeBufferFlagsOffset),
			buffer_size: constants.resolve(ConstantKey::SizeofPipeBuffer),
		}
	}
}

/// Snapshot of the slot bookkeeping of one pipe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipeSlots {
	Legacy { nrbufs: u32, curbuf: u32, buffers: u32 },
	Ring { head: u32, ring_size: u32 },
}

impl PipeSlots {
	pub fn read<R: KernelReader>(desc: &PipeRingDescriptor, reader: &R, pipe: u64) -> Option<Self> {
		let slots = if desc.uses_legacy_layout {
			PipeSlots::Legacy {
				nrbufs: reader.read::<u32>(pipe, desc.nrbufs_offset)?,
				curbuf: reader.read::<u32>(pipe, desc.head_or_curbuf_offset)?,
				buffers: reader.read::<u32>(pipe, desc.buffers_or_ring_size_offset)?,
			}
		} else {
			PipeSlots::Ring {
				head: reader.read::<u32>(pipe, desc.head_or_curbuf_offset)?,
				ring_size: reader.read::<u32>(pipe, desc.buffers_or_ring_size_offset)?,
			}
		};
		Some(slots)
	}

	/// Physical index of the last written slot.
	pub fn last_slot(&self) -> Option<u32> {
		match *self {
			PipeSlots::Legacy { nrbufs, curbuf, buffers } => {
				let mask = ring_mask(buffers)?;
				Some(curbuf.wrapping_add(nrbufs.saturating_sub(1)) & mask)
			}
			PipeSlots::Ring { head, ring_size } => {
				let mask = ring_mask(ring_size)?;
				Some(head.saturating_sub(1) & mask)
			}
		}
	}
}

fn ring_mask(capacity: u32) -> Option<u32> {
	if capacity.is_power_of_two() {
		Some(capacity - 1)
	} else {
		None
	}
}

/// Flags of the last written buffer of `pipe`, whose buffer array is `bufs`.
/// Zero on every anomaly.
pub fn pipe_last_buffer_flags<C, R>(constants: &C, reader: &R, pipe: u64, bufs: u64) -> u32
where
	C: ConstantSource,
	R: KernelReader,
{
	if pipe == 0 || bufs == 0 {
		return 0;
	}

	let desc = PipeRingDescriptor::resolve(constants);

	let Some(slot) = PipeSlots::read(&desc, reader, pipe).and_then(|slots| slots.last_slot()) else {
		return 0;
	};

	let Some(buffer) = (slot as u64).checked_mul(desc.buffer_size).and_then(|off| bufs.checked_add(off)) else {
		return 0;
	};

	reader.read::<u32>(buffer, desc.flags_offset).unwrap_or(0)
}

/// Reads the `bufs` array pointer of `pipe`, for callers that only hold the pipe.
pub fn pipe_bufs<C, R>(constants: &C, reader: &R, pipe: u64) -> Option<u64>
where
	C: ConstantSource,
	R: KernelReader,
{
	if pipe == 0 {
		return None;
	}
	reader.read_ptr(pipe, constants.resolve(ConstantKey::PipeInodeInfoBufsOffset))
}

// region:    --- Tests


// endregion: --- Tests
