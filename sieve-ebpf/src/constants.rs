use sieve_common::{ConstantKey, ConstantSource};

// Every global below is rewritten by the loader before the object is loaded.
// Reads go through `read_volatile` so the zero initializers are never folded.
macro_rules! load_time_constants {
	($($key:ident => $symbol:ident),* $(,)?) => {
		$(
			#[no_mangle]
			static $symbol: u64 = 0;
		)*

		pub struct LoadedConstants;

		impl ConstantSource for LoadedConstants {
			#[inline(always)]
			fn resolve(&self, key: ConstantKey) -> u64 {
				match key {
					$(ConstantKey::$key => unsafe { core::ptr::read_volatile(&$symbol) },)*
				}
			}
		}
	};
}

load_time_constants!(
	KernelHasLegacyPipeInodeInfo => KERNEL_HAS_LEGACY_PIPE_INODE_INFO,
	SizeofPipeBuffer => SIZEOF_PIPE_BUFFER,
	PipeInodeInfoBufsOffset => PIPE_INODE_INFO_BUFS_OFFSET,
	PipeInodeInfoNrbufsOffset => PIPE_INODE_INFO_NRBUFS_OFFSET,
	PipeInodeInfoCurbufOffset => PIPE_INODE_INFO_CURBUF_OFFSET,
	PipeInodeInfoBuffersOffset => PIPE_INODE_INFO_BUFFERS_OFFSET,
	PipeInodeInfoHeadOffset => PIPE_INODE_INFO_HEAD_OFFSET,
	PipeInodeInfoRingSizeOffset => PIPE_INODE_INFO_RING_SIZE_OFFSET,
	PipeBufferFlagsOffset => PIPE_BUFFER_FLAGS_OFFSET,
	PathMntOffset => PATH_MNT_OFFSET,
	PathDentryOffset => PATH_DENTRY_OFFSET,
	DentryDInodeOffset => DENTRY_D_INODE_OFFSET,
	InodeInoOffset => INODE_INO_OFFSET,
	MountMntOffset => MOUNT_MNT_OFFSET,
	MountIdOffset => MOUNT_ID_OFFSET,
	TaskStructLoginuidOffset => TASK_STRUCT_LOGINUID_OFFSET,
);

/// Lifetime of a discarder, in nanoseconds.
#[no_mangle]
static DISCARDER_TTL_NS: u64 = 0;

#[inline(always)]
pub fn discarder_ttl() -> u64 {
	unsafe { core::ptr::read_volatile(&DISCARDER_TTL_NS) }
}
