//! Kernel-layout constants.
//!
//! Every offset, size and layout flag the hot path needs to walk opaque kernel
//! objects is a `ConstantKey`. The values are supplied once, before the eBPF
//! object is loaded, and are never patched afterwards: a different kernel means
//! a new table and a new load.

pub const CONSTANT_COUNT: usize = 16;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstantKey {
	// -- pipe_inode_info / pipe_buffer
	KernelHasLegacyPipeInodeInfo,
	SizeofPipeBuffer,
	PipeInodeInfoBufsOffset,
	PipeInodeInfoNrbufsOffset,
	PipeInodeInfoCurbufOffset,
	PipeInodeInfoBuffersOffset,
	PipeInodeInfoHeadOffset,
	PipeInodeInfoRingSizeOffset,
	PipeBufferFlagsOffset,
	// -- path / dentry / inode / mount
	PathMntOffset,
	PathDentryOffset,
	DentryDInodeOffset,
	InodeInoOffset,
	MountMntOffset,
	MountIdOffset,
	// -- task_struct
	TaskStructLoginuidOffset,
}

impl ConstantKey {
	pub const ALL: [ConstantKey; CONSTANT_COUNT] = [
		ConstantKey::KernelHasLegacyPipeInodeInfo,
		ConstantKey::SizeofPipeBuffer,
		ConstantKey::PipeInodeInfoBufsOffset,
		ConstantKey::PipeInodeInfoNrbufsOffset,
		ConstantKey::PipeInodeInfoCurbufOffset,
		ConstantKey::PipeInodeInfoBuffersOffset,
		ConstantKey::PipeInodeInfoHeadOffset,
		ConstantKey::PipeInodeInfoRingSizeOffset,
		ConstantKey::PipeBufferFlagsOffset,
		ConstantKey::PathMntOffset,
		ConstantKey::PathDentryOffset,
		ConstantKey::DentryDInodeOffset,
		ConstantKey::InodeInoOffset,
		ConstantKey::MountMntOffset,
		ConstantKey::MountIdOffset,
		ConstantKey::TaskStructLoginuidOffset,
	];

	/// Key used in configuration files and on the command line.
	pub const fn name(self) -> &'static str {
		match self {
			ConstantKey::KernelHasLegacyPipeInodeInfo => "kernel_has_legacy_pipe_inode_info",
			ConstantKey::SizeofPipeBuffer => "sizeof_pipe_buffer",
			ConstantKey::PipeInodeInfoBufsOffset => "pipe_inode_info_bufs_offset",
			ConstantKey::PipeInodeInfoNrbufsOffset => "pipe_inode_info_nrbufs_offset",
			ConstantKey::PipeInodeInfoCurbufOffset => "pipe_inode_info_curbuf_offset",
			ConstantKey::PipeInodeInfoBuffersOffset => "pipe_inode_info_buffers_offset",
			ConstantKey::PipeInodeInfoHeadOffset => "pipe_inode_info_head_offset",
			ConstantKey::PipeInodeInfoRingSizeOffset => "pipe_inode_info_ring_size_offset",
			ConstantKey::PipeBufferFlagsOffset => "pipe_buffer_flags_offset",
			ConstantKey::PathMntOffset => "path_mnt_offset",
			ConstantKey::PathDentryOffset => "path_dentry_offset",
			ConstantKey::DentryDInodeOffset => "dentry_d_inode_offset",
			ConstantKey::InodeInoOffset => "inode_ino_offset",
			ConstantKey::MountMntOffset => "mount_mnt_offset",
			ConstantKey::MountIdOffset => "mount_id_offset",
			ConstantKey::TaskStructLoginuidOffset => "task_struct_loginuid_offset",
		}
	}

	/// Name of the global in the eBPF object holding this constant.
	pub const fn symbol(self) -> &'static str {
		match self {
			ConstantKey::KernelHasLegacyPipeInodeInfo => "KERNEL_HAS_LEGACY_PIPE_INODE_INFO",
			ConstantKey::SizeofPipeBuffer => "SIZEOF_PIPE_BUFFER",
			ConstantKey::PipeInodeInfoBufsOffset => "PIPE_INODE_INFO_BUFS_OFFSET",
			ConstantKey::PipeInodeInfoNrbufsOffset => "PIPE_INODE_INFO_NRBUFS_OFFSET",
			ConstantKey::PipeInodeInfoCurbufOffset => "PIPE_INODE_INFO_CURBUF_OFFSET",
			ConstantKey::PipeInodeInfoBuffersOffset => "PIPE_INODE_INFO_BUFFERS_OFFSET",
			ConstantKey::PipeInodeInfoHeadOffset => "PIPE_INODE_INFO_HEAD_OFFSET",
			ConstantKey::PipeInodeInfoRingSizeOffset => "PIPE_INODE_INFO_RING_SIZE_OFFSET",
			ConstantKey::PipeBufferFlagsOffset => "PIPE_BUFFER_FLAGS_OFFSET",
			ConstantKey::PathMntOffset => "PATH_MNT_OFFSET",
			ConstantKey::PathDentryOffset => "PATH_DENTRY_OFFSET",
			ConstantKey::DentryDInodeOffset => "DENTRY_D_INODE_OFFSET",
			ConstantKey::InodeInoOffset => "INODE_INO_OFFSET",
			ConstantKey::MountMntOffset => "MOUNT_MNT_OFFSET",
			ConstantKey::MountIdOffset => "MOUNT_ID_OFFSET",
			ConstantKey::TaskStructLoginuidOffset => "TASK_STRUCT_LOGINUID_OFFSET",
		}
	}

	pub const fn index(self) -> usize {
		self as usize
	}

	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|key| key.name() == name)
	}
}

/// Read side of the constant table. Resolution cannot fail: completeness is
/// checked when the table is built, before anything is attached.
pub trait ConstantSource {
	fn resolve(&self, key: ConstantKey) -> u64;

	fn resolve_flag(&self, key: ConstantKey) -> bool {
		self.resolve(key) != 0
	}
}

// region:    --- Host table

#[cfg(any(test, feature = "user"))]
pub use table::*;

#[cfg(any(test, feature = "user"))]
mod table {
	use super::*;

	#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
	pub enum ConstantError {
		#[display("unknown kernel constant '{_0}'")]
		UnknownKey(String),
		#[display("missing kernel constants: {}", _0.join(", "))]
		Missing(Vec<&'static str>),
	}

	impl std::error::Error for ConstantError {}

	/// Complete, immutable set of kernel-layout constants.
	#[derive(Debug, Clone, PartialEq, Eq)]
	pub struct ConstantTable {
		values: [u64; CONSTANT_COUNT],
	}

	impl ConstantTable {
		/// Builds the table from `(name, value)` pairs. Later pairs override earlier
		/// ones, so configuration can be layered (file first, command line last).
		pub fn from_entries<'a, I>(entries: I) -> Result<Self, ConstantError>
		where
			I: IntoIterator<Item = (&'a str, u64)>,
		{
			let mut values: [Option<u64>; CONSTANT_COUNT] = [None; CONSTANT_COUNT];

			for (name, value) in entries {
				let key = ConstantKey::from_name(name).ok_or_else(|| ConstantError::UnknownKey(name.to_string()))?;
				values[key.index()] = Some(value);
			}

			let missing: Vec<&'static str> = ConstantKey::ALL
				.iter()
				.filter(|key| values[key.index()].is_none())
				.map(|key| key.name())
				.collect();

			if !missing.is_empty() {
				return Err(ConstantError::Missing(missing));
			}

			Ok(Self {
				values: values.map(|v| v.unwrap_or_default()),
			})
		}

		pub fn iter(&self) -> impl Iterator<Item = (ConstantKey, u64)> + '_ {
			ConstantKey::ALL.iter().map(|key| (*key, self.values[key.index()]))
		}
	}

	impl ConstantSource for ConstantTable {
		fn resolve(&self, key: ConstantKey) -> u64 {
			self.values[key.index()]
		}
	}
}

// endregion: --- Host table

// region:    --- Tests


// endregion: --- Tests
