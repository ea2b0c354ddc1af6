use zerocopy::FromBytes;

use crate::{ConstantKey, ConstantSource, PathKey};

/// Addressed read into kernel memory: `read::<T>(base, offset)` copies a `T`
/// found at `base + offset`. Offsets come from the constant table, never from
/// a compiled-in struct layout. A failed or out-of-range read is `None`.
pub trait KernelReader {
	fn read<T: FromBytes + Copy>(&self, base: u64, offset: u64) -> Option<T>;

	fn read_ptr(&self, base: u64, offset: u64) -> Option<u64> {
		match self.read::<u64>(base, offset) {
			Some(0) | None => None,
			Some(ptr) => Some(ptr),
		}
	}
}

/// Resolves the `{inode, mount_id}` identity of a `struct path *`.
///
/// The mount id lives in the `struct mount` wrapping `path->mnt`, reached by
/// subtracting the offset of the embedded `vfsmount`.
pub fn read_path_key<C, R>(constants: &C, reader: &R, path: u64) -> Option<PathKey>
where
	C: ConstantSource,
	R: KernelReader,
{
	if path == 0 {
		return None;
	}

	let dentry = reader.read_ptr(path, constants.resolve(ConstantKey::PathDentryOffset))?;
	let vfsmount = reader.read_ptr(path, constants.resolve(ConstantKey::PathMntOffset))?;

	let inode = reader.read_ptr(dentry, constants.resolve(ConstantKey::DentryDInodeOffset))?;
	let ino = reader.read::<u64>(inode, constants.resolve(ConstantKey::InodeInoOffset))?;

	let mount = vfsmount.checked_sub(constants.resolve(ConstantKey::MountMntOffset))?;
	let mount_id = reader.read::<i32>(mount, constants.resolve(ConstantKey::MountIdOffset))?;

	Some(PathKey::new(ino, mount_id as u32))
}

/// Reads the audit login uid of a `struct task_struct *`.
pub fn read_task_auid<C, R>(constants: &C, reader: &R, task: u64) -> Option<u32>
where
	C: ConstantSource,
	R: KernelReader,
{
	if task == 0 {
		return None;
	}
	reader.read::<u32>(task, constants.resolve(ConstantKey::TaskStructLoginuidOffset))
}

// region:    --- Test memory

/// Flat byte arena standing in for kernel memory in host tests. Addresses start
/// at `base`, anything outside the arena reads as a fault.
#[cfg(test)]
pub(crate) mod test_memory {
	use super::*;

	pub struct FakeMemory {
		pub base: u64,
		pub bytes: Vec<u8>,
	}

	impl FakeMemory {
		pub fn new(base: u64, size: usize) -> Self {
			Self {
				base,
				bytes: vec![0; size],
			}
		}

		pub fn write_u32(&mut self, addr: u64, value: u32) {
			let at = (addr - self.base) as usize;
			self.bytes[at..at + 4].copy_from_slice(&value.to_ne_bytes());
		}

		pub fn write_u64(&mut self, addr: u64, value: u64) {
			let at = (addr - self.base) as usize;
			self.bytes[at..at + 8].copy_from_slice(&value.to_ne_bytes());
		}
	}

	impl KernelReader for FakeMemory {
		fn read<T: FromBytes + Copy>(&self, base: u64, offset: u64) -> Option<T> {
			let addr = base.checked_add(offset)?;
			let start = usize::try_from(addr.checked_sub(self.base)?).ok()?;
			let end = start.checked_add(core::mem::size_of::<T>())?;
			let bytes = self.bytes.get(start..end)?;
			T::read_from_bytes(bytes).ok()
		}
	}
}

// endregion: --- Test memory

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::{test_memory::FakeMemory, *};
	use crate::ConstantTable;

	fn fx_constants() -> Result<ConstantTable> {
		let table = ConstantTable::from_entries(ConstantKey::ALL.iter().map(|key| {
			let value = match key {
				ConstantKey::PathMntOffset => 0,
				ConstantKey::PathDentryOffset => 8,
				ConstantKey::DentryDInodeOffset => 48,
				ConstantKey::InodeInoOffset => 64,
				ConstantKey::MountMntOffset => 32,
				ConstantKey::MountIdOffset => 284,
				ConstantKey::TaskStructLoginuidOffset => 1800,
				_ => 0,
			};
			(key.name(), value)
		}))?;
		Ok(table)
	}

	#[test]
	fn read_path_key_follows_constant_offsets() -> Result<()> {
		// -- Setup & Fixtures
		let constants = fx_constants()?;
		let mut mem = FakeMemory::new(0x1000, 0x1000);
		let fx_path = 0x1000;
		let fx_dentry = 0x1100;
		let fx_inode = 0x1200;
		let fx_mount = 0x1300;
		mem.write_u64(fx_path, fx_mount + 32); // path->mnt points at mount->mnt
		mem.write_u64(fx_path + 8, fx_dentry);
		mem.write_u64(fx_dentry + 48, fx_inode);
		mem.write_u64(fx_inode + 64, 424242);
		mem.write_u32(fx_mount + 284, 37);

		// -- Exec
		let key = read_path_key(&constants, &mem, fx_path);

		// -- Check
		assert_eq!(key, Some(PathKey::new(424242, 37)));

		Ok(())
	}

	#[test]
	fn read_path_key_null_dentry_inode_is_none() -> Result<()> {
		// -- Setup & Fixtures
		let constants = fx_constants()?;
		let mut mem = FakeMemory::new(0x1000, 0x1000);
		mem.write_u64(0x1000, 0x1320);
		mem.write_u64(0x1008, 0x1100);
		// dentry->d_inode left null (negative dentry)

		// -- Exec & Check
		assert_eq!(read_path_key(&constants, &mem, 0x1000), None);
		assert_eq!(read_path_key(&constants, &mem, 0), None);

		Ok(())
	}

	#[test]
	fn read_task_auid_reads_loginuid() -> Result<()> {
		// -- Setup & Fixtures
		let constants = fx_constants()?;
		let mut mem = FakeMemory::new(0x1000, 0x1000);
		mem.write_u32(0x1000 + 1800, 1000);

		// -- Exec & Check
		assert_eq!(read_task_auid(&constants, &mem, 0x1000), Some(1000));
		assert_eq!(read_task_auid(&constants, &mem, 0x9000), None);

		Ok(())
	}
}

// endregion: --- Tests
