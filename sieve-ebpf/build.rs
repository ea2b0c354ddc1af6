use which::which;

/// Rebuilds when `bpf-linker` changes, since the object it links is embedded by
/// the userspace crate.
fn main() {
	if let Ok(bpf_linker) = which("bpf-linker") {
		println!("cargo:rerun-if-changed={}", bpf_linker.display());
	}
}
