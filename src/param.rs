use static_assertions::const_assert;

/// Maximum number of processes.
pub const NPROC: usize = 512;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Open files per system.
pub const NFILE: usize = 1024;

/// Highest usable socket port. Port 0 is the "no port" sentinel.
pub const NPORT: usize = 1023;

// A pipe needs two descriptors; every kernel needs idle and init.
const_assert!(NOFILE >= 2);
const_assert!(NPROC >= 2);
const_assert!(NFILE >= NOFILE);
