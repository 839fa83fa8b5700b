//! Shared protocol constants for the SFS request/stream transport

// Defaults shared by client and daemon
pub const DEFAULT_PORT: u16 = 50000;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_DIR: &str = ".";

// Request header: offset u64 | filename_len u32, both big-endian
pub const HEADER_LEN: usize = 8 + 4;

// Upper bound on a requested filename. Keeps a bogus length from making the
// daemon allocate gigabytes before it has opened anything.
pub const MAX_FILENAME_LEN: usize = 64 * 1024;

// Chunk size for file reads / socket reads. Tuned for narrow, high latency
// links; peers do not need to agree on it.
pub const DEFAULT_CHUNK_SIZE: usize = 100 * 1000;

// Kernel socket buffers (2 MiB)
pub const TCP_RCV_BUFFER_SIZE: u32 = 2 << 20;
pub const TCP_SND_BUFFER_SIZE: u32 = 2 << 20;

// Pending connections the kernel may queue before accept
pub const CONNECTION_BACKLOG: u32 = 5;
