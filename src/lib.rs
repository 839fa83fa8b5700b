//! SFS - simple file server library
//!
//! Fetch a named file from a remote directory over plain TCP, with resume
//! support for partial downloads.

pub mod cli;
pub mod file_stream;
pub mod log;
pub mod logger;
pub mod net_async;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod transport;
