//! Request framing shared by the daemon and the client
//!
//! A request is a fixed 12 byte header followed by the raw filename bytes:
//! `offset u64 BE | filename_len u32 BE | filename`. Nothing here does I/O.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::protocol::HEADER_LEN;

/// Fixed-size request header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestHeader {
    /// Byte offset into the served file to start streaming from
    pub offset: u64,
    /// Number of filename bytes following the header (no terminator)
    pub filename_len: u32,
}

impl RequestHeader {
    /// A zero-length filename means "no request"; the daemon just hangs up.
    pub fn is_empty(&self) -> bool {
        self.filename_len == 0
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..8].copy_from_slice(&self.offset.to_be_bytes());
        header[8..12].copy_from_slice(&self.filename_len.to_be_bytes());
        header
    }
}

/// Build a complete request: header followed by the filename bytes.
pub fn encode_request(offset: u64, filename: &[u8]) -> Result<Vec<u8>> {
    let filename_len = match u32::try_from(filename.len()) {
        Ok(n) => n,
        Err(_) => bail!("filename too long: {} bytes", filename.len()),
    };
    let header = RequestHeader {
        offset,
        filename_len,
    };
    let mut buf = Vec::with_capacity(HEADER_LEN + filename.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(filename);
    Ok(buf)
}

/// Parse a request header. The caller has already received exactly
/// `HEADER_LEN` bytes.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> RequestHeader {
    let offset = u64::from_be_bytes([
        header[0], header[1], header[2], header[3], header[4], header[5], header[6], header[7],
    ]);
    let filename_len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    RequestHeader {
        offset,
        filename_len,
    }
}

/// Turn received filename bytes into a path, verbatim.
#[cfg(unix)]
pub fn filename_to_path(raw: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(raw))
}

#[cfg(not(unix))]
pub fn filename_to_path(raw: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(raw).into_owned())
}
