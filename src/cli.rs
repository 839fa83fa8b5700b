//! Command-line options for `sfsd` and `sfs`

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::net_async::client::ClientConfig;
use crate::net_async::server::ServerConfig;
use crate::protocol::{
    CONNECTION_BACKLOG, DEFAULT_CHUNK_SIZE, DEFAULT_DIR, DEFAULT_HOST, DEFAULT_PORT,
    TCP_RCV_BUFFER_SIZE, TCP_SND_BUFFER_SIZE,
};

/// Serve files from one directory over plain TCP
#[derive(Clone, Debug, Parser)]
#[command(name = "sfsd", version)]
pub struct ServerOpts {
    /// TCP port to listen on
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Directory to serve files from
    #[arg(short = 'd', long = "dir", default_value = DEFAULT_DIR)]
    pub dir: PathBuf,

    /// Local address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    /// Pending connections queued by the kernel
    #[arg(long, default_value_t = CONNECTION_BACKLOG)]
    pub backlog: u32,

    /// Serve at most this many connections at once (default: unlimited)
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Drop clients that do not send a complete request in time
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,

    /// Bytes read from disk per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Append a JSON-lines transfer journal to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Append plain text log lines to this file
    #[arg(long)]
    pub text_log: Option<PathBuf>,

    /// No console log
    #[arg(short, long)]
    pub quiet: bool,
}

impl ServerOpts {
    /// Validate and resolve into a server configuration. The serving root
    /// must be an existing directory; it is canonicalized for logging.
    pub fn into_config(self) -> Result<ServerConfig> {
        if self.chunk_size == 0 {
            bail!("invalid chunk size: 0");
        }
        if self.max_connections == Some(0) {
            bail!("invalid max connections: 0");
        }
        if !self.dir.exists() {
            bail!("can't change to directory: {} (does not exist)", self.dir.display());
        }
        if !self.dir.is_dir() {
            bail!("can't change to directory: {} (not a directory)", self.dir.display());
        }
        let root = std::fs::canonicalize(&self.dir)
            .with_context(|| format!("Failed to canonicalize root path: {}", self.dir.display()))?;
        Ok(ServerConfig {
            bind: SocketAddr::new(self.bind_address, self.port),
            root,
            chunk_size: self.chunk_size,
            backlog: self.backlog,
            max_connections: self.max_connections,
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
            send_buffer: Some(TCP_SND_BUFFER_SIZE),
        })
    }
}

/// Download one file from an sfsd daemon
#[derive(Clone, Debug, Parser)]
#[command(name = "sfs", version, disable_help_flag = true)]
pub struct ClientOpts {
    /// Hostname to connect to
    #[arg(short = 'h', long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// TCP port to connect to
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// File to download
    #[arg(short = 'f', long = "file")]
    pub filename: String,

    /// Continue a partial download from the local file's current size
    #[arg(short = 'c', long = "continue")]
    pub resume: bool,

    /// Local path to write (default: same as the requested filename)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Bytes read from the socket per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Show a transfer spinner
    #[arg(long)]
    pub progress: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

impl ClientOpts {
    pub fn into_config(self) -> Result<ClientConfig> {
        if self.filename.is_empty() {
            bail!("missing filename");
        }
        if self.chunk_size == 0 {
            bail!("invalid chunk size: 0");
        }
        Ok(ClientConfig {
            host: self.host,
            port: self.port,
            filename: self.filename,
            output: self.output,
            resume: self.resume,
            chunk_size: self.chunk_size,
            recv_buffer: Some(TCP_RCV_BUFFER_SIZE),
            progress: self.progress,
        })
    }
}
