//! Async (Tokio) transport for the SFS daemon and client.
//!
//! One TCP connection carries exactly one request and one file. The daemon
//! spawns a task per accepted connection; the client is a single sequential
//! session.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::file_stream::TransferStats;
use crate::protocol::{CONNECTION_BACKLOG, DEFAULT_CHUNK_SIZE, DEFAULT_DIR, DEFAULT_PORT};

pub mod server {
    use super::*;
    use crate::file_stream::send_file;
    use crate::logger::{Logger, Transfer};
    use crate::protocol::{HEADER_LEN, MAX_FILENAME_LEN, TCP_SND_BUFFER_SIZE};
    use crate::protocol_core::{decode_header, filename_to_path};
    use crate::transport::{receive_exact_timed, tune_stream};
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::path::Path;
    use std::sync::Arc;
    use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpSocket};
    use tokio::sync::Semaphore;
    use tokio::time::Duration;

    #[derive(Clone, Debug)]
    pub struct ServerConfig {
        pub bind: SocketAddr,
        /// Requested filenames are resolved against this directory
        pub root: PathBuf,
        pub chunk_size: usize,
        pub backlog: u32,
        /// `None` serves every accepted connection at once
        pub max_connections: Option<usize>,
        /// Limit on receiving the header and filename; streaming is never timed
        pub request_timeout: Option<Duration>,
        pub send_buffer: Option<u32>,
    }

    impl Default for ServerConfig {
        fn default() -> Self {
            ServerConfig {
                bind: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
                root: PathBuf::from(DEFAULT_DIR),
                chunk_size: DEFAULT_CHUNK_SIZE,
                backlog: CONNECTION_BACKLOG,
                max_connections: None,
                request_timeout: None,
                send_buffer: Some(TCP_SND_BUFFER_SIZE),
            }
        }
    }

    /// How a connection ended
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Outcome {
        /// Header carried a zero-length filename
        NoRequest,
        Served(TransferStats),
        /// Open or stream failure, already logged against the transfer
        Failed { bytes: u64, error: String },
    }

    pub struct Server {
        listener: TcpListener,
        config: Arc<ServerConfig>,
        logger: Arc<dyn Logger>,
        permits: Option<Arc<Semaphore>>,
    }

    impl Server {
        pub async fn bind(config: ServerConfig, logger: Arc<dyn Logger>) -> Result<Server> {
            anyhow::ensure!(config.chunk_size > 0, "chunk size must be non-zero");
            anyhow::ensure!(
                config.max_connections != Some(0),
                "max connections must be non-zero"
            );
            let socket = if config.bind.is_ipv4() {
                TcpSocket::new_v4()
            } else {
                TcpSocket::new_v6()
            }
            .context("cannot create socket")?;
            #[cfg(unix)]
            socket
                .set_reuseaddr(true)
                .context("cannot set SO_REUSEADDR")?;
            // Accepted sockets inherit the listener's send buffer
            if let Some(sz) = config.send_buffer {
                socket
                    .set_send_buffer_size(sz)
                    .context("cannot set socket option")?;
            }
            socket
                .bind(config.bind)
                .with_context(|| format!("cannot bind socket to {}", config.bind))?;
            let listener = socket
                .listen(config.backlog)
                .with_context(|| format!("cannot listen on {}", config.bind))?;

            let permits = config.max_connections.map(|n| Arc::new(Semaphore::new(n)));
            Ok(Server {
                listener,
                config: Arc::new(config),
                logger,
                permits,
            })
        }

        pub fn local_addr(&self) -> Result<SocketAddr> {
            self.listener.local_addr().context("listener address")
        }

        /// Accept forever. Connection failures are logged and never end the loop.
        pub async fn run(self) -> Result<()> {
            let addr = self.local_addr()?;
            self.logger.listening(addr, &self.config.root);
            loop {
                // With admission control the permit is taken before accept, so a
                // full server leaves new connections queued in the backlog.
                let permit = match &self.permits {
                    Some(sem) => Some(
                        Arc::clone(sem)
                            .acquire_owned()
                            .await
                            .context("connection semaphore closed")?,
                    ),
                    None => None,
                };
                let (mut stream, peer) = match self.listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        self.logger.connection_error(None, &format!("accept: {}", e));
                        // Back off so fd exhaustion does not spin the loop
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                };
                tune_stream(&stream);

                let config = Arc::clone(&self.config);
                let logger = Arc::clone(&self.logger);
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handle_connection(&mut stream, peer, &config, logger.as_ref()).await
                    {
                        logger.connection_error(Some(peer), &format!("{:#}", e));
                    }
                    let _ = stream.shutdown().await;
                });
            }
        }
    }

    pub async fn serve(config: ServerConfig, logger: Arc<dyn Logger>) -> Result<()> {
        Server::bind(config, logger).await?.run().await
    }

    /// Serve one request on an accepted connection.
    ///
    /// Errors before the filename is known come back as `Err`; anything after
    /// is logged against the transfer and reported as `Outcome::Failed`.
    pub async fn handle_connection<S>(
        stream: &mut S,
        peer: SocketAddr,
        config: &ServerConfig,
        logger: &dyn Logger,
    ) -> Result<Outcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut hdr = [0u8; HEADER_LEN];
        receive_exact_timed(stream, &mut hdr, config.request_timeout)
            .await
            .context("can't receive request header")?;
        let header = decode_header(&hdr);
        if header.is_empty() {
            return Ok(Outcome::NoRequest);
        }

        let len = header.filename_len as usize;
        if len > MAX_FILENAME_LEN {
            anyhow::bail!("filename length {} exceeds {} bytes", len, MAX_FILENAME_LEN);
        }
        let mut raw = vec![0u8; len];
        receive_exact_timed(stream, &mut raw, config.request_timeout)
            .await
            .context("can't receive filename")?;

        let transfer = Transfer::new(
            peer,
            String::from_utf8_lossy(&raw).into_owned(),
            header.offset,
        );
        logger.started(&transfer);

        let path = config.root.join(filename_to_path(&raw));
        let mut sent = 0u64;
        let result = stream_file(stream, &path, header.offset, config.chunk_size, |n| {
            sent += n as u64
        })
        .await;
        match result {
            Ok(stats) => {
                logger.finished(&transfer, stats.bytes);
                Ok(Outcome::Served(stats))
            }
            Err(e) => {
                let error = format!("{:#}", e);
                logger.failed(&transfer, sent, &error);
                Ok(Outcome::Failed { bytes: sent, error })
            }
        }
    }

    async fn stream_file<S>(
        stream: &mut S,
        path: &Path,
        offset: u64,
        chunk_size: usize,
        on_chunk: impl FnMut(usize),
    ) -> Result<TransferStats>
    where
        S: AsyncWrite + Unpin,
    {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("can't open file {}", path.display()))?;
        send_file(&mut file, stream, offset, chunk_size, on_chunk).await
    }
}

pub mod client {
    use super::*;
    use crate::file_stream::receive_file;
    use crate::progress::TransferProgress;
    use crate::protocol::{DEFAULT_HOST, TCP_RCV_BUFFER_SIZE};
    use crate::protocol_core::encode_request;
    use crate::transport::{transmit, tune_stream};
    use std::io::SeekFrom;
    use std::path::Path;
    use tokio::fs::{File, OpenOptions};
    use tokio::io::AsyncSeekExt;
    use tokio::net::{lookup_host, TcpSocket, TcpStream};

    #[derive(Clone, Debug)]
    pub struct ClientConfig {
        pub host: String,
        pub port: u16,
        /// Name requested from the daemon, relative to its serving root
        pub filename: String,
        /// Local destination; defaults to `filename`
        pub output: Option<PathBuf>,
        /// Append to an existing partial download
        pub resume: bool,
        pub chunk_size: usize,
        pub recv_buffer: Option<u32>,
        pub progress: bool,
    }

    impl ClientConfig {
        pub fn new(filename: impl Into<String>) -> Self {
            ClientConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                filename: filename.into(),
                output: None,
                resume: false,
                chunk_size: DEFAULT_CHUNK_SIZE,
                recv_buffer: Some(TCP_RCV_BUFFER_SIZE),
                progress: false,
            }
        }

        pub fn local_path(&self) -> PathBuf {
            self.output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&self.filename))
        }
    }

    #[derive(Debug)]
    pub struct FetchSummary {
        pub local_path: PathBuf,
        /// Offset requested from the daemon (local size before the fetch)
        pub offset: u64,
        pub stats: TransferStats,
    }

    impl FetchSummary {
        pub fn local_size(&self) -> u64 {
            self.offset + self.stats.bytes
        }
    }

    /// Open the local target. When resuming, its current length is the
    /// request offset and writes continue from the end; otherwise it is
    /// truncated and the offset is 0.
    pub async fn resolve_resume(path: &Path, resume: bool) -> Result<(File, u64)> {
        if !resume {
            let f = File::create(path)
                .await
                .with_context(|| format!("can't create file {}", path.display()))?;
            return Ok((f, 0));
        }
        let mut f = OpenOptions::new()
            .write(true)
            .create(true)
            .open(path)
            .await
            .with_context(|| format!("can't open file {}", path.display()))?;
        let size = f
            .metadata()
            .await
            .with_context(|| format!("can't stat file {}", path.display()))?
            .len();
        f.seek(SeekFrom::Start(size)).await?;
        Ok((f, size))
    }

    /// Connect to the first address of `host` that accepts.
    pub async fn connect(host: &str, port: u16, recv_buffer: Option<u32>) -> Result<TcpStream> {
        let addrs = lookup_host((host, port))
            .await
            .with_context(|| format!("unknown host {}", host))?;
        let mut last_err = None;
        for addr in addrs {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()
            } else {
                TcpSocket::new_v6()
            }
            .context("can't create socket")?;
            if let Some(sz) = recv_buffer {
                socket
                    .set_recv_buffer_size(sz)
                    .context("can't set socket option")?;
            }
            match socket.connect(addr).await {
                Ok(stream) => {
                    tune_stream(&stream);
                    return Ok(stream);
                }
                Err(e) => last_err = Some(anyhow::Error::new(e).context(format!("connect {}", addr))),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("unknown host {}", host)))
            .with_context(|| format!("can't connect to host {}", host))
    }

    /// Fetch one file: open the local target, send the request, write
    /// whatever the daemon streams back until it closes.
    pub async fn fetch(config: &ClientConfig) -> Result<FetchSummary> {
        anyhow::ensure!(!config.filename.is_empty(), "missing filename");
        anyhow::ensure!(config.chunk_size > 0, "chunk size must be non-zero");

        let local_path = config.local_path();
        let (mut file, offset) = resolve_resume(&local_path, config.resume).await?;

        let mut stream = connect(&config.host, config.port, config.recv_buffer).await?;
        let request = encode_request(offset, config.filename.as_bytes())?;
        transmit(&mut stream, &request)
            .await
            .context("can't send request")?;

        let progress = TransferProgress::new(config.progress, &config.filename, offset);
        let result = receive_file(&mut stream, &mut file, config.chunk_size, |n| {
            progress.advance(n)
        })
        .await;
        progress.finish();
        let stats =
            result.with_context(|| format!("can't write to file {}", local_path.display()))?;

        Ok(FetchSummary {
            local_path,
            offset,
            stats,
        })
    }
}
