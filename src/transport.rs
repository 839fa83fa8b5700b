//! Transmit/receive primitives over a byte stream
//!
//! `transmit` never loses bytes silently: it either hands the whole buffer to
//! the stream or fails. `receive` does a single read and reports whatever
//! arrived; short counts are normal and callers loop.

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// Write the whole buffer. Partial writes are retried until done or an error
/// occurs. Returns the number of bytes sent, which is always `buf.len()`.
pub async fn transmit<W>(stream: &mut W, buf: &[u8]) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    stream
        .write_all(buf)
        .await
        .with_context(|| format!("transmit {} bytes", buf.len()))?;
    Ok(buf.len())
}

/// One read. `Ok(0)` means the peer shut down its side.
pub async fn receive<R>(stream: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let n = stream.read(buf).await.context("receive")?;
    Ok(n)
}

/// Fill `buf` completely; EOF first is an error.
pub async fn receive_exact<R>(stream: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    stream
        .read_exact(buf)
        .await
        .with_context(|| format!("receive {} bytes", buf.len()))?;
    Ok(())
}

/// `receive_exact`, bounded by `limit` when one is given.
pub async fn receive_exact_timed<R>(
    stream: &mut R,
    buf: &mut [u8],
    limit: Option<Duration>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    match limit {
        None => receive_exact(stream, buf).await,
        Some(d) => match timeout(d, receive_exact(stream, buf)).await {
            Ok(res) => res,
            Err(_) => anyhow::bail!("receive timeout ({} ms)", d.as_millis()),
        },
    }
}

// Socket tuning: disable Nagle
pub fn tune_stream(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
}
