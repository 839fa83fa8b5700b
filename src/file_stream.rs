//! Chunked file streaming: file -> socket on the daemon, socket -> file on the client.
//!
//! There is no length prefix on the response. The daemon stops at end of file
//! and closes; the client stops at end of stream. Chunk sizes on the two ends
//! are independent.

use anyhow::{bail, Context, Result};
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use crate::transport::{receive, transmit};

/// Byte accounting for one transfer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes: u64,
    pub chunks: u64,
    /// The stream ended on an I/O error rather than an orderly shutdown.
    /// Only the receiving side sets this.
    pub interrupted: bool,
}

impl TransferStats {
    fn record(&mut self, n: usize) {
        self.bytes += n as u64;
        self.chunks += 1;
    }
}

/// Stream `file` to `sock` starting at `offset`, one chunk at a time, until
/// end of file. `on_chunk` sees the size of every chunk sent.
pub async fn send_file<F, S>(
    file: &mut F,
    sock: &mut S,
    offset: u64,
    chunk_size: usize,
    mut on_chunk: impl FnMut(usize),
) -> Result<TransferStats>
where
    F: AsyncRead + AsyncSeek + Unpin,
    S: AsyncWrite + Unpin,
{
    if chunk_size == 0 {
        bail!("chunk size must be non-zero");
    }
    if offset > 0 {
        file.seek(SeekFrom::Start(offset))
            .await
            .with_context(|| format!("seek to offset {}", offset))?;
    }

    let mut stats = TransferStats::default();
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = file.read(&mut buf).await.context("read file")?;
        if n == 0 {
            break;
        }
        transmit(sock, &buf[..n]).await?;
        stats.record(n);
        on_chunk(n);
    }
    sock.flush().await.context("flush socket")?;
    Ok(stats)
}

/// Copy everything arriving on `sock` into `file` at its current position.
///
/// An orderly shutdown and a dropped connection both end the loop; the latter
/// is flagged in the returned stats. Local write failures are errors.
pub async fn receive_file<S, F>(
    sock: &mut S,
    file: &mut F,
    chunk_size: usize,
    mut on_chunk: impl FnMut(usize),
) -> Result<TransferStats>
where
    S: AsyncRead + Unpin,
    F: AsyncWrite + Unpin,
{
    if chunk_size == 0 {
        bail!("chunk size must be non-zero");
    }

    let mut stats = TransferStats::default();
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = match receive(sock, &mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => {
                stats.interrupted = true;
                break;
            }
        };
        file.write_all(&buf[..n]).await.context("write local file")?;
        stats.record(n);
        on_chunk(n);
    }
    file.flush().await.context("flush local file")?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[tokio::test]
    async fn send_file_sizes_around_chunk_boundary() {
        let c = 1000;
        for n in [0usize, 1, c - 1, c, c + 1, 3 * c, 50 * c + 7] {
            let data = pattern(n);
            let mut src = Cursor::new(data.clone());
            let mut out: Vec<u8> = Vec::new();
            let stats = send_file(&mut src, &mut out, 0, c, |_| {}).await.unwrap();
            assert_eq!(stats.bytes, n as u64, "n={}", n);
            assert_eq!(stats.chunks, ((n + c - 1) / c) as u64, "n={}", n);
            assert_eq!(out, data, "n={}", n);
        }
    }

    #[tokio::test]
    async fn send_file_honors_offset() {
        let data = pattern(10_000);
        let mut src = Cursor::new(data.clone());
        let mut out: Vec<u8> = Vec::new();
        let stats = send_file(&mut src, &mut out, 4321, 512, |_| {}).await.unwrap();
        assert_eq!(stats.bytes, 10_000 - 4321);
        assert_eq!(out, &data[4321..]);
    }

    #[tokio::test]
    async fn send_file_offset_past_end_sends_nothing() {
        let mut src = Cursor::new(pattern(100));
        let mut out: Vec<u8> = Vec::new();
        let stats = send_file(&mut src, &mut out, 5000, 64, |_| {}).await.unwrap();
        assert_eq!(stats, TransferStats::default());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn send_file_reports_every_chunk() {
        // 5,242,880 bytes in 100,000 byte chunks: 52 full chunks and a 42,880 tail
        let data = vec![0xA5u8; 5_242_880];
        let mut src = Cursor::new(data);
        let mut sizes = Vec::new();
        let stats = send_file(&mut src, &mut tokio::io::sink(), 0, 100_000, |n| sizes.push(n))
            .await
            .unwrap();
        assert_eq!(stats.bytes, 5_242_880);
        assert_eq!(stats.chunks, 53);
        assert_eq!(sizes.iter().filter(|&&n| n == 100_000).count(), 52);
        assert_eq!(sizes.last(), Some(&42_880));
    }

    #[tokio::test]
    async fn receive_file_appends_at_current_position() {
        let mut sock = Cursor::new(b"world".to_vec());
        let mut file = Cursor::new(b"hello ".to_vec());
        file.set_position(6);
        let stats = receive_file(&mut sock, &mut file, 2, |_| {}).await.unwrap();
        assert_eq!(stats.bytes, 5);
        assert_eq!(stats.chunks, 3);
        assert!(!stats.interrupted);
        assert_eq!(file.into_inner(), b"hello world");
    }

    #[tokio::test]
    async fn receive_file_through_duplex_pipe() {
        let data = pattern(250_000);
        let expected = data.clone();
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        let sender = tokio::spawn(async move {
            let mut src = Cursor::new(data);
            send_file(&mut src, &mut tx, 0, 7_000, |_| {}).await.unwrap()
        });
        let mut out: Vec<u8> = Vec::new();
        let stats = receive_file(&mut rx, &mut out, 3_000, |_| {}).await.unwrap();
        let sent = sender.await.unwrap();
        assert_eq!(sent.bytes, 250_000);
        assert_eq!(stats.bytes, 250_000);
        assert_eq!(out, expected);
    }

    /// Yields "abc" `remaining` times, then fails like a reset connection
    struct ResetAfter {
        remaining: usize,
    }

    impl tokio::io::AsyncRead for ResetAfter {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.remaining == 0 {
                return std::task::Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            self.remaining -= 1;
            buf.put_slice(b"abc");
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn receive_file_flags_dropped_connection() {
        let mut sock = ResetAfter { remaining: 2 };
        let mut out: Vec<u8> = Vec::new();
        let mut seen = Vec::new();
        let stats = receive_file(&mut sock, &mut out, 16, |n| seen.push(n))
            .await
            .unwrap();
        assert!(stats.interrupted);
        assert_eq!(stats.bytes, 6);
        assert_eq!(stats.chunks, 2);
        assert_eq!(seen, vec![3, 3]);
        assert_eq!(out, b"abcabc");
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected() {
        let mut src = Cursor::new(pattern(10));
        let mut out: Vec<u8> = Vec::new();
        assert!(send_file(&mut src, &mut out, 0, 0, |_| {}).await.is_err());
        let mut sock = Cursor::new(pattern(10));
        assert!(receive_file(&mut sock, &mut out, 0, |_| {}).await.is_err());
    }
}
