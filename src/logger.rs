//! Serialized server log sinks: console/file text lines and a fan-out

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Stdout, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// One request being served, as seen by the logs
#[derive(Clone, Debug)]
pub struct Transfer {
    pub id: Uuid,
    pub peer: SocketAddr,
    pub filename: String,
    pub offset: u64,
}

impl Transfer {
    pub fn new(peer: SocketAddr, filename: String, offset: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            filename,
            offset,
        }
    }
}

pub trait Logger: Send + Sync {
    fn listening(&self, _addr: SocketAddr, _root: &Path) {}
    fn started(&self, _t: &Transfer) {}
    fn finished(&self, _t: &Transfer, _bytes: u64) {}
    fn failed(&self, _t: &Transfer, _bytes: u64, _msg: &str) {}
    /// Errors before a filename is known (bad header, accept failure)
    fn connection_error(&self, _peer: Option<SocketAddr>, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Line-oriented log. Every line goes through one lock so concurrent
/// connections never interleave within a line.
pub struct TextLogger<W: Write + Send> {
    out: Mutex<W>,
}

impl TextLogger<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl TextLogger<File> {
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(f))
    }
}

impl<W: Write + Send> TextLogger<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn line(&self, s: &str) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "[{}] {}", Utc::now().to_rfc3339(), s);
        let _ = out.flush();
    }
}

impl<W: Write + Send> Logger for TextLogger<W> {
    fn listening(&self, addr: SocketAddr, root: &Path) {
        self.line(&format!(
            "listening on port {} and serving files from {}",
            addr.port(),
            root.display()
        ));
    }
    fn started(&self, t: &Transfer) {
        if t.offset > 0 {
            self.line(&format!(
                "{}: {} - download started (offset {})",
                t.peer.ip(),
                t.filename,
                t.offset
            ));
        } else {
            self.line(&format!("{}: {} - download started", t.peer.ip(), t.filename));
        }
    }
    fn finished(&self, t: &Transfer, bytes: u64) {
        self.line(&format!(
            "{}: {} - download finished ({} bytes)",
            t.peer.ip(),
            t.filename,
            bytes
        ));
    }
    fn failed(&self, t: &Transfer, bytes: u64, msg: &str) {
        self.line(&format!(
            "{}: {} - error after {} bytes: {}",
            t.peer.ip(),
            t.filename,
            bytes,
            msg
        ));
    }
    fn connection_error(&self, peer: Option<SocketAddr>, msg: &str) {
        match peer {
            Some(p) => self.line(&format!("{}: error: {}", p.ip(), msg)),
            None => self.line(&format!("error: {}", msg)),
        }
    }
}

/// Fan a log event out to several sinks
#[derive(Default)]
pub struct MultiLogger {
    sinks: Vec<Arc<dyn Logger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn Logger>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Logger for MultiLogger {
    fn listening(&self, addr: SocketAddr, root: &Path) {
        self.sinks.iter().for_each(|s| s.listening(addr, root));
    }
    fn started(&self, t: &Transfer) {
        self.sinks.iter().for_each(|s| s.started(t));
    }
    fn finished(&self, t: &Transfer, bytes: u64) {
        self.sinks.iter().for_each(|s| s.finished(t, bytes));
    }
    fn failed(&self, t: &Transfer, bytes: u64, msg: &str) {
        self.sinks.iter().for_each(|s| s.failed(t, bytes, msg));
    }
    fn connection_error(&self, peer: Option<SocketAddr>, msg: &str) {
        self.sinks.iter().for_each(|s| s.connection_error(peer, msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(name: &str, offset: u64) -> Transfer {
        Transfer::new("10.1.2.3:40000".parse().unwrap(), name.to_string(), offset)
    }

    fn lines(logger: TextLogger<Vec<u8>>) -> Vec<String> {
        String::from_utf8(logger.into_inner())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn text_logger_formats_transfer_lines() {
        let logger = TextLogger::new(Vec::new());
        let t = transfer("report.bin", 0);
        logger.started(&t);
        logger.finished(&t, 5_242_880);
        logger.failed(&transfer("gone.bin", 10), 0, "can't open file");

        let lines = lines(logger);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("10.1.2.3: report.bin - download started"));
        assert!(lines[1].ends_with("10.1.2.3: report.bin - download finished (5242880 bytes)"));
        assert!(lines[2].ends_with("10.1.2.3: gone.bin - error after 0 bytes: can't open file"));
    }

    #[test]
    fn text_logger_mentions_resume_offset() {
        let logger = TextLogger::new(Vec::new());
        logger.started(&transfer("big.iso", 1024));
        let lines = lines(logger);
        assert!(lines[0].ends_with("big.iso - download started (offset 1024)"));
    }

    #[test]
    fn text_logger_formats_connection_errors() {
        let logger = TextLogger::new(Vec::new());
        logger.connection_error(Some("10.1.2.3:40000".parse().unwrap()), "early eof");
        logger.connection_error(None, "accept failed");
        let lines = lines(logger);
        assert!(lines[0].ends_with("10.1.2.3: error: early eof"));
        assert!(lines[1].ends_with("] error: accept failed"));
    }

    #[test]
    fn concurrent_lines_do_not_interleave() {
        let logger = Arc::new(TextLogger::new(Vec::new()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let logger = Arc::clone(&logger);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        logger.finished(&transfer(&format!("file-{}.bin", i), 0), 42);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let logger = Arc::try_unwrap(logger).ok().unwrap();
        let lines = lines(logger);
        assert_eq!(lines.len(), 8 * 200);
        for l in lines {
            assert!(l.ends_with("- download finished (42 bytes)"), "garbled: {}", l);
        }
    }

    #[test]
    fn file_logger_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("sfsd.log");
        let t = transfer("a.bin", 0);
        TextLogger::file(&path).unwrap().started(&t);
        TextLogger::file(&path).unwrap().finished(&t, 3);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("10.1.2.3: a.bin - download started"));
        assert!(lines[1].ends_with("10.1.2.3: a.bin - download finished (3 bytes)"));
    }

    #[test]
    fn multi_logger_fans_out() {
        struct Counter(Mutex<u32>);
        impl Logger for Counter {
            fn started(&self, _t: &Transfer) {
                *self.0.lock() += 1;
            }
        }
        let a = Arc::new(Counter(Mutex::new(0)));
        let b = Arc::new(Counter(Mutex::new(0)));
        let mut multi = MultiLogger::new();
        multi.push(a.clone());
        multi.push(b.clone());
        multi.started(&transfer("x", 0));
        assert_eq!(*a.0.lock(), 1);
        assert_eq!(*b.0.lock(), 1);
    }
}
