use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use std::fs::{OpenOptions, File};
use std::io::{BufReader, BufWriter, Write, BufRead};
use anyhow::{Result, Context};
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::logger::{Logger, Transfer};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub transfer_id: Uuid,
    pub peer: String,
    pub filename: String,
    pub offset: u64,
    pub status: TransferStatus,
    pub bytes_transferred: u64,
    pub error: Option<String>,
}

impl TransferLogEntry {
    fn for_transfer(t: &Transfer, status: TransferStatus, bytes: u64, error: Option<&str>) -> Self {
        TransferLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            transfer_id: t.id,
            peer: t.peer.to_string(),
            filename: t.filename.clone(),
            offset: t.offset,
            status,
            bytes_transferred: bytes,
            error: error.map(str::to_string),
        }
    }
}

/// JSON-lines journal of served transfers, one entry per state change
pub struct TransferLog {
    log_file_path: PathBuf,
    // Serializes appends from concurrent connections
    write_lock: Mutex<()>,
}

impl TransferLog {
    pub fn new(path: &Path) -> Self {
        TransferLog {
            log_file_path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn add_entry(&self, entry: TransferLogEntry) -> Result<()> {
        let _guard = self.write_lock.lock();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open transfer log file")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<TransferLogEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open transfer log file for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TransferLogEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn record(&self, entry: TransferLogEntry) {
        if let Err(e) = self.add_entry(entry) {
            eprintln!("transfer log {}: {:#}", self.log_file_path.display(), e);
        }
    }
}

impl Logger for TransferLog {
    fn started(&self, t: &Transfer) {
        self.record(TransferLogEntry::for_transfer(t, TransferStatus::InProgress, 0, None));
    }
    fn finished(&self, t: &Transfer, bytes: u64) {
        self.record(TransferLogEntry::for_transfer(t, TransferStatus::Completed, bytes, None));
    }
    fn failed(&self, t: &Transfer, bytes: u64, msg: &str) {
        self.record(TransferLogEntry::for_transfer(t, TransferStatus::Failed, bytes, Some(msg)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_records_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let log = TransferLog::new(&dir.path().join("transfers.jsonl"));
        assert!(log.read_log().unwrap().is_empty());

        let t = Transfer::new("127.0.0.1:5000".parse().unwrap(), "a.bin".into(), 7);
        log.started(&t);
        log.finished(&t, 1234);
        let missing = Transfer::new("127.0.0.1:5001".parse().unwrap(), "nope".into(), 0);
        log.failed(&missing, 0, "No such file or directory");

        let entries = log.read_log().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].status, TransferStatus::InProgress);
        assert_eq!(entries[0].offset, 7);
        assert_eq!(entries[1].status, TransferStatus::Completed);
        assert_eq!(entries[1].bytes_transferred, 1234);
        assert_eq!(entries[0].transfer_id, entries[1].transfer_id);
        assert_eq!(entries[2].status, TransferStatus::Failed);
        assert_eq!(entries[2].filename, "nope");
        assert!(entries[2].error.as_deref().unwrap().contains("No such file"));
        assert_ne!(entries[2].transfer_id, entries[0].transfer_id);
    }
}
