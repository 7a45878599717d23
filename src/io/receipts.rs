//! Receipt log - writes confirmed purchases to file
//!
//! Receipts are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::receipt::Receipt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Append-only writer for the receipt log
pub struct ReceiptLog {
    path: PathBuf,
    site_id: String,
}

impl ReceiptLog {
    pub fn new(file_path: &str, site_id: &str) -> Self {
        info!(file_path = %file_path, "receipt_log_initialized");
        Self { path: PathBuf::from(file_path), site_id: site_id.to_string() }
    }

    /// Write a receipt to the log
    /// Returns true if successful, false otherwise
    pub fn write_receipt(&self, receipt: &Receipt) -> bool {
        let line = receipt.to_json_with_site(Some(&self.site_id));

        if let Err(e) = self.append_line(&line) {
            error!(rid = %receipt.rid, error = %e, "receipt_write_failed");
            return false;
        }

        info!(
            rid = %receipt.rid,
            door = %receipt.door,
            method = %receipt.method.as_str(),
            "receipt_written"
        );
        true
    }

    /// Append a line to the log file, creating parent directories on first use
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                fs::create_dir_all(parent)?;
            }
            _ => {}
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.path.display(), bytes = %line.len(), "receipt_appended");
        Ok(())
    }
}
