//! Append-only, SHA-256 hash-chained log.
//!
//! [`Ledger`] is a generic, disk-backed append log: every [`LedgerEntry`] is hash-chained to the
//! one before it, so tampering with or dropping an earlier line is detectable via
//! [`Ledger::verify_integrity`]. Two callers in this workspace use it for very different data:
//!
//! - the router appends one entry per completed LLM call to build the tenant's immutable
//!   **usage record** trail (`kind = "usage"`);
//! - the workflow interpreter appends one entry after every task boundary to make execution
//!   progress **crash-safe** (`kind = "step"`) — on restart, the last entry for an execution id
//!   is the authoritative `current_task_order` to resume from.
//!
//! Entries are newline-delimited JSON (`.jsonl`), one [`LedgerEntry`] per line, opened per
//! `stream_id` (a tenant id or an execution id) so concurrent streams never interleave within a
//! single file.
//!
//! # Example
//!
//! ```rust,no_run
//! use conduit_ledger::Ledger;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), conduit_ledger::LedgerError> {
//! let mut ledger = Ledger::open(&PathBuf::from("ledgers"), "tenant-42")?;
//! ledger.append("usage", serde_json::json!({"total_tokens": 128}))?;
//! assert!(ledger.verify_integrity());
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

/// Errors raised while opening, appending to, or reading a [`Ledger`].
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The backing `.jsonl` file could not be read or written.
    #[error("ledger I/O error: {0}")]
    Io(#[from] io::Error),
    /// A line in the backing file was not valid JSON for [`LedgerEntry`].
    #[error("ledger entry deserialization failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A single hash-chained entry.
///
/// `hash` is the SHA-256 hex digest of `(index, timestamp, stream_id, kind, payload, prev_hash)`
/// serialized canonically; `prev_hash` is empty for the first entry in a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Zero-based position within this stream's log.
    pub index: u64,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Which logical stream this entry belongs to (tenant id or execution id).
    pub stream_id: String,
    /// Caller-defined classification, e.g. `"usage"` or `"step"`.
    pub kind: String,
    /// Free-form JSON payload.
    pub payload: serde_json::Value,
    /// SHA-256 hex digest of the previous entry in this stream (empty for the first).
    pub prev_hash: String,
    /// SHA-256 hex digest of this entry.
    pub hash: String,
}

impl LedgerEntry {
    fn compute_hash(
        index: u64,
        timestamp: &DateTime<Utc>,
        stream_id: &str,
        kind: &str,
        payload: &serde_json::Value,
        prev_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(index.to_le_bytes());
        hasher.update(timestamp.to_rfc3339().as_bytes());
        hasher.update(stream_id.as_bytes());
        hasher.update(kind.as_bytes());
        hasher.update(payload.to_string().as_bytes());
        hasher.update(prev_hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Append-only, SHA-256 hash-chained, disk-persisted log for one stream.
///
/// A `Ledger` keeps its full history in memory (`Vec<LedgerEntry>`) mirrored to a `.jsonl` file.
/// Appends are flushed to disk immediately so a process crash loses at most the in-flight
/// append, never a previously acknowledged one.
pub struct Ledger {
    stream_id: String,
    path: PathBuf,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Open (creating if absent) the ledger file for `stream_id` under `dir`.
    ///
    /// Existing entries are loaded into memory so [`Ledger::append`] can continue the hash chain.
    pub fn open(dir: &PathBuf, stream_id: &str) -> Result<Self, LedgerError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.jsonl", sanitize_stream_id(stream_id)));

        let entries = if path.exists() {
            let file = fs::File::open(&path)?;
            let reader = BufReader::new(file);
            let mut loaded = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                loaded.push(serde_json::from_str::<LedgerEntry>(&line)?);
            }
            loaded
        } else {
            Vec::new()
        };

        Ok(Self {
            stream_id: stream_id.to_string(),
            path,
            entries,
        })
    }

    /// Open a ledger that exists only in memory — useful for tests that don't need a temp
    /// directory, or for streams whose retention is handled entirely by an external store.
    pub fn in_memory(stream_id: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            path: PathBuf::new(),
            entries: Vec::new(),
        }
    }

    /// Append a new entry, persist it, and return a reference to it.
    pub fn append(
        &mut self,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<&LedgerEntry, LedgerError> {
        let index = self.entries.len() as u64;
        let timestamp = Utc::now();
        let prev_hash = self
            .entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_default();
        let hash = LedgerEntry::compute_hash(
            index,
            &timestamp,
            &self.stream_id,
            kind,
            &payload,
            &prev_hash,
        );

        let entry = LedgerEntry {
            index,
            timestamp,
            stream_id: self.stream_id.clone(),
            kind: kind.to_string(),
            payload,
            prev_hash,
            hash,
        };

        if !self.path.as_os_str().is_empty() {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            writeln!(file, "{}", serde_json::to_string(&entry)?)?;
            file.flush()?;
        }

        self.entries.push(entry);
        Ok(self.entries.last().expect("just pushed"))
    }

    /// All entries in append order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// The most recently appended entry, if any.
    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// Entries matching a given `kind`, in append order.
    pub fn entries_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a LedgerEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Recompute every entry's hash from its recorded fields and compare against the stored
    /// `hash`/`prev_hash`. Returns `false` on the first mismatch (tampering or corruption).
    pub fn verify_integrity(&self) -> bool {
        let mut expected_prev = String::new();
        for entry in &self.entries {
            if entry.prev_hash != expected_prev {
                return false;
            }
            let recomputed = LedgerEntry::compute_hash(
                entry.index,
                &entry.timestamp,
                &entry.stream_id,
                &entry.kind,
                &entry.payload,
                &entry.prev_hash,
            );
            if recomputed != entry.hash {
                return false;
            }
            expected_prev = entry.hash.clone();
        }
        true
    }
}

fn sanitize_stream_id(stream_id: &str) -> String {
    stream_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_chains_hashes() {
        let mut ledger = Ledger::in_memory("tenant-1");
        ledger.append("usage", serde_json::json!({"n": 1})).unwrap();
        ledger.append("usage", serde_json::json!({"n": 2})).unwrap();

        assert_eq!(ledger.entries().len(), 2);
        assert_eq!(ledger.entries()[0].prev_hash, "");
        assert_eq!(ledger.entries()[1].prev_hash, ledger.entries()[0].hash);
        assert!(ledger.verify_integrity());
    }

    #[test]
    fn tampering_breaks_integrity() {
        let mut ledger = Ledger::in_memory("tenant-1");
        ledger.append("usage", serde_json::json!({"n": 1})).unwrap();
        ledger.append("usage", serde_json::json!({"n": 2})).unwrap();

        ledger.entries[0].payload = serde_json::json!({"n": 999});
        assert!(!ledger.verify_integrity());
    }

    #[test]
    fn persists_and_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();

        {
            let mut ledger = Ledger::open(&dir_path, "exec-7").unwrap();
            ledger.append("step", serde_json::json!({"order": "1"})).unwrap();
            ledger.append("step", serde_json::json!({"order": "2"})).unwrap();
        }

        let reloaded = Ledger::open(&dir_path, "exec-7").unwrap();
        assert_eq!(reloaded.entries().len(), 2);
        assert!(reloaded.verify_integrity());
        assert_eq!(reloaded.last().unwrap().payload["order"], "2");
    }

    #[test]
    fn entries_of_kind_filters() {
        let mut ledger = Ledger::in_memory("exec-1");
        ledger.append("step", serde_json::json!({"order": "1"})).unwrap();
        ledger.append("usage", serde_json::json!({"n": 1})).unwrap();
        ledger.append("step", serde_json::json!({"order": "2"})).unwrap();

        let steps: Vec<_> = ledger.entries_of_kind("step").collect();
        assert_eq!(steps.len(), 2);
    }
}
