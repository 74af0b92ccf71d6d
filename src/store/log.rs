//! Append-only activity log.
//!
//! Entry layout (little endian):
//!
//! ```text
//! magic "ACT\0" | version u8 | id u64 | body_len u32 | body (MessagePack) | crc32(body) u32
//! ```

use crate::error::{FeedError, Result};
use crate::types::{now_millis, Activity, ActivityId, ActivityInput};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for log entries.
const ENTRY_MAGIC: &[u8; 4] = b"ACT\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Entry header size: magic + version + id + body length.
const ENTRY_HEADER_SIZE: u64 = 4 + 1 + 8 + 4;

/// Trailing checksum size.
const ENTRY_CHECKSUM_SIZE: u64 = 4;

/// Mutable log state, guarded together so offsets always match the file.
struct LogState {
    file: File,
    /// Current end of valid data.
    size: u64,
    /// Next id to assign.
    next_id: u64,
    /// Writes since the last fsync.
    writes_since_sync: u64,
}

/// Append-only activity log.
pub struct ActivityLog {
    path: PathBuf,
    state: Mutex<LogState>,
    /// Sync every N writes.
    sync_interval: u64,
}

impl ActivityLog {
    /// Default sync interval. Every write is synced unless configured otherwise.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 1;

    /// Open or create a log with the default sync interval.
    ///
    /// Returns the log and every entry found in it, oldest first.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<(u64, Activity)>)> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a log, syncing every `sync_interval` writes (0 means every write).
    ///
    /// A partially written trailing entry (a crash mid-append) is truncated.
    /// A checksum failure anywhere else is reported as corruption.
    pub fn open_with_sync_interval(
        path: impl AsRef<Path>,
        sync_interval: u64,
    ) -> Result<(Self, Vec<(u64, Activity)>)> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let (entries, valid_size) = Self::scan_entries(&mut file, file_size)?;

        if valid_size < file_size {
            tracing::warn!(
                path = %path.display(),
                valid_size,
                file_size,
                "truncating torn entry at end of activity log"
            );
            file.set_len(valid_size)?;
            file.sync_all()?;
        }

        let next_id = entries
            .last()
            .map(|(_, activity)| activity.id.0 + 1)
            .unwrap_or(1);

        let log = Self {
            path,
            state: Mutex::new(LogState {
                file,
                size: valid_size,
                next_id,
                writes_since_sync: 0,
            }),
            sync_interval: sync_interval.max(1),
        };

        Ok((log, entries))
    }

    /// Append an activity, assigning the next id and the creation time.
    ///
    /// Returns the stored activity and the offset it was written at.
    pub fn append(&self, input: ActivityInput) -> Result<(Activity, u64)> {
        let mut state = self.state.lock();

        let activity = Activity::from_input(ActivityId(state.next_id), input, now_millis());
        let body = rmp_serde::to_vec_named(&activity)?;
        let body_len = u32::try_from(body.len())
            .map_err(|_| FeedError::Serialization("activity exceeds 4 GiB".into()))?;

        let mut entry = Vec::with_capacity(body.len() + 21);
        entry.extend_from_slice(ENTRY_MAGIC);
        entry.push(LOG_VERSION);
        entry.extend_from_slice(&activity.id.0.to_le_bytes());
        entry.extend_from_slice(&body_len.to_le_bytes());
        entry.extend_from_slice(&body);
        entry.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());

        let offset = state.size;
        state.file.seek(SeekFrom::Start(offset))?;
        if let Err(e) = state.file.write_all(&entry) {
            // Drop whatever made it to disk so the next append starts clean.
            let _ = state.file.set_len(offset);
            return Err(e.into());
        }

        state.writes_since_sync += 1;
        if state.writes_since_sync >= self.sync_interval {
            state.file.sync_data()?;
            state.writes_since_sync = 0;
        }

        state.size = offset + entry.len() as u64;
        state.next_id += 1;

        Ok((activity, offset))
    }

    /// Read the activity stored at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<Activity> {
        let mut state = self.state.lock();
        state.file.seek(SeekFrom::Start(offset))?;
        Self::read_entry(&mut state.file).map(|(activity, _)| activity)
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.file.sync_all()?;
        state.writes_since_sync = 0;
        Ok(())
    }

    /// Size of the valid portion of the log.
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one entry at the current position. Returns the activity and the
    /// entry's total length.
    fn read_entry(file: &mut File) -> Result<(Activity, u64)> {
        let mut header = [0u8; ENTRY_HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != ENTRY_MAGIC {
            return Err(FeedError::InvalidFormat("Invalid entry magic".into()));
        }
        if header[4] != LOG_VERSION {
            return Err(FeedError::InvalidFormat(format!(
                "Unsupported log version: {}",
                header[4]
            )));
        }

        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&header[5..13]);
        let id = u64::from_le_bytes(id_bytes);

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[13..17]);
        let body_len = u32::from_le_bytes(len_bytes);

        // A length running past the end of the file is a torn entry.
        let remaining = file
            .metadata()?
            .len()
            .saturating_sub(file.stream_position()?);
        if body_len as u64 + ENTRY_CHECKSUM_SIZE > remaining {
            return Err(FeedError::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("entry {} claims {} body bytes, {} left", id, body_len, remaining),
            )));
        }

        let mut body = vec![0u8; body_len as usize];
        file.read_exact(&mut body)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&body);
        if stored != computed {
            return Err(FeedError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        let activity: Activity = rmp_serde::from_slice(&body)?;
        if activity.id.0 != id {
            return Err(FeedError::Corruption(format!(
                "entry header id {} does not match body id {}",
                id, activity.id
            )));
        }

        let len = ENTRY_HEADER_SIZE + body_len as u64 + ENTRY_CHECKSUM_SIZE;
        Ok((activity, len))
    }

    /// Walk the whole file. Stops at the first incomplete entry and returns
    /// the offset where valid data ends.
    fn scan_entries(file: &mut File, file_size: u64) -> Result<(Vec<(u64, Activity)>, u64)> {
        file.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        let mut offset = 0u64;
        let mut last_id = 0u64;

        while offset < file_size {
            match Self::read_entry(file) {
                Ok((activity, len)) => {
                    if activity.id.0 <= last_id {
                        return Err(FeedError::Corruption(format!(
                            "non-increasing id {} after {} at offset {}",
                            activity.id, last_id, offset
                        )));
                    }
                    last_id = activity.id.0;
                    entries.push((offset, activity));
                    offset += len;
                }
                Err(FeedError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }

        Ok((entries, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityKind;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let (log, entries) = ActivityLog::open(dir.path().join("activities.log")).unwrap();
        assert!(entries.is_empty());

        let input = ActivityInput::new(ActivityKind::MarketplacePost)
            .with_payload(json!({"title": "Lamp", "price": 12, "currency": "USD"}));
        let (activity, offset) = log.append(input).unwrap();

        assert_eq!(activity.id, ActivityId(1));
        assert_eq!(offset, 0);

        let read = log.read_at(offset).unwrap();
        assert_eq!(read, activity);
        assert_eq!(read.payload.unwrap()["title"], "Lamp");
    }

    #[test]
    fn test_ids_continue_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activities.log");

        {
            let (log, _) = ActivityLog::open(&path).unwrap();
            for _ in 0..5 {
                log.append(ActivityInput::new(ActivityKind::BetPlaced)).unwrap();
            }
        }

        let (log, entries) = ActivityLog::open(&path).unwrap();
        assert_eq!(entries.len(), 5);
        let ids: Vec<u64> = entries.iter().map(|(_, a)| a.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let (activity, _) = log.append(ActivityInput::new(ActivityKind::BetPlaced)).unwrap();
        assert_eq!(activity.id, ActivityId(6));
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activities.log");

        let full_size = {
            let (log, _) = ActivityLog::open(&path).unwrap();
            log.append(ActivityInput::new(ActivityKind::GameStarted)).unwrap();
            log.append(ActivityInput::new(ActivityKind::GameStarted)).unwrap();
            log.size()
        };

        // Simulate a crash halfway through a third append.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"ACT\0\x01\x03\x00\x00").unwrap();
        }

        let (log, entries) = ActivityLog::open(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(log.size(), full_size);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), full_size);

        let (activity, offset) = log.append(ActivityInput::new(ActivityKind::GameStarted)).unwrap();
        assert_eq!(activity.id, ActivityId(3));
        assert_eq!(offset, full_size);
    }

    #[test]
    fn test_oversized_length_is_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activities.log");

        let full_size = {
            let (log, _) = ActivityLog::open(&path).unwrap();
            log.append(ActivityInput::new(ActivityKind::WalletCreated)).unwrap();
            log.size()
        };

        // Complete header whose body length claims 4 GiB.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(ENTRY_MAGIC).unwrap();
            file.write_all(&[LOG_VERSION]).unwrap();
            file.write_all(&2u64.to_le_bytes()).unwrap();
            file.write_all(&u32::MAX.to_le_bytes()).unwrap();
            file.write_all(b"short").unwrap();
        }

        let (log, entries) = ActivityLog::open(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(log.size(), full_size);

        let (activity, _) = log.append(ActivityInput::new(ActivityKind::WalletCreated)).unwrap();
        assert_eq!(activity.id, ActivityId(2));
    }

    #[test]
    fn test_corrupted_body_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activities.log");

        {
            let (log, _) = ActivityLog::open(&path).unwrap();
            log.append(ActivityInput::new(ActivityKind::OtcPurchase)).unwrap();
            log.append(ActivityInput::new(ActivityKind::OtcPurchase)).unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[ENTRY_HEADER_SIZE as usize + 2] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let result = ActivityLog::open(&path);
        assert!(matches!(result, Err(FeedError::ChecksumMismatch { .. })));
    }
}
