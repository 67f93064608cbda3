use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::Durability;
use crate::error::{StoreError, StoreResult};
use crate::tables::Mutation;

/// One committed transaction: every mutation it applied, in order.
///
/// On-disk frame:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub mutations: Vec<Mutation>,
}

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every transaction.
    #[default]
    EveryWrite,
    /// Rely on OS page-cache buffering. Survives a process crash, not a
    /// power loss.
    OsDefault,
}

/// Configuration for the journal.
#[derive(Clone, Debug, Default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct JournalWriter {
    file: File,
    offset: u64,
}

/// Append-only transaction journal.
///
/// Each transaction is written as a single frame in one `write_all` call.
/// On open the file is read front-to-back. An incomplete frame at the end
/// (a write torn by a crash) is cut off; a damaged frame anywhere before
/// the end is reported as [`StoreError::CorruptJournal`] and the journal
/// refuses to open.
///
/// The file is locked exclusively for as long as the `Journal` lives; a
/// second open fails with [`StoreError::JournalLocked`].
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    config: JournalConfig,
}

impl Journal {
    /// Open (or create) the journal at `path` and return every intact record
    /// together with the offset of its frame.
    pub fn open(
        path: &Path,
        config: JournalConfig,
    ) -> StoreResult<(Self, Vec<(u64, JournalRecord)>)> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|e| StoreError::JournalLocked {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let bytes = fs::read(path)?;
        let (records, valid_len) = scan(&bytes)?;

        if valid_len < bytes.len() as u64 {
            warn!(
                path = %path.display(),
                valid_len,
                file_len = bytes.len(),
                "discarding torn journal tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), records = records.len(), "journal opened");

        Ok((
            Self {
                path: path.to_path_buf(),
                writer: Mutex::new(JournalWriter {
                    file,
                    offset: valid_len,
                }),
                config,
            },
            records,
        ))
    }

    /// Append one record. Returns the byte offset of its frame.
    pub fn append(&self, record: &JournalRecord) -> StoreResult<u64> {
        let payload =
            bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| StoreError::Serialization("journal record too large".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut w = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        let frame_offset = w.offset;

        let written = w.file.write_all(&frame).and_then(|()| match self.config.sync_mode {
            SyncMode::EveryWrite => w.file.sync_data(),
            SyncMode::OsDefault => Ok(()),
        });
        if let Err(e) = written {
            // Drop whatever part of the frame reached the file.
            if let Err(trunc) = w.file.set_len(frame_offset) {
                warn!(offset = frame_offset, error = %trunc, "failed to roll back partial journal frame");
            }
            return Err(e.into());
        }

        w.offset += frame.len() as u64;
        debug!(offset = frame_offset, len = payload.len(), "journal append");
        Ok(frame_offset)
    }

    /// Current end of the journal in bytes.
    pub fn offset(&self) -> StoreResult<u64> {
        Ok(self.writer.lock().map_err(|_| StoreError::LockPoisoned)?.offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Durability for Journal {
    fn persist(&self, mutations: &[Mutation]) -> StoreResult<()> {
        self.append(&JournalRecord {
            mutations: mutations.to_vec(),
        })?;
        Ok(())
    }
}

/// Parse frames from `bytes`. Returns the records with their frame offsets
/// and the length of the intact prefix.
fn scan(bytes: &[u8]) -> StoreResult<(Vec<(u64, JournalRecord)>, u64)> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_SIZE {
            break;
        }

        let length = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let expected_crc = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);

        if length == 0 {
            // Zero-filled space after a crash is a torn tail; anything after
            // it is not.
            if rest.iter().all(|b| *b == 0) {
                break;
            }
            return Err(corrupt(offset, "zero-length frame"));
        }

        let end = HEADER_SIZE + length;
        if end > rest.len() {
            break;
        }

        let payload = &rest[HEADER_SIZE..end];
        if crc32fast::hash(payload) != expected_crc {
            if end == rest.len() {
                break;
            }
            return Err(corrupt(offset, "CRC mismatch"));
        }

        let record: JournalRecord = bincode::deserialize(payload)
            .map_err(|e| corrupt(offset, &format!("undecodable record: {e}")))?;
        records.push((offset as u64, record));
        offset += end;
    }

    Ok((records, offset as u64))
}

fn corrupt(offset: usize, reason: &str) -> StoreError {
    corrupt_at(offset as u64, reason)
}

pub(crate) fn corrupt_at(offset: u64, reason: &str) -> StoreError {
    StoreError::CorruptJournal {
        offset,
        reason: reason.to_string(),
    }
}
