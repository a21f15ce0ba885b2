//! Append-only journal storage backend.
//!
//! Records are JSON-encoded and framed with a length prefix and a CRC32
//! checksum:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (JSON-serialized JournalRecord)]
//! ```
//!
//! The first record is always a [`JournalRecord::Header`] carrying the schema
//! version. `init` replays the journal into an in-memory index; records that
//! fail the CRC check are skipped and a torn tail is cut off. Once the journal
//! holds more than `compact_threshold` records per live key it is rewritten as
//! a header plus a single batch of the live entries.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tabius_types::{KeyValue, Value};
use tracing::{debug, info, warn};

use crate::config::{AdapterKind, JournalSync};
use crate::error::{StorageError, StorageResult};
use crate::traits::{matches_prefix, StorageAdapter};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// A single journal record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalRecord {
    Header { schema_version: u32 },
    Put { key: String, value: Value },
    Delete { key: String },
    /// Applied atomically: a batch is one frame, so it is either replayed
    /// whole or dropped whole.
    Batch { entries: Vec<KeyValue> },
    Clear,
}

impl JournalRecord {
    fn apply(self, entries: &mut HashMap<String, Value>) {
        match self {
            Self::Header { .. } => {}
            Self::Put { key, value } => {
                entries.insert(key, value);
            }
            Self::Delete { key } => {
                entries.remove(&key);
            }
            Self::Batch { entries: batch } => {
                entries.extend(batch.into_iter().map(|kv| (kv.key, kv.value)));
            }
            Self::Clear => entries.clear(),
        }
    }
}

/// Open journal: writer plus the replayed index.
struct JournalState {
    writer: BufWriter<File>,
    entries: HashMap<String, Value>,
    schema_version: u32,
    /// Records currently in the file, header included.
    records: usize,
}

/// Transactional, append-only journal per namespace.
///
/// Appends block the calling thread, and with [`JournalSync::EveryWrite`]
/// every commit waits for `sync_all`.
pub struct JournalAdapter {
    path: PathBuf,
    sync: JournalSync,
    compact_threshold: usize,
    state: Mutex<Option<JournalState>>,
}

impl JournalAdapter {
    pub fn new(path: impl Into<PathBuf>, sync: JournalSync, compact_threshold: usize) -> Self {
        Self {
            path: path.into(),
            sync,
            compact_threshold: compact_threshold.max(1),
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records currently in the journal file, header included.
    pub fn record_count(&self) -> usize {
        self.state
            .lock()
            .expect("journal mutex poisoned")
            .as_ref()
            .map_or(0, |s| s.records)
    }

    fn not_initialized(&self) -> StorageError {
        StorageError::NotInitialized {
            namespace: self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&JournalState) -> T) -> StorageResult<T> {
        let guard = self.state.lock().expect("journal mutex poisoned");
        guard.as_ref().map(f).ok_or_else(|| self.not_initialized())
    }

    /// Append one record, then apply it to the index and compact if the
    /// journal has grown past the threshold.
    fn commit(&self, record: JournalRecord) -> StorageResult<()> {
        let mut guard = self.state.lock().expect("journal mutex poisoned");
        let state = guard.as_mut().ok_or_else(|| self.not_initialized())?;

        append_record(&mut state.writer, &record, self.sync)?;
        state.records += 1;
        record.apply(&mut state.entries);

        if state.records > self.compact_threshold * state.entries.len().max(1) {
            self.compact(state)?;
        }
        Ok(())
    }

    /// Rewrite the journal as a header plus one batch of live entries.
    fn compact(&self, state: &mut JournalState) -> StorageResult<()> {
        let before = state.records;
        let live: Vec<KeyValue> = state
            .entries
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();
        let mut records = vec![JournalRecord::Header {
            schema_version: state.schema_version,
        }];
        if !live.is_empty() {
            records.push(JournalRecord::Batch { entries: live });
        }
        state.writer = self.rewrite(&records)?;
        state.records = records.len();
        debug!(path = %self.path.display(), before, after = state.records, "journal compacted");
        Ok(())
    }

    /// Atomically replace the journal with `records` and return an append
    /// writer positioned at its end.
    fn rewrite(&self, records: &[JournalRecord]) -> StorageResult<BufWriter<File>> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        let mut writer = BufWriter::new(tmp.as_file().try_clone()?);
        for record in records {
            append_record(&mut writer, record, JournalSync::OsDefault)?;
        }
        drop(writer);
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;
        open_append(&self.path)
    }
}

fn open_append(path: &Path) -> StorageResult<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

fn append_record(
    writer: &mut BufWriter<File>,
    record: &JournalRecord,
    sync: JournalSync,
) -> StorageResult<()> {
    let payload = serde_json::to_vec(record)?;
    let length = payload.len() as u32;
    let crc = crc32fast::hash(&payload);

    writer.write_all(&length.to_le_bytes())?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    if matches!(sync, JournalSync::EveryWrite) {
        writer.get_ref().sync_all()?;
    }
    Ok(())
}

/// Result of scanning a journal file front-to-back.
struct Replay {
    records: Vec<JournalRecord>,
    /// Byte length of the readable prefix; anything after it is a torn tail.
    valid_len: u64,
}

fn replay(path: &Path) -> StorageResult<Replay> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(Replay {
                records: Vec::new(),
                valid_len: 0,
            })
        }
        Err(e) => return Err(e.into()),
    };
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE as u64 <= file_len {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header)?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
            warn!(offset, length, file_len, "torn journal tail; stopping replay");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;
        offset += HEADER_SIZE as u64 + length as u64;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping journal record"
            );
            continue;
        }

        match serde_json::from_slice::<JournalRecord>(&payload) {
            Ok(record) => records.push(record),
            Err(e) => warn!(offset, error = %e, "undecodable journal record; skipping"),
        }
    }

    Ok(Replay {
        records,
        valid_len: offset,
    })
}

#[async_trait]
impl StorageAdapter for JournalAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Journal
    }

    async fn init(&self, schema_version: u32) -> StorageResult<()> {
        let Replay { records, valid_len } = replay(&self.path)?;

        let stored_version = match records.first() {
            Some(JournalRecord::Header { schema_version }) => Some(*schema_version),
            _ => None,
        };

        let state = if stored_version == Some(schema_version) {
            if valid_len < fs::metadata(&self.path)?.len() {
                OpenOptions::new()
                    .write(true)
                    .open(&self.path)?
                    .set_len(valid_len)?;
            }
            let mut entries = HashMap::new();
            let count = records.len();
            for record in records {
                record.apply(&mut entries);
            }
            info!(path = %self.path.display(), records = count, keys = entries.len(), "journal replayed");
            JournalState {
                writer: open_append(&self.path)?,
                entries,
                schema_version,
                records: count,
            }
        } else {
            if stored_version.is_some() || !records.is_empty() {
                info!(
                    path = %self.path.display(),
                    stored = ?stored_version,
                    expected = schema_version,
                    "journal schema mismatch; discarding data"
                );
            }
            let header = [JournalRecord::Header { schema_version }];
            JournalState {
                writer: self.rewrite(&header)?,
                entries: HashMap::new(),
                schema_version,
                records: header.len(),
            }
        };

        *self.state.lock().expect("journal mutex poisoned") = Some(state);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.with_state(|s| s.entries.get(key).cloned())
    }

    async fn get_all(&self, keys: &[String]) -> StorageResult<Vec<Option<Value>>> {
        self.with_state(|s| keys.iter().map(|k| s.entries.get(k).cloned()).collect())
    }

    async fn set(&self, key: &str, value: Option<Value>) -> StorageResult<()> {
        let record = match value {
            Some(value) => JournalRecord::Put {
                key: key.to_string(),
                value,
            },
            None => JournalRecord::Delete {
                key: key.to_string(),
            },
        };
        self.commit(record)
    }

    async fn set_all(&self, entries: Vec<KeyValue>) -> StorageResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.commit(JournalRecord::Batch { entries })
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<KeyValue>> {
        self.with_state(|s| {
            s.entries
                .iter()
                .filter(|(k, _)| matches_prefix(k, prefix))
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
                .collect()
        })
    }

    fn snapshot(&self) -> Vec<KeyValue> {
        self.with_state(|s| {
            s.entries
                .iter()
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut guard = self.state.lock().expect("journal mutex poisoned");
        let state = guard.as_mut().ok_or_else(|| self.not_initialized())?;
        state.entries.clear();
        self.compact(state)
    }
}

impl std::fmt::Debug for JournalAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalAdapter")
            .field("path", &self.path)
            .field("records", &self.record_count())
            .finish()
    }
}
