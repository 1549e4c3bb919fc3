//! C10 Journal: append-only, idempotent log of triggered events.
//!
//! File format: a data file of length-prefixed records (`u32` big-endian
//! length followed by the JSON-encoded `TriggerEvent`), plus a sidecar
//! index file of fixed-width `(uuid: 16 bytes, offset: u64 big-endian)`
//! entries giving O(1) lookup by trigger id. Writes are batched: fsync
//! runs at most once per `FSYNC_INTERVAL`, with the very first write in a
//! batch flushed immediately so a single trigger is never silently lost
//! on process death before the interval elapses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::AlertError;
use crate::domain::symbol::Symbol;
use crate::domain::trigger::TriggerEvent;

const FSYNC_INTERVAL: Duration = Duration::from_secs(1);
const INDEX_RECORD_LEN: usize = 16 + 8;

fn io_err(reason: impl std::fmt::Display) -> AlertError {
    AlertError::JournalIo { reason: reason.to_string() }
}

struct JournalInner {
    data_file: File,
    index_file: File,
    index: HashMap<Uuid, u64>,
    offset: u64,
    dirty_since: Option<Instant>,
}

/// Handle to the trigger journal. Cheap to clone; all clones share the
/// same underlying files behind a single async mutex, mirroring the
/// single-writer discipline the rest of the crate uses for shared state.
#[derive(Clone)]
pub struct Journal {
    inner: std::sync::Arc<Mutex<JournalInner>>,
    dir: PathBuf,
}

impl Journal {
    /// Opens (creating if absent) the journal under `dir`, replaying the
    /// sidecar index to rebuild the in-memory id -> offset map.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, AlertError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_err(format!("creating journal dir {}: {e}", dir.display())))?;

        let data_path = dir.join("triggers.journal");
        let index_path = dir.join("triggers.idx");

        let data_file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&data_path)
            .await
            .map_err(|e| io_err(format!("opening {}: {e}", data_path.display())))?;

        let mut index_read = File::open(&index_path).await.ok();
        let mut index = HashMap::new();
        if let Some(f) = index_read.as_mut() {
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)
                .await
                .map_err(|e| io_err(format!("reading {}: {e}", index_path.display())))?;
            for chunk in buf.chunks_exact(INDEX_RECORD_LEN) {
                let id = Uuid::from_slice(&chunk[..16]).map_err(|e| io_err(e))?;
                let offset = u64::from_be_bytes(chunk[16..24].try_into().unwrap());
                index.insert(id, offset);
            }
        }

        let index_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&index_path)
            .await
            .map_err(|e| io_err(format!("opening {}: {e}", index_path.display())))?;

        let offset = data_file
            .metadata()
            .await
            .map_err(|e| io_err(e))?
            .len();

        info!(entries = index.len(), dir = %dir.display(), "journal opened");

        Ok(Self {
            inner: std::sync::Arc::new(Mutex::new(JournalInner {
                data_file,
                index_file,
                index,
                offset,
                dirty_since: None,
            })),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends `event`; a no-op if an entry with the same id already
    /// exists, so a publisher retry after a crash never double-writes.
    pub async fn append(&self, event: &TriggerEvent) -> Result<(), AlertError> {
        let mut inner = self.inner.lock().await;
        if inner.index.contains_key(&event.id) {
            return Ok(());
        }

        let payload = serde_json::to_vec(event)
            .map_err(|e| AlertError::JournalIo { reason: format!("encoding trigger: {e}") })?;
        let len = payload.len() as u32;
        let record_offset = inner.offset;

        inner
            .data_file
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| io_err(e))?;
        inner.data_file.write_all(&payload).await.map_err(|e| io_err(e))?;
        inner.offset += 4 + payload.len() as u64;

        inner
            .index_file
            .write_all(event.id.as_bytes())
            .await
            .map_err(|e| io_err(e))?;
        inner
            .index_file
            .write_all(&record_offset.to_be_bytes())
            .await
            .map_err(|e| io_err(e))?;

        inner.index.insert(event.id, record_offset);

        let should_fsync = match inner.dirty_since {
            None => true,
            Some(started) => started.elapsed() >= FSYNC_INTERVAL,
        };
        if should_fsync {
            if let Err(e) = inner.data_file.sync_all().await {
                warn!(error = %e, "journal data fsync failed");
                return Err(io_err(e));
            }
            if let Err(e) = inner.index_file.sync_all().await {
                warn!(error = %e, "journal index fsync failed");
                return Err(io_err(e));
            }
            inner.dirty_since = None;
        } else {
            inner.dirty_since.get_or_insert_with(Instant::now);
        }

        Ok(())
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.inner.lock().await.index.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.index.len()
    }

    /// Replays the full data file and filters, for the optional read
    /// surface's replay endpoint. O(n) in journal size - acceptable for
    /// an audit/replay path, not the hot ingestion path.
    pub async fn query(
        &self,
        symbol: Option<&Symbol>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<TriggerEvent>, AlertError> {
        let mut inner = self.inner.lock().await;
        inner.data_file.sync_all().await.ok();

        let data_path = {
            let mut buf = Vec::new();
            inner
                .data_file
                .try_clone()
                .await
                .map_err(|e| io_err(e))?
                .read_to_end(&mut buf)
                .await
                .map_err(|e| io_err(e))?;
            buf
        };
        drop(inner);

        let mut events = Vec::new();
        let mut cursor = 0usize;
        while cursor + 4 <= data_path.len() {
            let len = u32::from_be_bytes(data_path[cursor..cursor + 4].try_into().unwrap()) as usize;
            cursor += 4;
            if cursor + len > data_path.len() {
                break;
            }
            let event: TriggerEvent = serde_json::from_slice(&data_path[cursor..cursor + len])
                .map_err(|e| AlertError::JournalIo { reason: format!("decoding trigger: {e}") })?;
            cursor += len;

            if let Some(s) = symbol {
                if &event.symbol != s {
                    continue;
                }
            }
            if let Some(since) = since {
                if event.fired_at < since {
                    continue;
                }
            }
            if let Some(until) = until {
                if event.fired_at > until {
                    continue;
                }
            }
            events.push(event);
        }
        Ok(events)
    }
}
