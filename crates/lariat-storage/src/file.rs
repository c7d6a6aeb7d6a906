use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use lariat_core::error::{Result, StorageError};
use lariat_core::storage::{DeleteRequest, Storage, UrlRecord, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::memory::MemoryStorage;

/// One log line. Field names are the wire contract of the log file; the
/// sequence number is serialized as a decimal string.
#[derive(Debug, Serialize, Deserialize)]
struct LogRecord {
    uuid: String,
    short_url: String,
    original_url: String,
    user_id: UserId,
    is_deleted: bool,
}

impl LogRecord {
    fn new(seq: u64, record: &UrlRecord) -> Self {
        Self {
            uuid: seq.to_string(),
            short_url: record.short_id.clone(),
            original_url: record.full_url.clone(),
            user_id: record.owner,
            is_deleted: record.is_deleted,
        }
    }

    fn into_record(self) -> UrlRecord {
        UrlRecord {
            short_id: self.short_url,
            full_url: self.original_url,
            owner: self.user_id,
            is_deleted: self.is_deleted,
        }
    }
}

#[derive(Debug)]
struct LogState {
    /// `None` once the store is closed.
    writer: Option<BufWriter<File>>,
    last_seq: u64,
}

/// File-replicated storage: a [`MemoryStorage`] whose mutations are mirrored
/// to an append-only JSON-lines log.
///
/// The log is read only at startup (replay) and fully rewritten on
/// deletions (compaction). Every compound memory+file operation is
/// serialized under one outer lock, distinct from the wrapped store's own
/// lock. Memory state may run ahead of the log if an append fails; this
/// backend is best-effort durability, not a WAL.
#[derive(Debug)]
pub struct FileStorage {
    memory: MemoryStorage,
    path: PathBuf,
    log: RwLock<LogState>,
}

impl FileStorage {
    /// Opens (or creates) the log at `path` and replays it into `memory`.
    ///
    /// Replay installs each line verbatim, deletion flag included, and
    /// tracks the highest sequence number seen. A malformed line or an I/O
    /// error is fatal.
    pub fn open(path: impl Into<PathBuf>, memory: MemoryStorage) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(map_io_error)?;

        let mut last_seq = 0;
        let reader = BufReader::new(file.try_clone().map_err(map_io_error)?);
        for line in reader.lines() {
            let line = line.map_err(map_io_error)?;
            if line.is_empty() {
                continue;
            }
            let record: LogRecord = serde_json::from_str(&line)
                .map_err(|e| StorageError::InvalidData(format!("malformed log line: {e}")))?;
            let seq: u64 = record
                .uuid
                .parse()
                .map_err(|_| StorageError::InvalidData(format!("bad sequence id '{}'", record.uuid)))?;
            memory.restore(&record.into_record());
            last_seq = seq;
        }

        tracing::debug!(path = %path.display(), last_seq, "replayed url log");

        Ok(Self {
            memory,
            path,
            log: RwLock::new(LogState {
                writer: Some(BufWriter::new(file)),
                last_seq,
            }),
        })
    }

    /// Full dump of every record, soft-deleted ones included.
    pub async fn all_records(&self) -> Vec<UrlRecord> {
        let _log = self.log.read().await;
        self.memory.all_records()
    }
}

fn map_io_error(err: std::io::Error) -> StorageError {
    StorageError::Io(err.to_string())
}

fn append_line(writer: &mut BufWriter<File>, record: &LogRecord) -> Result<()> {
    let line = serde_json::to_string(record)
        .map_err(|e| StorageError::InvalidData(format!("encode log record: {e}")))?;
    writer.write_all(line.as_bytes()).map_err(map_io_error)?;
    writer.write_all(b"\n").map_err(map_io_error)?;
    writer.flush().map_err(map_io_error)
}

#[async_trait]
impl Storage for FileStorage {
    async fn put(&self, short_id: &str, full_url: &str, owner: UserId) -> Result<()> {
        let mut log = self.log.write().await;
        let LogState { writer, last_seq } = &mut *log;
        let Some(writer) = writer.as_mut() else {
            return Err(StorageError::Closed);
        };

        // Memory first; nothing is appended if the write is rejected.
        self.memory.put(short_id, full_url, owner).await?;

        let seq = *last_seq + 1;
        append_line(
            writer,
            &LogRecord::new(seq, &UrlRecord::new(short_id, full_url, owner)),
        )?;
        *last_seq = seq;
        Ok(())
    }

    async fn get(&self, short_id: &str) -> Result<String> {
        let _log = self.log.read().await;
        self.memory.get(short_id).await
    }

    async fn put_batch(&self, records: &[UrlRecord]) -> Result<()> {
        for record in records {
            self.put(&record.short_id, &record.full_url, record.owner)
                .await?;
        }
        Ok(())
    }

    async fn delete_batch(&self, requests: &[DeleteRequest]) -> Result<()> {
        let mut log = self.log.write().await;
        if log.writer.is_none() {
            return Err(StorageError::Closed);
        }

        self.memory.delete_batch(requests).await?;

        // Compaction: dump the authoritative in-memory state and start the
        // log over, sequence numbers restarting at 1.
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&self.path)
            .map_err(map_io_error)?;
        let mut writer = BufWriter::new(file);
        let mut seq = 0u64;
        for record in self.memory.all_records() {
            seq += 1;
            let line = serde_json::to_string(&LogRecord::new(seq, &record))
                .map_err(|e| StorageError::InvalidData(format!("encode log record: {e}")))?;
            writer.write_all(line.as_bytes()).map_err(map_io_error)?;
            writer.write_all(b"\n").map_err(map_io_error)?;
        }
        writer.flush().map_err(map_io_error)?;

        log.writer = Some(writer);
        log.last_seq = seq;
        Ok(())
    }

    async fn create_user(&self) -> Result<UserId> {
        let _log = self.log.write().await;
        self.memory.create_user().await
    }

    async fn user_urls(&self, owner: UserId) -> Result<Vec<UrlRecord>> {
        let _log = self.log.read().await;
        self.memory.user_urls(owner).await
    }

    async fn count_urls(&self) -> Result<u64> {
        let _log = self.log.read().await;
        self.memory.count_urls().await
    }

    async fn count_users(&self) -> Result<u64> {
        let _log = self.log.read().await;
        self.memory.count_users().await
    }

    async fn close(&self) -> Result<()> {
        let mut log = self.log.write().await;
        let Some(writer) = log.writer.take() else {
            return Err(StorageError::Closed);
        };
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        file.sync_all().map_err(map_io_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn read_log_lines(path: &Path) -> Vec<LogRecord> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn replay_restores_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");

        let storage = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        storage.put("abc123", "http://x.com", 1).await.unwrap();
        storage.put("def456", "http://y.com", 2).await.unwrap();
        storage.close().await.unwrap();

        let reopened = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        assert_eq!(reopened.get("abc123").await.unwrap(), "http://x.com");
        assert_eq!(reopened.get("def456").await.unwrap(), "http://y.com");
        assert_eq!(reopened.count_urls().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn deletion_flags_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");

        let storage = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        storage.put("abc123", "http://x.com", 1).await.unwrap();
        storage
            .delete_batch(&[DeleteRequest::new("abc123", 1)])
            .await
            .unwrap();
        storage.close().await.unwrap();

        let reopened = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        let err = reopened.get("abc123").await.unwrap_err();
        assert!(matches!(err, StorageError::RecordDeleted(_)));

        let dump = reopened.all_records().await;
        assert_eq!(dump.len(), 1);
        assert!(dump[0].is_deleted);
    }

    #[tokio::test]
    async fn compaction_rewrites_the_whole_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");

        let storage = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        storage.put("abc123", "http://x.com", 1).await.unwrap();
        storage.put("abc123", "http://x.com", 1).await.unwrap();
        storage.put("def456", "http://y.com", 1).await.unwrap();
        // Three appended lines so far (the retried write appended twice).
        assert_eq!(read_log_lines(&path).len(), 3);

        storage
            .delete_batch(&[DeleteRequest::new("def456", 1)])
            .await
            .unwrap();

        let lines = read_log_lines(&path);
        // One line per record again, sequence restarted at 1.
        assert_eq!(lines.len(), 2);
        let mut seqs: Vec<u64> = lines.iter().map(|l| l.uuid.parse().unwrap()).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, vec![1, 2]);
        assert!(lines
            .iter()
            .any(|l| l.short_url == "def456" && l.is_deleted));
    }

    #[tokio::test]
    async fn sequence_continues_after_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");

        let storage = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        storage.put("abc123", "http://x.com", 1).await.unwrap();
        storage.put("def456", "http://y.com", 1).await.unwrap();
        storage.close().await.unwrap();

        let reopened = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        reopened.put("ghi789", "http://z.com", 1).await.unwrap();

        let last = read_log_lines(&path).pop().unwrap();
        assert_eq!(last.uuid, "3");
        assert_eq!(last.short_url, "ghi789");
    }

    #[tokio::test]
    async fn malformed_line_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");
        std::fs::write(&path, "not json\n").unwrap();

        let err = FileStorage::open(&path, MemoryStorage::new()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));
    }

    #[tokio::test]
    async fn user_watermark_survives_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");

        let storage = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        storage.put("abc123", "http://x.com", 5).await.unwrap();
        storage.close().await.unwrap();

        let reopened = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        assert_eq!(reopened.create_user().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn rejected_write_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");

        let storage = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        storage.put("abc123", "http://x.com", 1).await.unwrap();
        let err = storage.put("abc123", "http://y.com", 1).await.unwrap_err();
        assert!(matches!(err, StorageError::KeyExists(_)));

        assert_eq!(read_log_lines(&path).len(), 1);
    }

    #[tokio::test]
    async fn closed_storage_rejects_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");

        let storage = FileStorage::open(&path, MemoryStorage::new()).unwrap();
        storage.close().await.unwrap();

        assert!(matches!(
            storage.put("abc123", "http://x.com", 1).await.unwrap_err(),
            StorageError::Closed
        ));
        assert!(matches!(
            storage
                .delete_batch(&[DeleteRequest::new("abc123", 1)])
                .await
                .unwrap_err(),
            StorageError::Closed
        ));
    }
}
