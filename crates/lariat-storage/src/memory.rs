use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use lariat_core::error::{Result, StorageError};
use lariat_core::storage::{DeleteRequest, Storage, UrlRecord, UserId};

#[derive(Debug, Clone)]
struct Slot {
    full_url: String,
    owner: UserId,
    is_deleted: bool,
}

#[derive(Debug, Default)]
struct UrlTable {
    urls: HashMap<String, Slot>,
    /// Reverse index over active records only. Invariant: an entry exists
    /// iff `urls[short_id]` is present and not deleted with that URL.
    by_url: HashMap<String, String>,
    max_user_id: UserId,
}

impl UrlTable {
    fn mark_deleted(&mut self, short_id: &str, owner: UserId) {
        let full_url = match self.urls.get_mut(short_id) {
            Some(slot) if slot.owner == owner && !slot.is_deleted => {
                slot.is_deleted = true;
                slot.full_url.clone()
            }
            _ => return,
        };
        if self.by_url.get(&full_url).is_some_and(|id| id == short_id) {
            self.by_url.remove(&full_url);
        }
    }
}

/// In-memory implementation of the [`Storage`] contract.
///
/// One reader-writer lock guards the whole table: the primary map, the
/// reverse URL index, and the max-user-id watermark always move together.
/// The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    table: RwLock<UrlTable>,
}

impl MemoryStorage {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full dump of every record, soft-deleted ones included. The file
    /// backend rewrites its log from this during compaction.
    pub fn all_records(&self) -> Vec<UrlRecord> {
        let table = self.read_table();
        table
            .urls
            .iter()
            .map(|(short_id, slot)| UrlRecord {
                short_id: short_id.clone(),
                full_url: slot.full_url.clone(),
                owner: slot.owner,
                is_deleted: slot.is_deleted,
            })
            .collect()
    }

    /// Installs a replayed record verbatim, deletion flag included.
    ///
    /// Bypasses the uniqueness checks of [`Storage::put`]: a log dump may
    /// hold a deleted and an active record for the same URL in any order.
    pub(crate) fn restore(&self, record: &UrlRecord) {
        let mut table = self.write_table();
        if record.is_deleted {
            if table
                .by_url
                .get(&record.full_url)
                .is_some_and(|id| *id == record.short_id)
            {
                table.by_url.remove(&record.full_url);
            }
        } else {
            table
                .by_url
                .insert(record.full_url.clone(), record.short_id.clone());
        }
        table.urls.insert(
            record.short_id.clone(),
            Slot {
                full_url: record.full_url.clone(),
                owner: record.owner,
                is_deleted: record.is_deleted,
            },
        );
        table.max_user_id = table.max_user_id.max(record.owner);
    }

    fn read_table(&self) -> RwLockReadGuard<'_, UrlTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, UrlTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_put_args(short_id: &str, full_url: &str) -> Result<()> {
    if short_id.is_empty() {
        return Err(StorageError::InvalidData("empty short id".to_string()));
    }
    if full_url.is_empty() {
        return Err(StorageError::InvalidData("empty url".to_string()));
    }
    Ok(())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, short_id: &str, full_url: &str, owner: UserId) -> Result<()> {
        check_put_args(short_id, full_url)?;

        let mut table = self.write_table();
        match table.urls.get(short_id) {
            Some(slot) if slot.full_url != full_url => {
                return Err(StorageError::KeyExists(short_id.to_owned()));
            }
            Some(_) => {
                // Same id, same URL: a retried write. Overwrite below so the
                // record ends up active again.
            }
            None => {
                if let Some(existing) = table.by_url.get(full_url) {
                    return Err(StorageError::ValueExists {
                        existing_id: existing.clone(),
                    });
                }
            }
        }

        table.urls.insert(
            short_id.to_owned(),
            Slot {
                full_url: full_url.to_owned(),
                owner,
                is_deleted: false,
            },
        );
        table.by_url.insert(full_url.to_owned(), short_id.to_owned());
        table.max_user_id = table.max_user_id.max(owner);
        Ok(())
    }

    async fn get(&self, short_id: &str) -> Result<String> {
        let table = self.read_table();
        match table.urls.get(short_id) {
            None => Err(StorageError::KeyNotFound(short_id.to_owned())),
            Some(slot) if slot.is_deleted => Err(StorageError::RecordDeleted(short_id.to_owned())),
            Some(slot) => Ok(slot.full_url.clone()),
        }
    }

    async fn put_batch(&self, records: &[UrlRecord]) -> Result<()> {
        for record in records {
            self.put(&record.short_id, &record.full_url, record.owner)
                .await?;
        }
        Ok(())
    }

    async fn delete_batch(&self, requests: &[DeleteRequest]) -> Result<()> {
        let mut table = self.write_table();
        for request in requests {
            table.mark_deleted(&request.short_id, request.owner);
        }
        Ok(())
    }

    async fn create_user(&self) -> Result<UserId> {
        let mut table = self.write_table();
        table.max_user_id += 1;
        Ok(table.max_user_id)
    }

    async fn user_urls(&self, owner: UserId) -> Result<Vec<UrlRecord>> {
        let table = self.read_table();
        Ok(table
            .urls
            .iter()
            .filter(|(_, slot)| slot.owner == owner && !slot.is_deleted)
            .map(|(short_id, slot)| UrlRecord {
                short_id: short_id.clone(),
                full_url: slot.full_url.clone(),
                owner: slot.owner,
                is_deleted: false,
            })
            .collect())
    }

    async fn count_urls(&self) -> Result<u64> {
        Ok(self.read_table().urls.len() as u64)
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.read_table().max_user_id.max(0) as u64)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
