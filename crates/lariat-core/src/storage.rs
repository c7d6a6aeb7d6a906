use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifier of the user owning a record. `0` means anonymous.
pub type UserId = i64;

/// A stored URL mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Fixed-length random identifier, unique per store instance.
    pub short_id: String,
    /// The original long URL; unique among active records.
    pub full_url: String,
    /// The creating user.
    pub owner: UserId,
    /// Soft-delete flag. Deleted records are invisible to lookups but stay
    /// in the store for audit and rebuild.
    pub is_deleted: bool,
}

impl UrlRecord {
    /// Creates an active (non-deleted) record.
    pub fn new(short_id: impl Into<String>, full_url: impl Into<String>, owner: UserId) -> Self {
        Self {
            short_id: short_id.into(),
            full_url: full_url.into(),
            owner,
            is_deleted: false,
        }
    }
}

/// A request to soft-delete one record.
///
/// Produced by request handlers, consumed by the deletion worker. Never
/// persisted; it only takes effect if `owner` matches the record's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub short_id: String,
    pub owner: UserId,
}

impl DeleteRequest {
    pub fn new(short_id: impl Into<String>, owner: UserId) -> Self {
        Self {
            short_id: short_id.into(),
            owner,
        }
    }
}

/// The storage contract shared by every backend.
///
/// All operations are safe for concurrent invocation. Writes are linearized
/// per store instance; there is no cross-instance ordering guarantee.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Stores a mapping from `short_id` to `full_url`.
    ///
    /// Putting an existing `short_id` with a different URL fails with
    /// `KeyExists`; with the identical URL it is an idempotent success, so
    /// retried writes are tolerated. Backends that enforce URL uniqueness
    /// report a duplicate `full_url` as `ValueExists` carrying the existing
    /// short id.
    async fn put(&self, short_id: &str, full_url: &str, owner: UserId) -> Result<()>;

    /// Resolves a short id to its URL.
    ///
    /// Fails with `KeyNotFound` for an absent id and `RecordDeleted` for a
    /// soft-deleted one.
    async fn get(&self, short_id: &str) -> Result<String>;

    /// Applies [`Storage::put`] semantics to every record, stopping at the
    /// first uniqueness violation. Not all-or-nothing: records preceding
    /// the failure stay applied.
    async fn put_batch(&self, records: &[UrlRecord]) -> Result<()>;

    /// Marks each requested record deleted, only where the request's owner
    /// matches the record's owner. Mismatched or missing records are
    /// silently skipped.
    async fn delete_batch(&self, requests: &[DeleteRequest]) -> Result<()>;

    /// Allocates a fresh, strictly increasing user identifier.
    async fn create_user(&self) -> Result<UserId>;

    /// Returns the active records owned by `owner`, unordered.
    async fn user_urls(&self, owner: UserId) -> Result<Vec<UrlRecord>>;

    /// Number of records, including soft-deleted ones.
    async fn count_urls(&self) -> Result<u64>;

    /// Number of users ever allocated.
    async fn count_users(&self) -> Result<u64>;

    /// Releases underlying resources (file handles, connection pools).
    /// Call once; idempotency is not guaranteed.
    async fn close(&self) -> Result<()>;
}
