use async_trait::async_trait;
use lariat_core::error::{Result, StorageError};
use lariat_core::storage::{DeleteRequest, Storage, UrlRecord, UserId};
use sqlx::{PgPool, Row};

/// PostgreSQL implementation of the storage contract.
///
/// Soft delete is a boolean column; reads distinguish a missing row from a
/// deleted one. The unique index on `full_link` is partial
/// (`WHERE NOT is_deleted`), so a deleted URL can be shortened again, while
/// short ids are never reused. `put` is a single upsert-or-return round
/// trip, so there is no check-then-insert race window.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS link (
        id bigserial PRIMARY KEY,
        short_link text NOT NULL,
        full_link text NOT NULL,
        user_id bigint NOT NULL DEFAULT 0,
        is_deleted boolean NOT NULL DEFAULT false
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS link_short_link_idx ON link (short_link)",
    "CREATE UNIQUE INDEX IF NOT EXISTS link_full_link_active_idx ON link (full_link) WHERE NOT is_deleted",
    "CREATE INDEX IF NOT EXISTS link_user_id_idx ON link (user_id)",
    "CREATE TABLE IF NOT EXISTS auth_user (id bigserial PRIMARY KEY)",
];

/// Insert-or-return in one statement: on an active-URL conflict nothing is
/// inserted and the existing row's short id comes back instead.
const PUT_QUERY: &str = r#"
WITH inserted AS (
    INSERT INTO link (short_link, full_link, user_id)
    VALUES ($1, $2, $3)
    ON CONFLICT (full_link) WHERE NOT is_deleted DO NOTHING
    RETURNING short_link
)
SELECT COALESCE(
    (SELECT short_link FROM inserted),
    (SELECT short_link FROM link WHERE full_link = $2 AND NOT is_deleted)
)
"#;

impl PostgresStorage {
    /// Creates a storage from an existing connection pool. The schema is
    /// assumed to be in place.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool and bootstraps the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        let storage = Self::new(pool);
        storage.ensure_schema().await?;
        Ok(storage)
    }

    /// Applies the idempotent DDL statements.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn put(&self, short_id: &str, full_url: &str, owner: UserId) -> Result<()> {
        if short_id.is_empty() || full_url.is_empty() {
            return Err(StorageError::InvalidData(
                "empty short id or url".to_string(),
            ));
        }

        let result = sqlx::query_scalar::<_, Option<String>>(PUT_QUERY)
            .bind(short_id)
            .bind(full_url)
            .bind(owner)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(Some(existing)) if existing != short_id => {
                Err(StorageError::ValueExists { existing_id: existing })
            }
            Ok(Some(_)) => Ok(()),
            // Conflicting row vanished between the insert and the lookup.
            Ok(None) => Err(StorageError::Query(
                "upsert returned no short link".to_string(),
            )),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::KeyExists(short_id.to_owned()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn get(&self, short_id: &str) -> Result<String> {
        let row = sqlx::query("SELECT full_link, is_deleted FROM link WHERE short_link = $1")
            .bind(short_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::KeyNotFound(short_id.to_owned()));
        };

        let full_url: String = row.try_get("full_link").map_err(map_sqlx_error)?;
        let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;

        if is_deleted {
            return Err(StorageError::RecordDeleted(short_id.to_owned()));
        }
        Ok(full_url)
    }

    /// Plain inserts issued back to back on one pooled connection, no
    /// wrapping transaction: rows before the first violation stay applied.
    async fn put_batch(&self, records: &[UrlRecord]) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        for record in records {
            let result =
                sqlx::query("INSERT INTO link (short_link, full_link, user_id) VALUES ($1, $2, $3)")
                    .bind(&record.short_id)
                    .bind(&record.full_url)
                    .bind(record.owner)
                    .execute(conn.as_mut())
                    .await;

            match result {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    return Err(StorageError::KeyExists(record.short_id.clone()));
                }
                Err(err) => return Err(map_sqlx_error(err)),
            }
        }
        Ok(())
    }

    async fn delete_batch(&self, requests: &[DeleteRequest]) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        for request in requests {
            sqlx::query(
                "UPDATE link SET is_deleted = true WHERE short_link = $1 AND user_id = $2",
            )
            .bind(&request.short_id)
            .bind(request.owner)
            .execute(conn.as_mut())
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn create_user(&self) -> Result<UserId> {
        sqlx::query_scalar::<_, i64>("INSERT INTO auth_user DEFAULT VALUES RETURNING id")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn user_urls(&self, owner: UserId) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            "SELECT short_link, full_link, user_id FROM link
             WHERE user_id = $1 AND NOT is_deleted",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(UrlRecord {
                    short_id: row.try_get("short_link").map_err(map_sqlx_error)?,
                    full_url: row.try_get("full_link").map_err(map_sqlx_error)?,
                    owner: row.try_get("user_id").map_err(map_sqlx_error)?,
                    is_deleted: false,
                })
            })
            .collect()
    }

    async fn count_urls(&self) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM link")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count.max(0) as u64)
    }

    async fn count_users(&self) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM auth_user")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count.max(0) as u64)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
