use std::sync::Arc;

use lariat_core::{Storage, StorageError, UrlRecord, UserId};
use tracing::debug;

use crate::error::{Result, ShortenerError};
use crate::generator::Generator;
use crate::url::{validate_url, MAX_URL_LENGTH};

/// Upper bound on id regeneration per shorten call. Unreachable with a
/// healthy generator; turns a broken one into a diagnosable error instead
/// of a spin loop.
const MAX_PUT_ATTEMPTS: usize = 64;

/// Outcome of a shorten call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortenOutcome {
    /// A new mapping was created under this short id.
    Created(String),
    /// The URL was already shortened; this is the existing short id.
    /// Callers typically answer "conflict" rather than "created".
    Existing(String),
}

impl ShortenOutcome {
    pub fn short_id(&self) -> &str {
        match self {
            ShortenOutcome::Created(id) | ShortenOutcome::Existing(id) => id,
        }
    }
}

/// Aggregate counters for the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub urls: u64,
    pub users: u64,
}

/// The resolution service: turns long URLs into stored short ids and back.
///
/// Wraps a [`Storage`] and a [`Generator`]. The generator gives no
/// uniqueness guarantee, so `shorten` loops on id collisions until the
/// store accepts a candidate.
#[derive(Debug)]
pub struct ShortenerService<S: ?Sized, G> {
    storage: Arc<S>,
    generator: Arc<G>,
}

impl<S: ?Sized, G> Clone for ShortenerService<S, G> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            generator: Arc::clone(&self.generator),
        }
    }
}

impl<S, G> ShortenerService<S, G>
where
    S: Storage + ?Sized,
    G: Generator,
{
    pub fn new(storage: Arc<S>, generator: G) -> Self {
        Self {
            storage,
            generator: Arc::new(generator),
        }
    }

    /// Shortens `long_url` on behalf of `owner`.
    ///
    /// Generates candidates until one sticks: a [`StorageError::KeyExists`]
    /// collision triggers a regenerate-and-retry, a duplicate URL short
    /// circuits to the existing mapping.
    pub async fn shorten(&self, long_url: &str, owner: UserId) -> Result<ShortenOutcome> {
        if !validate_url(long_url) {
            return Err(ShortenerError::InvalidUrl(format!(
                "url must be non-empty and shorter than {MAX_URL_LENGTH} characters"
            )));
        }

        for attempt in 1..=MAX_PUT_ATTEMPTS {
            let candidate = self.generator.generate();
            match self.storage.put(&candidate, long_url, owner).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(attempt, "short id collision resolved");
                    }
                    return Ok(ShortenOutcome::Created(candidate));
                }
                Err(StorageError::KeyExists(_)) => continue,
                Err(StorageError::ValueExists { existing_id }) => {
                    return Ok(ShortenOutcome::Existing(existing_id));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ShortenerError::TooManyCollisions(MAX_PUT_ATTEMPTS))
    }

    /// Shortens several URLs in one storage round trip.
    ///
    /// Collisions inside the batch are not retried; the store surfaces the
    /// first violation and earlier records may already be applied.
    pub async fn shorten_batch(
        &self,
        long_urls: &[String],
        owner: UserId,
    ) -> Result<Vec<UrlRecord>> {
        for url in long_urls {
            if !validate_url(url) {
                return Err(ShortenerError::InvalidUrl(format!(
                    "url must be non-empty and shorter than {MAX_URL_LENGTH} characters"
                )));
            }
        }

        let records: Vec<UrlRecord> = long_urls
            .iter()
            .map(|url| UrlRecord::new(self.generator.generate(), url.clone(), owner))
            .collect();
        self.storage.put_batch(&records).await?;
        Ok(records)
    }

    /// Resolves a short id back to its URL. Not-found and deleted records
    /// surface as distinct storage errors.
    pub async fn resolve(&self, short_id: &str) -> Result<String> {
        Ok(self.storage.get(short_id).await?)
    }

    /// Active records owned by `owner`.
    pub async fn user_urls(&self, owner: UserId) -> Result<Vec<UrlRecord>> {
        Ok(self.storage.user_urls(owner).await?)
    }

    /// Allocates an identity for an unauthenticated caller.
    pub async fn create_user(&self) -> Result<UserId> {
        Ok(self.storage.create_user().await?)
    }

    pub async fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            urls: self.storage.count_urls().await?,
            users: self.storage.count_users().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lariat_storage::MemoryStorage;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Deterministic generator: distinct id per call.
    struct CountingGenerator {
        counter: AtomicU64,
    }

    impl CountingGenerator {
        fn new() -> Self {
            Self {
                counter: AtomicU64::new(0),
            }
        }
    }

    impl Generator for CountingGenerator {
        fn generate(&self) -> String {
            let count = self.counter.fetch_add(1, Ordering::SeqCst);
            format!("id{count:08}")
        }
    }

    /// Replays a script of ids, then repeats the last one forever.
    struct ScriptedGenerator {
        script: Mutex<VecDeque<String>>,
        fallback: String,
    }

    impl ScriptedGenerator {
        fn new(ids: &[&str]) -> Self {
            Self {
                script: Mutex::new(ids.iter().map(|id| id.to_string()).collect()),
                fallback: ids.last().expect("non-empty script").to_string(),
            }
        }
    }

    impl Generator for ScriptedGenerator {
        fn generate(&self) -> String {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn service_with<G: Generator>(generator: G) -> (Arc<MemoryStorage>, ShortenerService<MemoryStorage, G>) {
        let storage = Arc::new(MemoryStorage::new());
        let service = ShortenerService::new(Arc::clone(&storage), generator);
        (storage, service)
    }

    #[tokio::test]
    async fn shorten_then_resolve_round_trips() {
        let (_, service) = service_with(CountingGenerator::new());

        let outcome = service.shorten("http://x.com", 1).await.unwrap();
        let ShortenOutcome::Created(short_id) = outcome else {
            panic!("expected a created mapping");
        };

        assert_eq!(service.resolve(&short_id).await.unwrap(), "http://x.com");
    }

    #[tokio::test]
    async fn repeated_shorten_returns_the_existing_id() {
        let (_, service) = service_with(CountingGenerator::new());

        let first = service.shorten("http://x.com", 1).await.unwrap();
        let second = service.shorten("http://x.com", 1).await.unwrap();
        let third = service.shorten("http://x.com", 2).await.unwrap();

        assert!(matches!(first, ShortenOutcome::Created(_)));
        assert_eq!(second, ShortenOutcome::Existing(first.short_id().to_string()));
        assert_eq!(third, ShortenOutcome::Existing(first.short_id().to_string()));
    }

    #[tokio::test]
    async fn collision_triggers_a_regenerate() {
        let (storage, service) =
            service_with(ScriptedGenerator::new(&["clash00001", "fresh00001"]));
        storage.put("clash00001", "http://a.com", 1).await.unwrap();

        let outcome = service.shorten("http://b.com", 1).await.unwrap();

        assert_eq!(outcome, ShortenOutcome::Created("fresh00001".to_string()));
        assert_eq!(service.resolve("clash00001").await.unwrap(), "http://a.com");
    }

    #[tokio::test]
    async fn endless_collisions_are_cut_off() {
        let (storage, service) = service_with(ScriptedGenerator::new(&["clash00001"]));
        storage.put("clash00001", "http://a.com", 1).await.unwrap();

        let err = service.shorten("http://b.com", 1).await.unwrap_err();
        assert!(matches!(err, ShortenerError::TooManyCollisions(_)));
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected() {
        let (_, service) = service_with(CountingGenerator::new());

        assert!(matches!(
            service.shorten("", 1).await.unwrap_err(),
            ShortenerError::InvalidUrl(_)
        ));
        assert!(matches!(
            service.shorten(&"a".repeat(MAX_URL_LENGTH), 1).await.unwrap_err(),
            ShortenerError::InvalidUrl(_)
        ));
    }

    #[tokio::test]
    async fn batch_shortening_stores_every_url() {
        let (_, service) = service_with(CountingGenerator::new());

        let urls = vec![
            "http://a.com".to_string(),
            "http://b.com".to_string(),
            "http://c.com".to_string(),
        ];
        let records = service.shorten_batch(&urls, 1).await.unwrap();

        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(service.resolve(&record.short_id).await.unwrap(), record.full_url);
        }
    }

    #[tokio::test]
    async fn batch_shortening_validates_first() {
        let (storage, service) = service_with(CountingGenerator::new());

        let urls = vec!["http://a.com".to_string(), String::new()];
        let err = service.shorten_batch(&urls, 1).await.unwrap_err();

        assert!(matches!(err, ShortenerError::InvalidUrl(_)));
        assert_eq!(storage.count_urls().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn resolve_surfaces_deleted_and_missing_distinctly() {
        let (storage, service) = service_with(CountingGenerator::new());

        let outcome = service.shorten("http://x.com", 1).await.unwrap();
        storage
            .delete_batch(&[lariat_core::DeleteRequest::new(outcome.short_id(), 1)])
            .await
            .unwrap();

        assert!(matches!(
            service.resolve(outcome.short_id()).await.unwrap_err(),
            ShortenerError::Storage(StorageError::RecordDeleted(_))
        ));
        assert!(matches!(
            service.resolve("doesnotexist").await.unwrap_err(),
            ShortenerError::Storage(StorageError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn stats_reports_counts() {
        let (_, service) = service_with(CountingGenerator::new());

        service.shorten("http://a.com", 1).await.unwrap();
        service.shorten("http://b.com", 2).await.unwrap();
        service.create_user().await.unwrap();

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.urls, 2);
        assert_eq!(stats.users, 3);
    }
}
