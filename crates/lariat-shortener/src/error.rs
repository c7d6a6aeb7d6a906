use lariat_core::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("gave up after {0} short id collisions")]
    TooManyCollisions(usize),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
