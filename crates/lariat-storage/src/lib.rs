//! Storage backends for the lariat URL shortener.
//!
//! Three implementations of the [`Storage`] contract: plain in-memory,
//! in-memory replicated to an append-only log file, and PostgreSQL.

pub mod config;
pub mod file;
pub mod memory;
pub mod postgres;

pub use config::{build_storage, StorageConfig};
pub use file::FileStorage;
pub use lariat_core::{Storage, StorageError};
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
