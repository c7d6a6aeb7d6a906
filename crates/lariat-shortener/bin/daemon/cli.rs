use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};

pub const BASE_URL_ENV: &str = "LARIAT_BASE_URL";
pub const STORAGE_BACKEND_ENV: &str = "LARIAT_STORAGE_BACKEND";
pub const FILE_PATH_ENV: &str = "LARIAT_FILE_STORAGE_PATH";
pub const POSTGRES_DSN_ENV: &str = "LARIAT_POSTGRES_DSN";
pub const DELETE_BATCH_SIZE_ENV: &str = "LARIAT_DELETE_BATCH_SIZE";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "file")]
    File,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "lariat-shortener")]
pub struct CLI {
    /// Public base address used when formatting short links.
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = FILE_PATH_ENV, required_if_eq("storage", "file"))]
    pub file_path: Option<String>,

    #[arg(long, env = POSTGRES_DSN_ENV, required_if_eq("storage", "postgres"))]
    pub postgres_dsn: Option<String>,

    #[arg(
        long,
        env = DELETE_BATCH_SIZE_ENV,
        default_value_t = lariat_shortener::worker::DEFAULT_BATCH_SIZE
    )]
    pub delete_batch_size: usize,
}
