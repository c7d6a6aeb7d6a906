//! Resolution service and deletion pipeline for the lariat URL shortener.
//!
//! This crate turns long URLs into stored short ids (handling id
//! collisions), and drains user-requested deletions through a background
//! batching worker. Storage backends live in `lariat_storage`.

pub mod error;
pub mod generator;
pub mod service;
pub mod url;
pub mod worker;

pub use error::ShortenerError;
pub use generator::random::RandomGenerator;
pub use generator::Generator;
pub use service::{ShortenOutcome, ShortenerService, Stats};
pub use worker::{delete_pipeline, DeleteQueue, DeleteWorker};
