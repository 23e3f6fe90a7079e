//! SQLite persistence for archived videos.
//!
//! This crate provides:
//! - A single-connection pool so writers never interleave
//! - Idempotent schema bootstrap
//! - Transactional video+parts upserts that preserve confirmed statuses

pub mod error;
pub mod schema;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{save_video, Store};
