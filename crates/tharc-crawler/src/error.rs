//! Crawler error types.

use thiserror::Error;

pub type CrawlResult<T> = Result<T, CrawlError>;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// A listing page failed every long-interval attempt; the uploader is
    /// abandoned for this run.
    #[error("listing page {page} for uploader {mid} failed all attempts")]
    PageExhausted { mid: i64, page: u32 },

    #[error("client error: {0}")]
    Client(#[from] tharc_client::ClientError),

    #[error("store error: {0}")]
    Store(#[from] tharc_store::StoreError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}
