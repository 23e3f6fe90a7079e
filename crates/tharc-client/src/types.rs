//! Endpoint result types.

use tharc_models::Video;

/// One page of an uploader's listing.
#[derive(Debug, Clone)]
pub struct VideoPage {
    /// 1-based page number
    pub page: u32,
    /// Total videos across all pages, as reported by the remote
    pub total: u64,
    /// Parsed entries of this page, source order, nulls and bad rows dropped
    pub videos: Vec<Video>,
}
