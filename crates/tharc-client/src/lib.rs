//! Signed bilibili API client.
//!
//! This crate provides:
//! - WBI request signing with cached key discovery
//! - A retrying GET primitive with throttle handling and per-request pacing
//! - Typed endpoint methods for listing pages, seasons, parts and tags

pub mod client;
pub mod error;
pub mod pacing;
pub mod signer;
pub mod types;

pub use client::{BiliClient, ClientConfig};
pub use error::{ClientError, ClientResult};
pub use pacing::Pacing;
pub use signer::WbiKeys;
pub use types::VideoPage;
