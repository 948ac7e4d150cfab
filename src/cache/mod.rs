//! Query/cache layer.
//!
//! Reads are cached per [`QueryKey`] until a write invalidates the key:
//! - snapshots live in memory for the lifetime of the process
//! - concurrent reads of one key share a single remote fetch
//! - every invalidation bumps a per-key generation that observers poll

mod client;
mod key;

pub use client::QueryClient;
pub use key::{QueryFilter, QueryKey};
