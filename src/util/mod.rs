//! Utility modules for gitlabfs-rs.

pub mod fetch_cache;

pub use fetch_cache::FetchCache;
