//! Stowage - build artifact caching
//!
//! Packs build directories into tar or tar.gz archives stored under keys
//! rendered from templates, restores them on later builds, and flushes
//! entries past a maximum age.

pub mod archive;
pub mod cache;
pub mod cachekey;
pub mod cli;
pub mod config;
pub mod error;
pub mod storage;

pub use error::{StowageError, StowageResult};
