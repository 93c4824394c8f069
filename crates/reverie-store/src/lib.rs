//! Entry model, repository seam and interaction caches for Reverie.
//!
//! This crate provides:
//!
//! - **Types**: entries, opaque ids, interaction counters and per-viewer flags
//! - **Repository**: the [`EntryRepository`] trait the backend implements,
//!   plus an in-memory [`MemoryRepository`]
//! - **Caches**: [`CountCache`] for aggregate counters and
//!   [`ViewerStateCache`] for per-viewer flags, both TTL-based
//! - **Coalescing**: [`BatchCoalescer`] folds concurrent identical
//!   viewer-state fetches into one repository call

pub mod cache;
pub mod coalescer;
mod count_cache;
mod error;
mod memory;
mod repository;
mod types;
mod viewer_cache;

pub use cache::{CacheConfig, CacheEnvelope, CacheUpdate, update_channel};
pub use coalescer::{BatchCoalescer, LoadResult};
pub use count_cache::CountCache;
pub use error::StoreError;
pub use memory::{CallCounts, MemoryRepository};
pub use repository::{EntryRepository, with_timeout};
pub use types::*;
pub use viewer_cache::ViewerStateCache;
