//! store
//!
//! Resource store contract and backends.
//!
//! # Backends
//!
//! - [`InMemoryStore`] - reference backend, used directly by tests and embedders
//! - [`JsonFileStore`] - in-memory store persisted to a locked JSON file
//!
//! # Design
//!
//! The engine depends only on the [`ResourceStore`] trait. Any backend
//! that can produce and restore a full [`StoreSnapshot`] supports
//! transactional rollback.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;
pub use traits::{
    LinkRecord, RelatedLink, ResourceQuery, ResourceStore, StoreError, StoreSnapshot, TagRecord,
};
