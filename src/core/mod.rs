//! core
//!
//! Core domain types, schemas, and algorithms for infragraph.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ResourceId, ResourceType, LinkType, TagName
//! - [`resource`] - Resources, primary keys, and per-type descriptors
//! - [`graph`] - Link-graph traversal
//! - [`lock`] - Exclusive state-file locking
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Traversals are iterative and deterministic

pub mod config;
pub mod graph;
pub mod lock;
pub mod resource;
pub mod types;
