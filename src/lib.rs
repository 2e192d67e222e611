//! infragraph - transactional reconciliation of infrastructure resource graphs
//!
//! infragraph keeps a graph of typed resources (machines, domains, websites,
//! users, ...) connected by typed links and labelled with tags. Changes are
//! submitted as batches; per-type handlers react to each change and stage
//! follow-up changes until the graph reaches a fixpoint. Every batch is one
//! transaction: it either converges and commits, or is fully rolled back.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Changes batches, the reconcile loop, and the executor
//! - [`store`] - Resource store contract and backends
//! - [`core`] - Domain types, graph traversal, configuration, and locking
//!
//! # Correctness Invariants
//!
//! infragraph maintains the following invariants:
//!
//! 1. All mutations flow through a single transactional executor
//! 2. Handlers stage changes; they never write to the store directly
//! 3. A failed or non-converging transaction leaves the store untouched
//! 4. No two resources of a type share a primary key

pub mod cli;
pub mod core;
pub mod engine;
pub mod store;
