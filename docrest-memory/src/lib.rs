//! In-memory document storage backend for docrest.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Query evaluation** - Filters are evaluated against stored BSON, dotted paths included
//! - **Positional updates** - `$[label]` placeholders resolved through array scope filters
//! - **Validation hook** - An optional [`Schema`](docrest_core::backend::Schema) checks every write
//!
//! # Quick Start
//!
//! ```ignore
//! use std::collections::HashMap;
//! use docrest_core::{backend::StoreBackendBuilder, handler::{RestCollection, Verb}};
//! use docrest_memory::InMemoryStore;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let people = RestCollection::new("people", backend);
//!
//!     let reply = people
//!         .handle(Verb::Post, "/", &HashMap::new(), json!({ "name": "Alice" }))
//!         .await?;
//!     assert_eq!(reply.status, 201);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrest_memory;

pub mod store;
mod evaluator;
mod projection;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
