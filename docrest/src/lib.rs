//! Main docrest crate: a generic REST surface over JSON document collections.
//!
//! This crate is the primary entry point. It re-exports the core types from
//! `docrest-core`, bundles the in-memory backend, optionally the MongoDB backend, and
//! provides [`router::RestRouter`] to serve collections over HTTP with axum.
//!
//! # Features
//!
//! - **Path addressing** - `/{collection}/{id}/field/{elementId}/...` reaches any nested value
//! - **Query parameters** - JSON filters, field projections and single-document multiplicity
//! - **Positional updates** - Nested writes are single store operations scoped by array filters
//! - **Uniform errors** - Every failure renders as `{ "error": { reason, code, message, detail } }`
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use docrest::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let app = RestRouter::builder(Arc::new(backend))
//!         .collection("people")
//!         .build();
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;
pub mod router;

pub use docrest_core::{
    address, api, backend, document, error, handler, identifier, normalize, operation, params,
    query, walker,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docrest_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docrest_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
