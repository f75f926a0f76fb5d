//! MongoDB backend implementation for docrest.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Filters are translated to native MongoDB queries and nested mutations are sent as
//! positional updates with array filters, so every request is a single round trip.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docrest = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Errors
//!
//! Server-side document validation failures (code 121) and rejected update paths surface
//! as [`DocumentStoreError::InvalidDocument`](docrest_core::error::DocumentStoreError::InvalidDocument),
//! duplicate keys as `DocumentAlreadyExists`, and everything else as `Backend`.
//!
//! # Example
//!
//! ```ignore
//! use docrest::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrest_mongodb;

pub mod store;
mod query;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
