//! The core of docrest: a generic REST surface over document collections.
//!
//! This crate provides:
//!
//! - **Identifier classification** ([`identifier`]) - Deciding whether a path segment is an id
//! - **Path resolution** ([`address`]) - Parsing request paths into typed addresses
//! - **Query translation** ([`operation`]) - Compiling address + intent into one store operation
//! - **Document walking** ([`walker`]) - Descending fetched documents in memory
//! - **Error normalization** ([`normalize`]) - Mapping store failures to request errors
//! - **Verb handlers** ([`handler`]) - GET/POST/PUT/PATCH/DELETE orchestration
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Query and filtering API** ([`query`]) - Filter AST, projections and JSON filter parsing
//! - **Request parameters** ([`params`]) - `query`, `fields` and `multiplicity`
//! - **Document conversion** ([`document`]) - JSON/BSON conversion and id stamping
//! - **Error handling** ([`api`], [`error`]) - Request-level and store-level error types
//!
//! # Example
//!
//! ```ignore
//! use std::collections::HashMap;
//! use docrest_core::handler::RestCollection;
//! use serde_json::json;
//!
//! let items = RestCollection::new("items", backend);
//! let reply = items.post("/", json!({ "name": "a" })).await?;
//! assert_eq!(reply.status, 201);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrest_core;

pub mod address;
pub mod api;
pub mod backend;
pub mod document;
pub mod error;
pub mod handler;
pub mod identifier;
pub mod normalize;
pub mod operation;
pub mod params;
pub mod query;
pub mod walker;
