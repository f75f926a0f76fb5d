//! Storage backend abstraction for document collections.
//!
//! This module defines the core traits that abstract over different storage implementations,
//! allowing the REST layer to work with various backends (in-memory, MongoDB, etc.).
//!
//! # Overview
//!
//! The [`StoreBackend`] trait provides a unified async interface for every store access a
//! request can make: collection queries, single-document reads and writes, positional
//! updates scoped by array filters, and bulk updates and deletes.
//! Implementations are required to be thread-safe (`Send + Sync`) and support concurrent access.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//! - [`Schema`]: Optional validation hook run by backends before a write is committed
//!
//! # Positional updates
//!
//! A [`ScopedUpdate`] carries field paths in which `$[label]` placeholders stand for array
//! elements. Each placeholder is resolved through the [`ArrayScopeFilter`] with the same
//! label: the element of the array field whose `_id` equals the filter's identifier.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};

use crate::{
    address::ArrayScopeFilter,
    error::DocumentStoreResult,
    identifier::Identifier,
    query::{Expr, Query},
};

/// The mutation applied by a positional update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Sets every `path: value` pair of the document.
    Set(Document),
    /// Appends `value` to the array at `path`.
    Push { path: String, value: Bson },
    /// Removes the elements whose `_id` is `match_id` from the array at `path`.
    Pull { path: String, match_id: Identifier },
}

/// A positional update together with the filters its placeholders refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedUpdate {
    pub op: UpdateOp,
    pub array_filters: Vec<ArrayScopeFilter>,
}

impl ScopedUpdate {
    pub fn new(op: UpdateOp, array_filters: Vec<ArrayScopeFilter>) -> Self {
        Self { op, array_filters }
    }

    /// Looks up the filter a `$[label]` placeholder refers to.
    pub fn filter_for(&self, label: &str) -> Option<&ArrayScopeFilter> {
        self.array_filters
            .iter()
            .find(|filter| filter.label() == label)
    }
}

/// Counts reported by a bulk update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub matched: u64,
    pub modified: u64,
}

/// Document validation hook.
///
/// Backends that accept a schema call it on the final state of every document they are
/// about to write and abort the write when it fails. Failures are reported as
/// [`DocumentStoreError::Validation`](crate::error::DocumentStoreError::Validation) or
/// [`DocumentStoreError::Cast`](crate::error::DocumentStoreError::Cast).
pub trait Schema: Send + Sync + Debug {
    fn validate(&self, collection: &str, document: &Document) -> DocumentStoreResult<()>;
}

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Every method is a single store access; backends are expected to apply each
/// mutation atomically with respect to the documents it touches.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult). Lookups
/// by id report absence through `Option`/`bool`, never through
/// [`DocumentStoreError::DocumentNotFound`](crate::error::DocumentStoreError::DocumentNotFound).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the documents matching the query, in storage order.
    async fn find_documents(
        &self,
        query: &Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Fetches a single document by id.
    async fn get_document(
        &self,
        id: &Identifier,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Inserts a new document and returns it as stored.
    ///
    /// The document must already carry an `_id`.
    async fn insert_document(
        &self,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<Document>;

    /// Replaces the document with the given id.
    ///
    /// With `upsert` a missing document is created. Returns the stored document, or `None`
    /// when nothing matched and `upsert` was not requested.
    async fn replace_document(
        &self,
        id: &Identifier,
        document: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Replaces the first document matching `filter`, keeping its `_id`.
    async fn replace_first(
        &self,
        filter: &Expr,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Applies a positional update to the document with the given id.
    ///
    /// Returns the updated document, or `None` when no document has that id.
    async fn update_document(
        &self,
        id: &Identifier,
        update: &ScopedUpdate,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Sets `changes` on the first document matching `filter` and returns it.
    async fn update_first(
        &self,
        filter: &Expr,
        changes: &Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Sets `changes` on every document matching `filter`.
    async fn update_many(
        &self,
        filter: &Expr,
        changes: &Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateSummary>;

    /// Deletes the document with the given id. Returns whether a document was removed.
    async fn delete_document(&self, id: &Identifier, collection: &str) -> DocumentStoreResult<bool>;

    /// Deletes every document matching `filter` and returns how many were removed.
    async fn delete_many(&self, filter: &Expr, collection: &str) -> DocumentStoreResult<u64>;

    /// Releases the backend's resources.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend + ?Sized,
{
    async fn find_documents(
        &self,
        query: &Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self).find_documents(query, collection).await
    }

    async fn get_document(
        &self,
        id: &Identifier,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).get_document(id, collection).await
    }

    async fn insert_document(
        &self,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<Document> {
        (**self).insert_document(document, collection).await
    }

    async fn replace_document(
        &self,
        id: &Identifier,
        document: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self)
            .replace_document(id, document, upsert, collection)
            .await
    }

    async fn replace_first(
        &self,
        filter: &Expr,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).replace_first(filter, document, collection).await
    }

    async fn update_document(
        &self,
        id: &Identifier,
        update: &ScopedUpdate,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).update_document(id, update, collection).await
    }

    async fn update_first(
        &self,
        filter: &Expr,
        changes: &Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).update_first(filter, changes, collection).await
    }

    async fn update_many(
        &self,
        filter: &Expr,
        changes: &Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateSummary> {
        (**self).update_many(filter, changes, collection).await
    }

    async fn delete_document(&self, id: &Identifier, collection: &str) -> DocumentStoreResult<bool> {
        (**self).delete_document(id, collection).await
    }

    async fn delete_many(&self, filter: &Expr, collection: &str) -> DocumentStoreResult<u64> {
        (**self).delete_many(filter, collection).await
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend + ?Sized,
{
    async fn find_documents(
        &self,
        query: &Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self).find_documents(query, collection).await
    }

    async fn get_document(
        &self,
        id: &Identifier,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).get_document(id, collection).await
    }

    async fn insert_document(
        &self,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<Document> {
        (**self).insert_document(document, collection).await
    }

    async fn replace_document(
        &self,
        id: &Identifier,
        document: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self)
            .replace_document(id, document, upsert, collection)
            .await
    }

    async fn replace_first(
        &self,
        filter: &Expr,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).replace_first(filter, document, collection).await
    }

    async fn update_document(
        &self,
        id: &Identifier,
        update: &ScopedUpdate,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).update_document(id, update, collection).await
    }

    async fn update_first(
        &self,
        filter: &Expr,
        changes: &Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).update_first(filter, changes, collection).await
    }

    async fn update_many(
        &self,
        filter: &Expr,
        changes: &Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateSummary> {
        (**self).update_many(filter, changes, collection).await
    }

    async fn delete_document(&self, id: &Identifier, collection: &str) -> DocumentStoreResult<bool> {
        (**self).delete_document(id, collection).await
    }

    async fn delete_many(&self, filter: &Expr, collection: &str) -> DocumentStoreResult<u64> {
        (**self).delete_many(filter, collection).await
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
