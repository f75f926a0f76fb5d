//! In-memory storage implementation for document collections.
//!
//! This module provides a simple in-memory backend that keeps every collection as an
//! insertion-ordered list of BSON documents behind an async-safe read-write lock.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document};
use tracing::debug;

use docrest_core::{
    backend::{Schema, ScopedUpdate, StoreBackend, StoreBackendBuilder, UpdateSummary},
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    query::{Expr, Query},
};

use crate::{
    evaluator::DocumentEvaluator,
    projection::project,
    update::{apply_set, apply_update},
};

type Collection = Vec<Document>;
type StoreMap = HashMap<String, Collection>;

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait to provide a fully functional
/// document store that operates entirely in memory using async-aware read-write locks.
/// Documents keep their insertion order, which is the order queries return them in.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Validation
///
/// When built with a [`Schema`], every write is applied to a copy of the document, the
/// copy is validated, and only then is it committed. A failed validation leaves the
/// collection untouched.
///
/// # Example
///
/// ```ignore
/// use docrest_memory::InMemoryStore;
/// use docrest_core::backend::{StoreBackend, StoreBackendBuilder};
/// use bson::{doc, oid::ObjectId};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::builder().build().await?;
///
///     let stored = store
///         .insert_document(doc! { "_id": ObjectId::new(), "name": "Alice" }, "users")
///         .await?;
///     assert_eq!(stored.get_str("name")?, "Alice");
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: collection_name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
    /// Optional validation hook run before every write
    schema: Option<Arc<dyn Schema>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store without a schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore` with custom options.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    fn validate(&self, collection: &str, document: &Document) -> DocumentStoreResult<()> {
        match &self.schema {
            Some(schema) => schema.validate(collection, document),
            None => Ok(()),
        }
    }
}

fn matching_positions(documents: &[Document], filter: &Expr) -> DocumentStoreResult<Vec<usize>> {
    let mut positions = Vec::new();

    for (position, document) in documents.iter().enumerate() {
        if DocumentEvaluator::matches(document, filter)? {
            positions.push(position);
        }
    }

    Ok(positions)
}

fn first_match(documents: &[Document], filter: &Expr) -> DocumentStoreResult<Option<usize>> {
    for (position, document) in documents.iter().enumerate() {
        if DocumentEvaluator::matches(document, filter)? {
            return Ok(Some(position));
        }
    }

    Ok(None)
}

fn position_of(documents: &[Document], id: &Identifier) -> Option<usize> {
    documents
        .iter()
        .position(|document| id.matches_document(document))
}

fn id_string(document: &Document) -> String {
    match document.get(ID_FIELD) {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find_documents(
        &self,
        query: &Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();

        for document in documents {
            if query.limit.is_some_and(|limit| found.len() >= limit) {
                break;
            }

            let matched = match &query.filter {
                Some(filter) => DocumentEvaluator::matches(document, filter)?,
                None => true,
            };

            if matched {
                found.push(match &query.projection {
                    Some(projection) => project(document, projection),
                    None => document.clone(),
                });
            }
        }

        Ok(found)
    }

    async fn get_document(
        &self,
        id: &Identifier,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let store = self.store.read().await;

        Ok(store
            .get(collection)
            .and_then(|documents| documents.iter().find(|document| id.matches_document(document)))
            .cloned())
    }

    async fn insert_document(
        &self,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<Document> {
        let Some(id) = document.get(ID_FIELD).cloned() else {
            return Err(DocumentStoreError::InvalidDocument(
                "document must carry an _id before it is stored".to_string(),
            ));
        };

        self.validate(collection, &document)?;

        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        if documents.iter().any(|existing| existing.get(ID_FIELD) == Some(&id)) {
            return Err(DocumentStoreError::DocumentAlreadyExists(
                id_string(&document),
                collection.to_string(),
            ));
        }

        documents.push(document.clone());
        debug!(collection, id = %id_string(&document), "document inserted");

        Ok(document)
    }

    async fn replace_document(
        &self,
        id: &Identifier,
        mut document: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        document.insert(ID_FIELD, *id);
        self.validate(collection, &document)?;

        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        match position_of(documents, id) {
            Some(position) => documents[position] = document.clone(),
            None if upsert => documents.push(document.clone()),
            None => return Ok(None),
        }

        Ok(Some(document))
    }

    async fn replace_first(
        &self,
        filter: &Expr,
        mut document: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(None);
        };
        let Some(position) = first_match(documents, filter)? else {
            return Ok(None);
        };

        match documents[position].get(ID_FIELD).cloned() {
            Some(id) => {
                document.insert(ID_FIELD, id);
            }
            None => {
                document.remove(ID_FIELD);
            }
        }
        self.validate(collection, &document)?;

        documents[position] = document.clone();
        Ok(Some(document))
    }

    async fn update_document(
        &self,
        id: &Identifier,
        update: &ScopedUpdate,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(None);
        };
        let Some(position) = position_of(documents, id) else {
            return Ok(None);
        };

        let mut updated = documents[position].clone();
        apply_update(&mut updated, update)?;
        self.validate(collection, &updated)?;

        documents[position] = updated.clone();
        Ok(Some(updated))
    }

    async fn update_first(
        &self,
        filter: &Expr,
        changes: &Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(None);
        };
        let Some(position) = first_match(documents, filter)? else {
            return Ok(None);
        };

        let mut updated = documents[position].clone();
        apply_set(&mut updated, changes, &[])?;
        self.validate(collection, &updated)?;

        documents[position] = updated.clone();
        Ok(Some(updated))
    }

    async fn update_many(
        &self,
        filter: &Expr,
        changes: &Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateSummary> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(UpdateSummary::default());
        };

        // Every document is validated before any of them is committed.
        let mut staged = Vec::new();
        for position in matching_positions(documents, filter)? {
            let mut updated = documents[position].clone();
            apply_set(&mut updated, changes, &[])?;
            self.validate(collection, &updated)?;
            staged.push((position, updated));
        }

        let mut summary = UpdateSummary {
            matched: staged.len() as u64,
            modified: 0,
        };

        for (position, updated) in staged {
            if documents[position] != updated {
                summary.modified += 1;
                documents[position] = updated;
            }
        }

        debug!(collection, matched = summary.matched, modified = summary.modified, "documents updated");
        Ok(summary)
    }

    async fn delete_document(&self, id: &Identifier, collection: &str) -> DocumentStoreResult<bool> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(false);
        };

        match position_of(documents, id) {
            Some(position) => {
                documents.remove(position);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_many(&self, filter: &Expr, collection: &str) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let doomed = matching_positions(documents, filter)?;
        for position in doomed.iter().rev() {
            documents.remove(*position);
        }

        debug!(collection, deleted = doomed.len(), "documents deleted");
        Ok(doomed.len() as u64)
    }
}

/// Builder for [`InMemoryStore`].
#[derive(Default, Debug)]
pub struct InMemoryStoreBuilder {
    schema: Option<Arc<dyn Schema>>,
}

impl InMemoryStoreBuilder {
    /// Validates every write with `schema`.
    pub fn schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore {
            store: Arc::new(RwLock::new(StoreMap::new())),
            schema: self.schema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use docrest_core::{
        backend::UpdateOp,
        error::{FieldError, ValidationFailure},
        query::{Filter, Projection},
    };

    #[derive(Debug)]
    struct RequireName;

    impl Schema for RequireName {
        fn validate(&self, _collection: &str, document: &Document) -> DocumentStoreResult<()> {
            if document.contains_key("name") {
                Ok(())
            } else {
                Err(DocumentStoreError::Validation(
                    ValidationFailure::new().with_error("name", FieldError::new("Path `name` is required.")),
                ))
            }
        }
    }

    async fn seeded() -> (InMemoryStore, ObjectId, ObjectId) {
        let store = InMemoryStore::new();
        let (first, second) = (ObjectId::new(), ObjectId::new());

        store
            .insert_document(doc! { "_id": first, "name": "a", "age": 20 }, "people")
            .await
            .unwrap();
        store
            .insert_document(doc! { "_id": second, "name": "b", "age": 40 }, "people")
            .await
            .unwrap();

        (store, first, second)
    }

    #[tokio::test]
    async fn test_find_in_insertion_order() {
        let (store, first, second) = seeded().await;

        let all = store.find_documents(&Query::new(), "people").await.unwrap();
        let ids: Vec<_> = all.iter().map(|d| d.get_object_id("_id").unwrap()).collect();
        assert_eq!(ids, vec![first, second]);

        let limited = store
            .find_documents(&Query::builder().limit(1).build(), "people")
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_find_with_filter_and_projection() {
        let (store, _, second) = seeded().await;
        let query = Query::builder()
            .filter(Filter::gt("age", 30))
            .projection(Projection::new().include("name"))
            .build();

        let found = store.find_documents(&query, "people").await.unwrap();

        assert_eq!(found, vec![doc! { "_id": second, "name": "b" }]);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.find_documents(&Query::new(), "nothing").await.unwrap().is_empty());
        assert!(store.get_document(&Identifier::generate(), "nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let (store, first, _) = seeded().await;

        let result = store.insert_document(doc! { "_id": first, "name": "c" }, "people").await;

        assert!(matches!(result, Err(DocumentStoreError::DocumentAlreadyExists(id, _)) if id == first.to_hex()));
    }

    #[tokio::test]
    async fn test_replace_with_and_without_upsert() {
        let (store, first, _) = seeded().await;
        let missing = Identifier::generate();

        let replaced = store
            .replace_document(&Identifier::from(first), doc! { "name": "z" }, false, "people")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replaced, doc! { "name": "z", "_id": first });

        let none = store
            .replace_document(&missing, doc! { "name": "y" }, false, "people")
            .await
            .unwrap();
        assert!(none.is_none());

        let created = store
            .replace_document(&missing, doc! { "name": "y" }, true, "people")
            .await
            .unwrap();
        assert!(created.is_some());
        assert!(store.get_document(&missing, "people").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_first_keeps_id() {
        let (store, _, second) = seeded().await;

        let replaced = store
            .replace_first(&Filter::eq("name", "b"), doc! { "_id": ObjectId::new(), "name": "c" }, "people")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(replaced.get_object_id("_id").unwrap(), second);
        assert_eq!(replaced.get_str("name").unwrap(), "c");
    }

    #[tokio::test]
    async fn test_update_document_positional() {
        let store = InMemoryStore::new();
        let (root, element) = (ObjectId::new(), ObjectId::new());
        store
            .insert_document(
                doc! { "_id": root, "name": "r", "nested": [{ "_id": element, "dayOfWeek": "Monday" }] },
                "things",
            )
            .await
            .unwrap();

        let update = ScopedUpdate::new(
            UpdateOp::Set(doc! { "$[nested].dayOfWeek": "Friday" }),
            vec![docrest_core::address::ArrayScopeFilter::new(
                "nested",
                "nested",
                Identifier::from(element),
            )],
        );
        let updated = store
            .update_document(&Identifier::from(root), &update, "things")
            .await
            .unwrap()
            .unwrap();

        let nested = updated.get_array("nested").unwrap();
        assert_eq!(nested[0].as_document().unwrap().get_str("dayOfWeek").unwrap(), "Friday");
    }

    #[tokio::test]
    async fn test_update_many_counts() {
        let (store, _, _) = seeded().await;

        let summary = store
            .update_many(&Expr::all(), &doc! { "name": "a" }, "people")
            .await
            .unwrap();

        assert_eq!(summary, UpdateSummary { matched: 2, modified: 1 });
    }

    #[tokio::test]
    async fn test_schema_rejects_write_without_committing() {
        let store = InMemoryStore::builder().schema(RequireName).build().await.unwrap();
        let id = ObjectId::new();

        store
            .insert_document(doc! { "_id": id, "name": "a" }, "people")
            .await
            .unwrap();

        let result = store
            .replace_document(&Identifier::from(id), doc! { "age": 1 }, true, "people")
            .await;
        assert!(matches!(result, Err(DocumentStoreError::Validation(_))));

        let stored = store.get_document(&Identifier::from(id), "people").await.unwrap().unwrap();
        assert_eq!(stored.get_str("name").unwrap(), "a");
    }

    #[tokio::test]
    async fn test_deletes() {
        let (store, first, _) = seeded().await;

        assert!(store.delete_document(&Identifier::from(first), "people").await.unwrap());
        assert!(!store.delete_document(&Identifier::from(first), "people").await.unwrap());

        let deleted = store.delete_many(&Filter::gte("age", 0), "people").await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.find_documents(&Query::new(), "people").await.unwrap().is_empty());
    }
}
