use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, doc};
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind as MongoErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions, ReturnDocument},
};
use tracing::debug;

use docrest_core::{
    backend::{ScopedUpdate, StoreBackend, StoreBackendBuilder, UpdateSummary},
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    query::{Expr, Query},
};

use crate::query::{MongoQueryTranslator, render_update};

/// Server error codes that describe a bad document rather than a failing server.
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
const DUPLICATE_KEY: i32 = 11000;
const REJECTED_UPDATE_CODES: [i32; 4] = [
    2,  // BadValue
    14, // TypeMismatch
    28, // PathNotViable
    66, // ImmutableField
];

/// Maps driver failures onto store errors.
fn map_error(err: MongoError, collection: &str) -> DocumentStoreError {
    let code = match err.kind.as_ref() {
        MongoErrorKind::Write(WriteFailure::WriteError(failure)) => Some(failure.code),
        MongoErrorKind::Command(failure) => Some(failure.code),
        _ => None,
    };

    match code {
        Some(DOCUMENT_VALIDATION_FAILURE) => DocumentStoreError::InvalidDocument(err.to_string()),
        Some(DUPLICATE_KEY) => DocumentStoreError::DocumentAlreadyExists(err.to_string(), collection.to_string()),
        Some(code) if REJECTED_UPDATE_CODES.contains(&code) => {
            DocumentStoreError::InvalidDocument(err.to_string())
        }
        _ => DocumentStoreError::Backend(err.to_string()),
    }
}

fn id_filter(id: &Identifier) -> Document {
    doc! { ID_FIELD: *id }
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    async fn find_with(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(|err| map_error(err, collection))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|err| map_error(err, collection))
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find_documents(
        &self,
        query: &Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        if let Some(projection) = &query.projection {
            options.projection = Some(projection.to_document());
        }

        let filter = MongoQueryTranslator::render(query.filter.as_ref())?;
        debug!(collection, %filter, "finding documents");

        self.find_with(collection, filter, options).await
    }

    async fn get_document(
        &self,
        id: &Identifier,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(id_filter(id))
            .await
            .map_err(|err| map_error(err, collection))
    }

    async fn insert_document(
        &self,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<Document> {
        self.get_collection(collection)
            .insert_one(&document)
            .await
            .map_err(|err| match map_error(err, collection) {
                DocumentStoreError::DocumentAlreadyExists(..) => DocumentStoreError::DocumentAlreadyExists(
                    document.get_object_id(ID_FIELD).map(|oid| oid.to_hex()).unwrap_or_default(),
                    collection.to_string(),
                ),
                other => other,
            })?;

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

        self.get_collection(collection)
            .find_one_and_replace(id_filter(id), document)
            .upsert(upsert)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|err| map_error(err, collection))
    }

    async fn replace_first(
        &self,
        filter: &Expr,
        mut document: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        // The matched document keeps its own id.
        document.remove(ID_FIELD);

        self.get_collection(collection)
            .find_one_and_replace(MongoQueryTranslator::render(Some(filter))?, document)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|err| map_error(err, collection))
    }

    async fn update_document(
        &self,
        id: &Identifier,
        update: &ScopedUpdate,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let Some((modifications, array_filters)) = render_update(update)? else {
            return self.get_document(id, collection).await;
        };
        debug!(collection, %modifications, filters = array_filters.len(), "updating document");

        self.get_collection(collection)
            .find_one_and_update(id_filter(id), modifications)
            .array_filters(array_filters)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|err| map_error(err, collection))
    }

    async fn update_first(
        &self,
        filter: &Expr,
        changes: &Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let filter = MongoQueryTranslator::render(Some(filter))?;

        if changes.is_empty() {
            return self
                .get_collection(collection)
                .find_one(filter)
                .await
                .map_err(|err| map_error(err, collection));
        }

        self.get_collection(collection)
            .find_one_and_update(filter, doc! { "$set": changes.clone() })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|err| map_error(err, collection))
    }

    async fn update_many(
        &self,
        filter: &Expr,
        changes: &Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateSummary> {
        let filter = MongoQueryTranslator::render(Some(filter))?;

        if changes.is_empty() {
            let matched = self
                .get_collection(collection)
                .count_documents(filter)
                .await
                .map_err(|err| map_error(err, collection))?;
            return Ok(UpdateSummary { matched, modified: 0 });
        }

        let result = self
            .get_collection(collection)
            .update_many(filter, doc! { "$set": changes.clone() })
            .await
            .map_err(|err| map_error(err, collection))?;

        Ok(UpdateSummary {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_document(&self, id: &Identifier, collection: &str) -> DocumentStoreResult<bool> {
        let result = self
            .get_collection(collection)
            .delete_one(id_filter(id))
            .await
            .map_err(|err| map_error(err, collection))?;

        Ok(result.deleted_count > 0)
    }

    async fn delete_many(&self, filter: &Expr, collection: &str) -> DocumentStoreResult<u64> {
        let result = self
            .get_collection(collection)
            .delete_many(MongoQueryTranslator::render(Some(filter))?)
            .await
            .map_err(|err| map_error(err, collection))?;

        Ok(result.deleted_count)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
