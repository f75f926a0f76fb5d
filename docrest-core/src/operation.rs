//! Translation of addressed requests into store operations.
//!
//! [`translate`] is pure: it combines an [`Address`] with the caller's [`Intent`] and
//! produces exactly one [`StoreOperation`], or fails before the store is touched.
//! [`StoreOperation::execute`] then performs the single store access the operation needs.

use bson::{Bson, Document};
use serde_json::Value;
use tracing::debug;

use crate::{
    address::{Address, ArrayScopeFilter},
    api::{ApiError, ApiResult, ErrorDetail, ErrorKind, messages},
    backend::{ScopedUpdate, StoreBackend, UpdateOp, UpdateSummary},
    document::{ID_FIELD, body_to_bson, body_to_document, stamp_ids, stamp_nested_ids, stamp_value},
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::{Identifier, PathSegment},
    params::query_required,
    query::{Expr, Filter, Projection, Query},
};

/// Key of the request body holding the new value of a nested field.
pub const UPDATE_KEY: &str = "update";

/// What the caller wants to do with the addressed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// GET
    Read {
        filter: Option<Expr>,
        projection: Option<Projection>,
        single: bool,
    },
    /// POST
    Append { body: Value },
    /// PUT
    Replace { body: Value, filter: Option<Expr> },
    /// PATCH
    Merge {
        body: Value,
        filter: Option<Expr>,
        single: bool,
    },
    /// DELETE
    Remove { filter: Option<Expr> },
}

impl Intent {
    /// Whether the address should be parsed with its final segment omitted.
    pub fn omits_final_segment(&self) -> bool {
        matches!(self, Intent::Remove { .. })
    }

    /// Reads and deletes of a malformed id cannot find anything; writes are malformed requests.
    fn invalid_root_kind(&self) -> ErrorKind {
        match self {
            Intent::Read { .. } | Intent::Remove { .. } => ErrorKind::NotFound,
            _ => ErrorKind::BadRequest,
        }
    }
}

/// A single store access.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOperation {
    CollectionQuery {
        filter: Option<Expr>,
        projection: Option<Projection>,
        single: bool,
    },
    /// Fetches a document. `path` is resolved against it afterwards by the walker.
    DocumentFetch {
        id: Identifier,
        projection: Option<Projection>,
        path: Vec<PathSegment>,
    },
    DocumentCreate {
        body: Document,
    },
    DocumentReplace {
        id: Identifier,
        body: Document,
        upsert: bool,
    },
    CollectionReplace {
        filter: Expr,
        body: Document,
    },
    CollectionMerge {
        filter: Expr,
        body: Document,
        single: bool,
    },
    /// Sets `value` at `field_path`. An empty path sets every key of `value` instead.
    ScopedSet {
        id: Identifier,
        field_path: String,
        value: Bson,
        array_filters: Vec<ArrayScopeFilter>,
    },
    ScopedPush {
        id: Identifier,
        field_path: String,
        value: Bson,
        array_filters: Vec<ArrayScopeFilter>,
    },
    ScopedPull {
        id: Identifier,
        field_path: String,
        match_id: Identifier,
        array_filters: Vec<ArrayScopeFilter>,
    },
    CollectionDelete {
        filter: Expr,
    },
    DocumentDelete {
        id: Identifier,
    },
}

/// What a store operation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    Documents(Vec<Document>),
    Document(Option<Document>),
    Updated(UpdateSummary),
    Deleted(u64),
}

/// Compiles an address and an intent into a store operation.
pub fn translate(address: &Address, intent: Intent) -> ApiResult<StoreOperation> {
    let Some(root) = address.root() else {
        return translate_collection(intent);
    };

    let id = Identifier::parse(root)
        .ok_or_else(|| ApiError::new(intent.invalid_root_kind(), messages::id_invalid(root)))?;

    if !address.is_nested() {
        return translate_document(id, intent);
    }

    let scoped_path = address.scoped_field_path().to_string();
    let array_filters = address.array_scope_filters().to_vec();

    let operation = match intent {
        // The walk needs the whole root document, so `fields` only applies to root reads.
        Intent::Read { .. } => StoreOperation::DocumentFetch {
            id,
            projection: None,
            path: address.segments().to_vec(),
        },
        Intent::Append { body } => {
            if address.target_is_identifier() {
                return Err(ApiError::bad_request(messages::method_invalid("POST")));
            }

            StoreOperation::ScopedPush {
                id,
                value: body_to_bson(&body, Some(&scoped_path))?,
                field_path: scoped_path,
                array_filters,
            }
        }
        Intent::Replace { body, .. } if address.target_is_identifier() => {
            let mut value = body_to_document(&body)?;
            if let Some(PathSegment::Identifier(target)) = address.retained_segments().last() {
                value.insert(ID_FIELD, *target);
            }

            StoreOperation::ScopedSet {
                id,
                field_path: scoped_path,
                value: Bson::Document(value),
                array_filters,
            }
        }
        Intent::Replace { body, .. } | Intent::Merge { body, .. }
            if !address.target_is_identifier() =>
        {
            StoreOperation::ScopedSet {
                id,
                value: nested_update(&body, &scoped_path)?,
                field_path: scoped_path,
                array_filters,
            }
        }
        Intent::Merge { body, .. } => {
            let changes = body_to_document(&body)?
                .into_iter()
                .map(|(key, value)| (format!("{scoped_path}.{key}"), value))
                .collect::<Document>();

            StoreOperation::ScopedSet {
                id,
                field_path: String::new(),
                value: Bson::Document(changes),
                array_filters,
            }
        }
        Intent::Remove { .. } => {
            let Some(PathSegment::Identifier(match_id)) = address.final_segment() else {
                return Err(ApiError::bad_request(messages::method_invalid("DELETE")));
            };

            StoreOperation::ScopedPull {
                id,
                field_path: scoped_path,
                match_id: *match_id,
                array_filters,
            }
        }
        // Every remaining Replace targets an identifier and was handled above.
        Intent::Replace { .. } => return Err(ApiError::bad_request(messages::method_invalid("PUT"))),
    };

    Ok(operation)
}

fn translate_collection(intent: Intent) -> ApiResult<StoreOperation> {
    Ok(match intent {
        Intent::Read {
            filter,
            projection,
            single,
        } => StoreOperation::CollectionQuery {
            filter,
            projection,
            single,
        },
        Intent::Append { body } => StoreOperation::DocumentCreate {
            body: body_to_document(&body)?,
        },
        Intent::Replace { body, filter } => StoreOperation::CollectionReplace {
            filter: filter.ok_or_else(query_required)?,
            body: body_to_document(&body)?,
        },
        Intent::Merge {
            body,
            filter,
            single,
        } => StoreOperation::CollectionMerge {
            filter: filter.unwrap_or_else(Expr::all),
            body: body_to_document(&body)?,
            single,
        },
        Intent::Remove { filter } => StoreOperation::CollectionDelete {
            filter: filter.ok_or_else(query_required)?,
        },
    })
}

fn translate_document(id: Identifier, intent: Intent) -> ApiResult<StoreOperation> {
    Ok(match intent {
        Intent::Read { projection, .. } => StoreOperation::DocumentFetch {
            id,
            projection,
            path: Vec::new(),
        },
        Intent::Append { .. } => return Err(ApiError::bad_request(messages::method_invalid("POST"))),
        Intent::Replace { body, .. } => {
            let mut body = body_to_document(&body)?;
            body.insert(ID_FIELD, id);

            StoreOperation::DocumentReplace {
                id,
                body,
                upsert: true,
            }
        }
        Intent::Merge { body, .. } => StoreOperation::ScopedSet {
            id,
            field_path: String::new(),
            value: Bson::Document(body_to_document(&body)?),
            array_filters: Vec::new(),
        },
        Intent::Remove { .. } => StoreOperation::DocumentDelete { id },
    })
}

fn nested_update(body: &Value, scoped_path: &str) -> ApiResult<Bson> {
    let update = body
        .get(UPDATE_KEY)
        .ok_or_else(|| {
            ApiError::bad_request(messages::MISSING_UPDATE)
                .with_detail(ErrorDetail::body(messages::MISSING_UPDATE, UPDATE_KEY))
        })?;

    Ok(body_to_bson(update, Some(scoped_path))?)
}

impl StoreOperation {
    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            StoreOperation::CollectionQuery { .. } => "collection query",
            StoreOperation::DocumentFetch { .. } => "document fetch",
            StoreOperation::DocumentCreate { .. } => "document create",
            StoreOperation::DocumentReplace { .. } => "document replace",
            StoreOperation::CollectionReplace { .. } => "collection replace",
            StoreOperation::CollectionMerge { .. } => "collection merge",
            StoreOperation::ScopedSet { .. } => "scoped set",
            StoreOperation::ScopedPush { .. } => "scoped push",
            StoreOperation::ScopedPull { .. } => "scoped pull",
            StoreOperation::CollectionDelete { .. } => "collection delete",
            StoreOperation::DocumentDelete { .. } => "document delete",
        }
    }

    /// Performs the operation against `backend`.
    ///
    /// Documents and array elements written by the operation get an `_id` when they lack one.
    pub async fn execute<B>(self, backend: &B, collection: &str) -> DocumentStoreResult<StoreOutcome>
    where
        B: StoreBackend + ?Sized,
    {
        debug!(operation = self.name(), collection, "executing store operation");

        match self {
            StoreOperation::CollectionQuery {
                filter,
                projection,
                single,
            } => {
                let query = Query {
                    filter,
                    projection,
                    limit: single.then_some(1),
                };
                let documents = backend.find_documents(&query, collection).await?;

                Ok(if single {
                    StoreOutcome::Document(documents.into_iter().next())
                } else {
                    StoreOutcome::Documents(documents)
                })
            }
            StoreOperation::DocumentFetch { id, projection, .. } => {
                let document = match projection {
                    Some(projection) => {
                        let query = Query::builder()
                            .filter(Filter::id(id))
                            .projection(projection)
                            .limit(1)
                            .build();
                        backend
                            .find_documents(&query, collection)
                            .await?
                            .into_iter()
                            .next()
                    }
                    None => backend.get_document(&id, collection).await?,
                };

                Ok(StoreOutcome::Document(document))
            }
            StoreOperation::DocumentCreate { mut body } => {
                stamp_ids(&mut body);
                let created = backend.insert_document(body, collection).await?;

                Ok(StoreOutcome::Document(Some(created)))
            }
            StoreOperation::DocumentReplace {
                id,
                mut body,
                upsert,
            } => {
                stamp_ids(&mut body);
                let replaced = backend
                    .replace_document(&id, body, upsert, collection)
                    .await?;

                Ok(StoreOutcome::Document(replaced))
            }
            StoreOperation::CollectionReplace { filter, mut body } => {
                stamp_nested_ids(&mut body);
                let replaced = backend.replace_first(&filter, body, collection).await?;

                Ok(StoreOutcome::Document(replaced))
            }
            StoreOperation::CollectionMerge {
                filter,
                mut body,
                single,
            } => {
                stamp_nested_ids(&mut body);

                if single {
                    let updated = backend.update_first(&filter, &body, collection).await?;
                    Ok(StoreOutcome::Document(updated))
                } else {
                    let summary = backend.update_many(&filter, &body, collection).await?;
                    Ok(StoreOutcome::Updated(summary))
                }
            }
            StoreOperation::ScopedSet {
                id,
                field_path,
                value,
                array_filters,
            } => {
                let mut changes = match (field_path.is_empty(), value) {
                    (true, Bson::Document(changes)) => changes,
                    (true, other) => {
                        return Err(DocumentStoreError::InvalidDocument(format!(
                            "cannot merge {other} into a document"
                        )));
                    }
                    (false, value) => {
                        let mut changes = Document::new();
                        changes.insert(field_path, value);
                        changes
                    }
                };
                stamp_nested_ids(&mut changes);

                let update = ScopedUpdate::new(UpdateOp::Set(changes), array_filters);
                let updated = backend.update_document(&id, &update, collection).await?;

                Ok(StoreOutcome::Document(updated))
            }
            StoreOperation::ScopedPush {
                id,
                field_path,
                mut value,
                array_filters,
            } => {
                stamp_value(&mut value, true);

                let update = ScopedUpdate::new(
                    UpdateOp::Push {
                        path: field_path,
                        value,
                    },
                    array_filters,
                );
                let updated = backend.update_document(&id, &update, collection).await?;

                Ok(StoreOutcome::Document(updated))
            }
            StoreOperation::ScopedPull {
                id,
                field_path,
                match_id,
                array_filters,
            } => {
                let update = ScopedUpdate::new(
                    UpdateOp::Pull {
                        path: field_path,
                        match_id,
                    },
                    array_filters,
                );
                let updated = backend.update_document(&id, &update, collection).await?;

                Ok(StoreOutcome::Document(updated))
            }
            StoreOperation::CollectionDelete { filter } => {
                let deleted = backend.delete_many(&filter, collection).await?;
                Ok(StoreOutcome::Deleted(deleted))
            }
            StoreOperation::DocumentDelete { id } => {
                let deleted = backend.delete_document(&id, collection).await?;
                Ok(StoreOutcome::Deleted(u64::from(deleted)))
            }
        }
    }
}
