//! Verb handlers.
//!
//! A [`RestCollection`] binds a collection name to a backend and serves the five verbs
//! against any address below that collection. Each request is resolved, translated and
//! executed with at most one store access, and the outcome is shaped into a [`Reply`].

use std::collections::HashMap;
use std::fmt;

use bson::{Bson, Document};
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::{
    address::Address,
    api::{ApiError, ApiResult, ErrorKind, messages},
    backend::StoreBackend,
    document::{bson_to_json, document_to_json},
    operation::{Intent, StoreOutcome, translate},
    params::RequestParams,
    walker::walk,
};

/// HTTP verbs served by a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    /// Parses an HTTP method name.
    pub fn from_method(method: &str) -> Option<Self> {
        Some(match method {
            "GET" => Verb::Get,
            "POST" => Verb::Post,
            "PUT" => Verb::Put,
            "PATCH" => Verb::Patch,
            "DELETE" => Verb::Delete,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful response: status code and optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Option<Value>,
}

impl Reply {
    /// A body wrapped in the `{ "data": ... }` envelope.
    pub fn data(status: u16, data: Value) -> Self {
        Self {
            status,
            body: Some(json!({ "data": data })),
        }
    }

    /// A body sent as is.
    pub fn raw(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }
}

/// A document collection served over the verb handlers.
#[derive(Debug, Clone)]
pub struct RestCollection<B> {
    name: String,
    backend: B,
}

impl<B> RestCollection<B>
where
    B: StoreBackend,
{
    pub fn new(name: impl Into<String>, backend: B) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Dispatches a request to the handler of `verb` and logs failures.
    ///
    /// `path` is relative to the collection.
    pub async fn handle(
        &self,
        verb: Verb,
        path: &str,
        params: &HashMap<String, String>,
        body: Value,
    ) -> ApiResult<Reply> {
        let result = match verb {
            Verb::Get => self.get(path, params).await,
            Verb::Post => self.post(path, body).await,
            Verb::Put => self.put(path, params, body).await,
            Verb::Patch => self.patch(path, params, body).await,
            Verb::Delete => self.delete(path, params).await,
        };

        match &result {
            Ok(reply) => debug!(collection = %self.name, %verb, path, status = reply.status, "request handled"),
            Err(err) if err.kind() == ErrorKind::Internal => {
                error!(collection = %self.name, %verb, path, error = %err, "request failed");
            }
            Err(err) => warn!(collection = %self.name, %verb, path, error = %err, "request rejected"),
        }

        result
    }

    /// Reads the collection, a document or a nested value.
    pub async fn get(&self, path: &str, params: &HashMap<String, String>) -> ApiResult<Reply> {
        let params = RequestParams::parse(params)?;
        let intent = Intent::Read {
            filter: params.filter,
            projection: params.projection,
            single: params.multiplicity.is_single(),
        };
        let (address, outcome) = self.perform(path, intent).await?;

        match outcome {
            StoreOutcome::Documents(documents) => Ok(Reply::data(200, documents_to_json(&documents))),
            StoreOutcome::Document(document) if address.is_collection() => {
                Ok(Reply::data(200, optional_document(document.as_ref())))
            }
            StoreOutcome::Document(Some(document)) => {
                let document = Bson::Document(document);
                let value = walk(&document, address.segments())?;

                Ok(Reply::data(200, bson_to_json(value)))
            }
            StoreOutcome::Document(None) => Err(root_not_found(&address)),
            other => Err(unexpected(other)),
        }
    }

    /// Creates a document, or appends an element to a nested array.
    pub async fn post(&self, path: &str, body: Value) -> ApiResult<Reply> {
        let (address, outcome) = self.perform(path, Intent::Append { body }).await?;

        match outcome {
            StoreOutcome::Document(Some(document)) if address.is_collection() => {
                Ok(Reply::raw(201, document_to_json(&document)))
            }
            StoreOutcome::Document(Some(document)) => Ok(Reply::data(201, document_to_json(&document))),
            StoreOutcome::Document(None) => Err(root_not_found(&address)),
            other => Err(unexpected(other)),
        }
    }

    /// Replaces the first document matching the query, a whole document, or a nested value.
    pub async fn put(
        &self,
        path: &str,
        params: &HashMap<String, String>,
        body: Value,
    ) -> ApiResult<Reply> {
        let params = RequestParams::parse(params)?;
        let intent = Intent::Replace {
            body,
            filter: params.filter,
        };
        let (address, outcome) = self.perform(path, intent).await?;

        match outcome {
            StoreOutcome::Document(document) if address.is_collection() => {
                Ok(Reply::data(200, optional_document(document.as_ref())))
            }
            StoreOutcome::Document(Some(document)) if !address.is_nested() => {
                Ok(Reply::raw(200, document_to_json(&document)))
            }
            StoreOutcome::Document(Some(document)) => Ok(Reply::data(200, document_to_json(&document))),
            StoreOutcome::Document(None) => Err(root_not_found(&address)),
            other => Err(unexpected(other)),
        }
    }

    /// Merges fields into matching documents, a document, or a nested value.
    pub async fn patch(
        &self,
        path: &str,
        params: &HashMap<String, String>,
        body: Value,
    ) -> ApiResult<Reply> {
        let params = RequestParams::parse(params)?;
        let intent = Intent::Merge {
            body,
            filter: params.filter,
            single: params.multiplicity.is_single(),
        };
        let (address, outcome) = self.perform(path, intent).await?;

        match outcome {
            StoreOutcome::Updated(summary) => Ok(Reply::data(
                200,
                json!({ "matched": summary.matched, "modified": summary.modified }),
            )),
            StoreOutcome::Document(document) if address.is_collection() => {
                Ok(Reply::data(200, optional_document(document.as_ref())))
            }
            StoreOutcome::Document(Some(document)) => Ok(Reply::data(200, document_to_json(&document))),
            StoreOutcome::Document(None) => Err(root_not_found(&address)),
            other => Err(unexpected(other)),
        }
    }

    /// Deletes matching documents, a document, or an element of a nested array.
    pub async fn delete(&self, path: &str, params: &HashMap<String, String>) -> ApiResult<Reply> {
        let params = RequestParams::parse(params)?;
        let intent = Intent::Remove {
            filter: params.filter,
        };
        let (address, outcome) = self.perform(path, intent).await?;

        match outcome {
            StoreOutcome::Deleted(count) if address.is_collection() => {
                Ok(Reply::data(200, json!({ "deletedCount": count })))
            }
            StoreOutcome::Deleted(0) => Err(root_not_found(&address)),
            StoreOutcome::Deleted(_) => Ok(Reply::no_content()),
            StoreOutcome::Document(Some(document)) => Ok(Reply::data(200, document_to_json(&document))),
            StoreOutcome::Document(None) => Err(root_not_found(&address)),
            other => Err(unexpected(other)),
        }
    }

    async fn perform(&self, path: &str, intent: Intent) -> ApiResult<(Address, StoreOutcome)> {
        let address = Address::parse(path, intent.omits_final_segment())?;
        let operation = translate(&address, intent)?;

        debug!(collection = %self.name, operation = operation.name(), "translated request");

        let outcome = operation.execute(&self.backend, &self.name).await?;
        Ok((address, outcome))
    }
}

fn documents_to_json(documents: &[Document]) -> Value {
    Value::Array(documents.iter().map(document_to_json).collect())
}

fn optional_document(document: Option<&Document>) -> Value {
    document.map_or(Value::Null, document_to_json)
}

fn root_not_found(address: &Address) -> ApiError {
    ApiError::not_found(messages::id_not_found(address.root().unwrap_or_default()))
}

fn unexpected(outcome: StoreOutcome) -> ApiError {
    let operation = match outcome {
        StoreOutcome::Documents(_) => "a document list",
        StoreOutcome::Document(_) => "a document",
        StoreOutcome::Updated(_) => "an update summary",
        StoreOutcome::Deleted(_) => "a delete count",
    };
    ApiError::internal(messages::unexpected_outcome(operation))
}
