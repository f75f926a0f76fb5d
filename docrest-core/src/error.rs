//! Failures reported by storage backends.
//!
//! These are never rendered directly: [`normalize`](crate::normalize) turns them into an
//! [`ApiError`](crate::api::ApiError) first.

use std::fmt;

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// BSON or JSON conversion failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The backend could not be configured or connected.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// `(id, collection)`
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// `(id, collection)`
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The document violates store-side constraints but carries no per-field detail.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Schema validation rejected one or more fields.
    #[error("Validation failed: {0}")]
    Validation(ValidationFailure),
    /// A single value could not be coerced to the type its field requires.
    #[error("{message}")]
    Cast {
        /// Dotted path of the offending field.
        path: String,
        /// Human readable coercion message.
        message: String,
    },
    /// Any other failure of the underlying store.
    #[error("Backend error: {0}")]
    Backend(String),
}

pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

/// Per-field failures reported by a schema validation pass.
///
/// Entries keep the order in which the validator reported them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationFailure {
    errors: Vec<(String, FieldError)>,
}

impl ValidationFailure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a failure for `field` and returns `self` for chaining.
    pub fn with_error(mut self, field: impl Into<String>, error: FieldError) -> Self {
        self.push(field, error);
        self
    }

    pub fn push(&mut self, field: impl Into<String>, error: FieldError) {
        self.errors.push((field.into(), error));
    }

    pub fn errors(&self) -> &[(String, FieldError)] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self
            .errors
            .iter()
            .map(|(field, _)| field.as_str())
            .collect::<Vec<_>>();

        write!(f, "invalid fields [{}]", fields.join(", "))
    }
}

/// The failure of a single field.
///
/// Fields holding arrays of subdocuments report the failures of their elements through
/// `nested`; the index of the failing element is not known at this level.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    message: String,
    nested: Option<ValidationFailure>,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            nested: None,
        }
    }

    pub fn nested(message: impl Into<String>, nested: ValidationFailure) -> Self {
        Self {
            message: message.into(),
            nested: Some(nested),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn nested_errors(&self) -> Option<&ValidationFailure> {
        self.nested.as_ref()
    }
}
