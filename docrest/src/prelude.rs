//! Convenient re-exports of commonly used types from docrest.
//!
//! ```ignore
//! use docrest::prelude::*;
//! ```

pub use docrest_core::{
    api::{ApiError, ApiResult, ErrorDetail, ErrorKind},
    backend::{Schema, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult, FieldError, ValidationFailure},
    handler::{Reply, RestCollection, Verb},
    identifier::Identifier,
    query::{Expr, Filter, Projection, Query},
};

pub use crate::router::{ApiResponse, RestRouter};
