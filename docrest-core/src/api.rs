//! Request-level error taxonomy.
//!
//! Every core operation either returns its result or fails with exactly one [`ApiError`].
//! The transport layer is the only place that turns an error into a status code and body,
//! using [`ApiError::status_code`] and [`ApiError::to_json`].

use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// The kind of a request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Malformed input, validation or cast failure, invalid verb/address combination.
    BadRequest,
    /// Well-formed id with no matching document or element.
    NotFound,
    /// Unexpected store or runtime failure.
    Internal,
}

impl ErrorKind {
    /// Numeric HTTP status associated with the kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "Bad Request",
            ErrorKind::NotFound => "Not Found",
            ErrorKind::Internal => "Server Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Locates one offending input value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field_path: None,
            location: None,
        }
    }

    /// A detail about a field of the request body.
    pub fn body(message: impl Into<String>, field_path: impl Into<String>) -> Self {
        Self::new(message)
            .field_path(field_path)
            .location("body")
    }

    /// A detail about a query string parameter.
    pub fn query(message: impl Into<String>, param: impl Into<String>) -> Self {
        Self::new(message)
            .field_path(param)
            .location("query")
    }

    pub fn field_path(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = Some(field_path.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// A request failure: kind, human message and zero or more field-level details.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    details: Vec<ErrorDetail>,
}

/// A specialized `Result` type for request handling.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn with_details(mut self, details: impl IntoIterator<Item = ErrorDetail>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn with_detail(self, detail: ErrorDetail) -> Self {
        self.with_details([detail])
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// Renders the error body sent to clients.
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "reason": self.kind.reason(),
                "code": self.status_code(),
                "message": self.message,
                "detail": self.details,
            }
        })
    }
}

/// Canonical error messages.
pub mod messages {
    use crate::identifier::Identifier;

    pub const VALIDATION_FAILED: &str = "The document provided failed validation";
    pub const PROJECTION_INVALID: &str =
        "Query parameter (fields) is invalid. Cannot both include and exclude in a projection";
    pub const PROJECTION_INVALID_DETAIL: &str =
        "Invalid value for fields - cannot use inclusions and exclusions in the same query";
    pub const MISSING_UPDATE: &str =
        "Requests on nested fields must contain the 'update' field";
    pub const BODY_NOT_OBJECT: &str = "The request body must be a JSON object";
    pub const BODY_INVALID: &str = "The request body is not valid JSON";
    pub const QUERY_STRING_INVALID: &str = "The query string could not be parsed";

    pub fn query_parameter_required(param: &str) -> String {
        format!("Query parameter ({param}) is required")
    }

    pub fn query_parameter_required_detail(param: &str) -> String {
        format!("Query parameter {param} is required")
    }

    pub fn parsing_query_param_failed(param: &str) -> String {
        format!("Query parameter ({param}) provided is invalid. Error parsing JSON contents")
    }

    pub fn parsing_query_param_failed_detail(param: &str) -> String {
        format!("Invalid value for {param}")
    }

    pub fn unsupported_operator(operator: &str) -> String {
        format!("Unsupported query operator: {operator}")
    }

    pub fn key_not_found(key: &str) -> String {
        format!("The requested key: {key} does not exist on this document")
    }

    pub fn method_invalid(method: &str) -> String {
        format!("Cannot {method} to the route specified")
    }

    pub fn id_not_found(id: &str) -> String {
        format!("The resource specified by ID: {id} was not found")
    }

    pub fn id_invalid(id: &str) -> String {
        format!("The ID provided: {id} is not a valid id")
    }

    pub fn identifier_without_array(id: &Identifier) -> String {
        format!("The identifier {id} must follow the name of the array field it indexes")
    }

    pub fn unexpected_outcome(outcome: &str) -> String {
        format!("The store returned {outcome} where none was expected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::bad_request("x").status_code(), 400);
        assert_eq!(ApiError::not_found("x").status_code(), 404);
        assert_eq!(ApiError::internal("x").status_code(), 500);
    }

    #[test]
    fn test_to_json_shape() {
        let error = ApiError::bad_request(messages::VALIDATION_FAILED)
            .with_detail(ErrorDetail::body("Path `name` is required.", "name"));

        assert_eq!(
            error.to_json(),
            json!({
                "error": {
                    "reason": "Bad Request",
                    "code": 400,
                    "message": "The document provided failed validation",
                    "detail": [
                        { "message": "Path `name` is required.", "fieldPath": "name", "location": "body" }
                    ],
                }
            })
        );
    }

    #[test]
    fn test_not_found_has_no_details() {
        let error = ApiError::not_found(messages::id_not_found("5ec2d0193fd8c5d9b72948cf"));

        assert!(error.details().is_empty());
        assert_eq!(
            error.message(),
            "The resource specified by ID: 5ec2d0193fd8c5d9b72948cf was not found"
        );
    }
}
