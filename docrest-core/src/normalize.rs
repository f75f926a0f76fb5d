//! Normalization of store failures into request errors.
//!
//! Validation and cast failures become [`ErrorKind::BadRequest`](crate::api::ErrorKind) with
//! one [`ErrorDetail`] per offending leaf field. Nested validation failures (arrays of
//! subdocuments) are flattened recursively; each array level contributes a `*` segment to the
//! field path because the failing element's index is unknown.

use crate::{
    api::{ApiError, ErrorDetail, messages},
    error::{DocumentStoreError, ValidationFailure},
};

impl From<DocumentStoreError> for ApiError {
    fn from(err: DocumentStoreError) -> Self {
        match err {
            DocumentStoreError::Validation(failure) => {
                ApiError::bad_request(messages::VALIDATION_FAILED)
                    .with_details(flatten_validation(&failure))
            }
            DocumentStoreError::Cast { path, message } => {
                ApiError::bad_request(messages::VALIDATION_FAILED)
                    .with_detail(ErrorDetail::body(message, path))
            }
            DocumentStoreError::InvalidDocument(message) => {
                ApiError::bad_request(messages::VALIDATION_FAILED)
                    .with_detail(ErrorDetail::new(message).location("body"))
            }
            DocumentStoreError::DocumentAlreadyExists(..) => {
                ApiError::bad_request(err.to_string())
            }
            DocumentStoreError::DocumentNotFound(ref id, _) => {
                ApiError::not_found(messages::id_not_found(id))
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}

/// Flattens a validation failure into one detail per leaf field.
pub fn flatten_validation(failure: &ValidationFailure) -> Vec<ErrorDetail> {
    let mut details = Vec::new();
    flatten_into(failure, None, &mut details);
    details
}

fn flatten_into(failure: &ValidationFailure, prefix: Option<&str>, details: &mut Vec<ErrorDetail>) {
    for (field, error) in failure.errors() {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.*.{field}"),
            None => field.clone(),
        };

        match error.nested_errors() {
            Some(nested) if !nested.is_empty() => flatten_into(nested, Some(&path), details),
            _ => details.push(ErrorDetail::body(error.message(), path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::ErrorKind, error::FieldError};

    #[test]
    fn test_flat_validation_failure() {
        let failure = ValidationFailure::new()
            .with_error("name", FieldError::new("Path `name` is required."));

        let error = ApiError::from(DocumentStoreError::Validation(failure));

        assert_eq!(error.kind(), ErrorKind::BadRequest);
        assert_eq!(error.message(), messages::VALIDATION_FAILED);
        assert_eq!(
            error.details(),
            &[ErrorDetail::body("Path `name` is required.", "name")]
        );
    }

    #[test]
    fn test_one_level_of_nesting_uses_wildcard() {
        let failure = ValidationFailure::new()
            .with_error("name", FieldError::new("Path `name` is required."))
            .with_error(
                "nested",
                FieldError::nested(
                    "Validation failed",
                    ValidationFailure::new()
                        .with_error("dayOfWeek", FieldError::new("Path `dayOfWeek` is required."))
                        .with_error("activity", FieldError::new("Path `activity` is required.")),
                ),
            );

        let details = flatten_validation(&failure);

        assert_eq!(
            details,
            vec![
                ErrorDetail::body("Path `name` is required.", "name"),
                ErrorDetail::body("Path `dayOfWeek` is required.", "nested.*.dayOfWeek"),
                ErrorDetail::body("Path `activity` is required.", "nested.*.activity"),
            ]
        );
    }

    #[test]
    fn test_arbitrary_depth() {
        let failure = ValidationFailure::new().with_error(
            "nested",
            FieldError::nested(
                "Validation failed",
                ValidationFailure::new().with_error(
                    "deeplyNested",
                    FieldError::nested(
                        "Validation failed",
                        ValidationFailure::new()
                            .with_error("deepField", FieldError::new("Path `deepField` is required.")),
                    ),
                ),
            ),
        );

        assert_eq!(
            flatten_validation(&failure),
            vec![ErrorDetail::body(
                "Path `deepField` is required.",
                "nested.*.deeplyNested.*.deepField"
            )]
        );
    }

    #[test]
    fn test_empty_nested_failure_reports_parent() {
        let failure = ValidationFailure::new()
            .with_error("nested", FieldError::nested("Bad array", ValidationFailure::new()));

        assert_eq!(
            flatten_validation(&failure),
            vec![ErrorDetail::body("Bad array", "nested")]
        );
    }

    #[test]
    fn test_cast_failure() {
        let error = ApiError::from(DocumentStoreError::Cast {
            path: "dayOfWeek".to_string(),
            message: "Cast to string failed for value \"{ invalid: 'format' }\" at path \"dayOfWeek\"".to_string(),
        });

        assert_eq!(error.kind(), ErrorKind::BadRequest);
        assert_eq!(error.details().len(), 1);
        assert_eq!(error.details()[0].field_path.as_deref(), Some("dayOfWeek"));
        assert_eq!(error.details()[0].location.as_deref(), Some("body"));
    }

    #[test]
    fn test_other_failures_are_internal() {
        let error = ApiError::from(DocumentStoreError::Backend("connection reset".to_string()));

        assert_eq!(error.kind(), ErrorKind::Internal);
        assert_eq!(error.message(), "Backend error: connection reset");
        assert!(error.details().is_empty());
    }
}
