//! In-memory descent into a fetched document.
//!
//! Values are viewed through [`Shape`], which only allows the descent a value supports:
//! identifiers select elements of sequences and field names select keys of keyed values.

use bson::{Bson, Document};

use crate::{
    api::{ApiError, ApiResult, messages},
    identifier::{Identifier, PathSegment},
};

/// The structural view of a stored value.
#[derive(Debug, Clone, Copy)]
pub enum Shape<'a> {
    Scalar(&'a Bson),
    Sequence(&'a [Bson]),
    Keyed(&'a Document),
}

impl<'a> Shape<'a> {
    pub fn of(value: &'a Bson) -> Self {
        match value {
            Bson::Array(items) => Shape::Sequence(items),
            Bson::Document(document) => Shape::Keyed(document),
            other => Shape::Scalar(other),
        }
    }

    /// Descends one segment.
    pub fn descend(self, segment: &PathSegment) -> ApiResult<&'a Bson> {
        match segment {
            PathSegment::Identifier(id) => self.element(id),
            PathSegment::Field(key) => self.key(key),
        }
    }

    fn element(self, id: &Identifier) -> ApiResult<&'a Bson> {
        let found = match self {
            Shape::Sequence(items) => items.iter().find(|item| id.matches_element(item)),
            _ => None,
        };

        found.ok_or_else(|| ApiError::not_found(messages::id_not_found(&id.to_hex())))
    }

    fn key(self, key: &str) -> ApiResult<&'a Bson> {
        let found = match self {
            Shape::Keyed(document) => document.get(key),
            _ => None,
        };

        found.ok_or_else(|| ApiError::bad_request(messages::key_not_found(key)))
    }
}

/// Follows `segments` from `value` and returns the value they address.
pub fn walk<'a>(value: &'a Bson, segments: &[PathSegment]) -> ApiResult<&'a Bson> {
    segments
        .iter()
        .try_fold(value, |cursor, segment| Shape::of(cursor).descend(segment))
}
