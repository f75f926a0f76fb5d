//! Identifier classification for path segments.
//!
//! A path segment is either an [`Identifier`] (exactly 24 hexadecimal characters, the textual
//! form of a 12-byte object id) or a field name. Classification is purely lexical: it never
//! consults the store.

use std::fmt;

use bson::{Bson, Document, oid::ObjectId};

/// Length of the textual form of an identifier.
pub const IDENTIFIER_LEN: usize = 24;

/// Returns `true` iff `segment` is exactly 24 characters drawn from `[0-9a-fA-F]`.
pub fn is_identifier(segment: &str) -> bool {
    segment.len() == IDENTIFIER_LEN && segment.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Identifier of a collection document or of an element inside a nested array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identifier(ObjectId);

impl Identifier {
    /// Parses a segment into an identifier, returning `None` when it does not classify as one.
    pub fn parse(segment: &str) -> Option<Self> {
        if !is_identifier(segment) {
            return None;
        }

        ObjectId::parse_str(segment).ok().map(Identifier)
    }

    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        Identifier(ObjectId::new())
    }

    /// Returns the underlying object id.
    pub fn object_id(&self) -> ObjectId {
        self.0
    }

    /// Returns the lowercase hexadecimal form.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Checks whether a stored `_id` value denotes this identifier.
    ///
    /// Ids may be stored either as object ids or as their hexadecimal string form.
    pub fn matches(&self, value: &Bson) -> bool {
        match value {
            Bson::ObjectId(oid) => *oid == self.0,
            Bson::String(s) => Identifier::parse(s).is_some_and(|id| id == *self),
            _ => false,
        }
    }

    /// Checks whether a document's `_id` field denotes this identifier.
    pub fn matches_document(&self, document: &Document) -> bool {
        document.get("_id").is_some_and(|id| self.matches(id))
    }

    /// Checks whether an array element is a document whose `_id` denotes this identifier.
    pub fn matches_element(&self, element: &Bson) -> bool {
        element
            .as_document()
            .is_some_and(|doc| self.matches_document(doc))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl From<ObjectId> for Identifier {
    fn from(oid: ObjectId) -> Self {
        Identifier(oid)
    }
}

impl From<Identifier> for Bson {
    fn from(id: Identifier) -> Self {
        Bson::ObjectId(id.0)
    }
}

/// A single classified token of a request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// An array element (or document) identifier.
    Identifier(Identifier),
    /// A field name.
    Field(String),
}

impl PathSegment {
    /// Classifies a raw path segment.
    pub fn classify(segment: &str) -> Self {
        match Identifier::parse(segment) {
            Some(id) => PathSegment::Identifier(id),
            None => PathSegment::Field(segment.to_string()),
        }
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self, PathSegment::Identifier(_))
    }

    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            PathSegment::Identifier(id) => Some(id),
            PathSegment::Field(_) => None,
        }
    }

    pub fn as_field(&self) -> Option<&str> {
        match self {
            PathSegment::Field(name) => Some(name),
            PathSegment::Identifier(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Identifier(id) => write!(f, "{id}"),
            PathSegment::Field(name) => write!(f, "{name}"),
        }
    }
}
