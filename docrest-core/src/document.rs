//! Conversion of documents between the wire format (JSON) and the storage format (BSON).
//!
//! Request bodies are converted with [`body_to_document`], which casts `_id` values to
//! object ids at every level and fails with a [`DocumentStoreError::Cast`] when one does
//! not have the shape of an identifier. Everything read back is rendered with
//! [`bson_to_json`]: object ids become 24-char hex strings and dates become RFC 3339.

use bson::{Bson, Document, oid::ObjectId};
use serde_json::{Map, Number, Value};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
};

/// Name of the identifier field of every document and subdocument.
pub const ID_FIELD: &str = "_id";

/// Converts a JSON value to BSON without any casting.
///
/// Integers become `Int32` when they fit and `Int64` otherwise; other numbers become `Double`.
pub fn json_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => number_to_bson(n),
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(
            map.iter()
                .map(|(key, value)| (key.clone(), json_to_bson(value)))
                .collect(),
        ),
    }
}

fn number_to_bson(n: &Number) -> Bson {
    if let Some(i) = n.as_i64() {
        match i32::try_from(i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(i),
        }
    } else {
        // u64 values past i64::MAX and real numbers both land here.
        Bson::Double(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// Converts a request body into a storable document.
///
/// The body must be a JSON object. `_id` fields are cast to object ids recursively.
pub fn body_to_document(value: &Value) -> DocumentStoreResult<Document> {
    match value {
        Value::Object(map) => object_to_document(map, None),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "expected an object, found {}",
            json_kind(other)
        ))),
    }
}

/// Converts any request value, casting `_id` fields inside it.
///
/// `path` is the dotted location of `value` in the enclosing document and is only used in
/// cast messages.
pub fn body_to_bson(value: &Value, path: Option<&str>) -> DocumentStoreResult<Bson> {
    match value {
        Value::Object(map) => Ok(Bson::Document(object_to_document(map, path)?)),
        Value::Array(items) => items
            .iter()
            .map(|item| body_to_bson(item, path))
            .collect::<DocumentStoreResult<Vec<_>>>()
            .map(Bson::Array),
        other => Ok(json_to_bson(other)),
    }
}

fn object_to_document(map: &Map<String, Value>, path: Option<&str>) -> DocumentStoreResult<Document> {
    let mut document = Document::new();

    for (key, value) in map {
        let field_path = match path {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };

        let converted = if key == ID_FIELD {
            cast_identifier(value, &field_path)?
        } else {
            body_to_bson(value, Some(&field_path))?
        };

        document.insert(key.clone(), converted);
    }

    Ok(document)
}

/// Casts a JSON value to an object id.
pub fn cast_identifier(value: &Value, path: &str) -> DocumentStoreResult<Bson> {
    value
        .as_str()
        .and_then(Identifier::parse)
        .map(Bson::from)
        .ok_or_else(|| DocumentStoreError::Cast {
            path: path.to_string(),
            message: format!("Cast to ObjectId failed for value {value} at path \"{path}\""),
        })
}

/// Renders a stored value as JSON.
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s.clone()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(dt.to_chrono().to_rfc3339()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(document) => document_to_json(document),
        other => Value::String(other.to_string()),
    }
}

pub fn document_to_json(document: &Document) -> Value {
    Value::Object(
        document
            .iter()
            .map(|(key, value)| (key.clone(), bson_to_json(value)))
            .collect(),
    )
}

/// Assigns a fresh `_id` to the document and to every subdocument held in an array that
/// does not have one yet.
///
/// Subdocuments that are direct field values are left alone: only array elements are
/// addressable by id.
pub fn stamp_ids(document: &mut Document) {
    if !document.contains_key(ID_FIELD) {
        document.insert(ID_FIELD, ObjectId::new());
    }
    stamp_nested_ids(document);
}

/// Stamps ids inside the values of `document` without touching its own `_id`.
pub fn stamp_nested_ids(document: &mut Document) {
    for (_, value) in document.iter_mut() {
        stamp_value(value, false);
    }
}

/// Stamps ids inside a value about to be stored. `in_array` tells whether the value is an
/// array element.
pub fn stamp_value(value: &mut Bson, in_array: bool) {
    match value {
        Bson::Document(document) if in_array => stamp_ids(document),
        Bson::Document(document) => stamp_nested_ids(document),
        Bson::Array(items) => {
            for item in items.iter_mut() {
                stamp_value(item, true);
            }
        }
        _ => {}
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
