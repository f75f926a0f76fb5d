//! Field projection for documents returned by the in-memory store.

use bson::{Bson, Document};

use docrest_core::{document::ID_FIELD, query::Projection};

/// Applies `projection` to a document.
///
/// An inclusive projection keeps the listed paths plus `_id` unless it is excluded; an
/// exclusive projection drops the listed paths. Dotted paths reach into subdocuments.
pub(crate) fn project(document: &Document, projection: &Projection) -> Document {
    if projection.is_empty() {
        return document.clone();
    }

    if projection.is_inclusive() {
        let mut projected = Document::new();

        if projection.keeps_id() {
            if let Some(id) = document.get(ID_FIELD) {
                projected.insert(ID_FIELD, id.clone());
            }
        }

        for (path, _) in projection.fields().iter().filter(|(_, include)| *include) {
            if let Some(value) = lookup(document, path) {
                insert_path(&mut projected, path, value.clone());
            }
        }

        projected
    } else {
        let mut projected = document.clone();

        for (path, _) in projection.fields().iter().filter(|(_, include)| !*include) {
            remove_path(&mut projected, path);
        }

        projected
    }
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(child) => lookup(child, rest),
            _ => None,
        },
        None => document.get(path),
    }
}

fn insert_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                insert_path(child, rest, value);
            }
        }
        None => {
            document.insert(path, value);
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                remove_path(child, rest);
            }
        }
        None => {
            document.remove(path);
        }
    }
}
