//! Positional update engine.
//!
//! Applies `$set`, `$push` and `$pull` style mutations to a document. Paths are dotted; a
//! `$[label]` token descends into the array field of the filter with that label and then
//! into every element whose `_id` matches the filter. Elements that do not match are left
//! untouched, so an update whose filters match nothing is a no-op.

use bson::{Bson, Document};

use docrest_core::{
    address::ArrayScopeFilter,
    backend::{ScopedUpdate, UpdateOp},
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
};

#[derive(Debug)]
enum Step<'a> {
    Field(&'a str),
    Scoped(&'a ArrayScopeFilter),
}

#[derive(Debug)]
enum Terminal<'a> {
    Set(&'a Bson),
    Push(&'a Bson),
    Pull(&'a Identifier),
}

impl Terminal<'_> {
    /// Pulls never create the path they remove from.
    fn creates_missing(&self) -> bool {
        !matches!(self, Terminal::Pull(_))
    }

    fn apply_to_field(&self, container: &mut Document, key: &str) -> DocumentStoreResult<()> {
        if let Terminal::Set(value) = self {
            container.insert(key, (*value).clone());
            return Ok(());
        }

        match container.get_mut(key) {
            Some(slot) => self.apply_to_slot(slot, key),
            None => {
                if let Terminal::Push(value) = self {
                    container.insert(key, Bson::Array(vec![(*value).clone()]));
                }
                Ok(())
            }
        }
    }

    fn apply_to_slot(&self, slot: &mut Bson, key: &str) -> DocumentStoreResult<()> {
        match (self, slot) {
            (Terminal::Set(value), slot) => {
                *slot = (*value).clone();
                Ok(())
            }
            (Terminal::Push(value), Bson::Array(items)) => {
                items.push((*value).clone());
                Ok(())
            }
            (Terminal::Pull(id), Bson::Array(items)) => {
                items.retain(|item| !id.matches_element(item));
                Ok(())
            }
            (_, other) => Err(DocumentStoreError::InvalidDocument(format!(
                "The field '{key}' must be an array but is of type {:?}",
                other.element_type()
            ))),
        }
    }
}

/// Applies a positional update to `document`.
pub(crate) fn apply_update(document: &mut Document, update: &ScopedUpdate) -> DocumentStoreResult<()> {
    match &update.op {
        UpdateOp::Set(changes) => apply_set(document, changes, &update.array_filters),
        UpdateOp::Push { path, value } => {
            apply_path(document, path, &update.array_filters, &Terminal::Push(value))
        }
        UpdateOp::Pull { path, match_id } => {
            apply_path(document, path, &update.array_filters, &Terminal::Pull(match_id))
        }
    }
}

/// Sets every `path: value` pair of `changes` on `document`.
pub(crate) fn apply_set(
    document: &mut Document,
    changes: &Document,
    array_filters: &[ArrayScopeFilter],
) -> DocumentStoreResult<()> {
    for (path, value) in changes {
        if path == ID_FIELD && document.get(ID_FIELD).is_some_and(|current| current != value) {
            return Err(DocumentStoreError::InvalidDocument(
                "Performing an update on the path '_id' would modify the immutable field '_id'"
                    .to_string(),
            ));
        }

        apply_path(document, path, array_filters, &Terminal::Set(value))?;
    }

    Ok(())
}

fn apply_path(
    document: &mut Document,
    path: &str,
    array_filters: &[ArrayScopeFilter],
    terminal: &Terminal<'_>,
) -> DocumentStoreResult<()> {
    let steps = parse_steps(path, array_filters)?;
    apply_steps(document, &steps, terminal)
}

fn parse_steps<'a>(path: &'a str, array_filters: &'a [ArrayScopeFilter]) -> DocumentStoreResult<Vec<Step<'a>>> {
    if path.is_empty() {
        return Err(DocumentStoreError::InvalidDocument(
            "An update path cannot be empty".to_string(),
        ));
    }

    path.split('.')
        .map(|token| match token.strip_prefix("$[").and_then(|t| t.strip_suffix(']')) {
            Some(label) => array_filters
                .iter()
                .find(|filter| filter.label() == label)
                .map(Step::Scoped)
                .ok_or_else(|| {
                    DocumentStoreError::InvalidDocument(format!(
                        "No array filter found for identifier '{label}' in path '{path}'"
                    ))
                }),
            None => Ok(Step::Field(token)),
        })
        .collect()
}

fn apply_steps(document: &mut Document, steps: &[Step<'_>], terminal: &Terminal<'_>) -> DocumentStoreResult<()> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(());
    };

    match step {
        Step::Field(key) if rest.is_empty() => terminal.apply_to_field(document, key),
        Step::Field(key) => {
            if !document.contains_key(*key) {
                if !terminal.creates_missing() {
                    return Ok(());
                }
                document.insert(*key, Document::new());
            }

            match document.get_mut(*key) {
                Some(Bson::Document(child)) => apply_steps(child, rest, terminal),
                Some(other) => Err(DocumentStoreError::InvalidDocument(format!(
                    "Cannot create field in element {{{key}: {other}}}"
                ))),
                None => Ok(()),
            }
        }
        Step::Scoped(filter) => {
            let items = match document.get_mut(filter.field()) {
                Some(Bson::Array(items)) => items,
                Some(_) => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "The path '{}' must be an array to be filtered by identifier",
                        filter.field()
                    )));
                }
                None => return Ok(()),
            };

            for item in items.iter_mut() {
                if !filter.match_id().matches_element(item) {
                    continue;
                }

                if rest.is_empty() {
                    terminal.apply_to_slot(item, filter.field())?;
                } else if let Bson::Document(child) = item {
                    apply_steps(child, rest, terminal)?;
                }
            }

            Ok(())
        }
    }
}
