//! Translation of filter expressions and positional updates into MongoDB syntax.
//!
//! Filters are translated with a [`QueryVisitor`]. Positional updates keep their `$[label]`
//! placeholders but each label is renamed to `scope{n}`, since MongoDB only accepts
//! lowercase alphanumeric identifiers in array filters while labels are field names.

use bson::{Bson, Document, doc};

use docrest_core::{
    address::ArrayScopeFilter,
    backend::{ScopedUpdate, UpdateOp},
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Translates query expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Renders an optional filter; no filter matches everything.
    pub(crate) fn render(filter: Option<&Expr>) -> DocumentStoreResult<Document> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(Document::new()),
        }
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(Document::new());
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            // `$or` rejects an empty list; this matches nothing instead.
            return Ok(doc! { ID_FIELD: { "$exists": false } });
        }

        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::AnyOf => doc! { "$in": as_list(value) },
                FieldOp::NoneOf => doc! { "$nin": as_list(value) },
            }
        })
    }
}

fn as_list(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        single => Bson::Array(vec![single.clone()]),
    }
}

fn alias(index: usize) -> String {
    format!("scope{index}")
}

/// Rewrites a positional path into MongoDB form: `$[label]` becomes `field.$[scopeN]`.
pub(crate) fn render_path(path: &str, array_filters: &[ArrayScopeFilter]) -> DocumentStoreResult<String> {
    path.split('.')
        .map(|token| match token.strip_prefix("$[").and_then(|t| t.strip_suffix(']')) {
            Some(label) => array_filters
                .iter()
                .position(|filter| filter.label() == label)
                .map(|index| format!("{}.$[{}]", array_filters[index].field(), alias(index)))
                .ok_or_else(|| {
                    DocumentStoreError::InvalidDocument(format!(
                        "No array filter found for identifier '{label}' in path '{path}'"
                    ))
                }),
            None => Ok(token.to_string()),
        })
        .collect::<DocumentStoreResult<Vec<_>>>()
        .map(|tokens| tokens.join("."))
}

/// Renders a positional update as an update document plus its array filters.
///
/// Returns `None` when the update has nothing to set.
pub(crate) fn render_update(update: &ScopedUpdate) -> DocumentStoreResult<Option<(Document, Vec<Document>)>> {
    let filters = &update.array_filters;

    let modifications = match &update.op {
        UpdateOp::Set(changes) if changes.is_empty() => return Ok(None),
        UpdateOp::Set(changes) => {
            let mut set = Document::new();
            for (path, value) in changes {
                set.insert(render_path(path, filters)?, value.clone());
            }
            doc! { "$set": set }
        }
        UpdateOp::Push { path, value } => {
            let mut push = Document::new();
            push.insert(render_path(path, filters)?, value.clone());
            doc! { "$push": push }
        }
        UpdateOp::Pull { path, match_id } => {
            let mut pull = Document::new();
            pull.insert(render_path(path, filters)?, doc! { ID_FIELD: *match_id });
            doc! { "$pull": pull }
        }
    };

    let array_filters = filters
        .iter()
        .enumerate()
        .map(|(index, filter)| {
            let mut rendered = Document::new();
            rendered.insert(format!("{}.{ID_FIELD}", alias(index)), filter.match_id().object_id());
            rendered
        })
        .collect();

    Ok(Some((modifications, array_filters)))
}
