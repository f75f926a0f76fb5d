//! Query expression evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for query expressions,
//! enabling filtering and comparison operations on BSON documents.
//!
//! Field paths are dotted. A path that crosses an array fans out over its elements, so
//! `nested._id` reaches the `_id` of every element of `nested`, and a condition holds when
//! any reached value satisfies it.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docrest_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 for comparison.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Collects every value reachable through a dotted path.
pub(crate) fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut reached = Vec::new();
    let mut parts = path.splitn(2, '.');
    let head = parts.next().unwrap_or_default();
    let rest = parts.next();

    if let Some(value) = document.get(head) {
        descend(value, rest, &mut reached);
    }

    reached
}

fn descend<'a>(value: &'a Bson, rest: Option<&str>, reached: &mut Vec<&'a Bson>) {
    let Some(rest) = rest else {
        reached.push(value);
        return;
    };

    match value {
        Bson::Document(document) => reached.extend(resolve(document, rest)),
        Bson::Array(items) => {
            // A numeric segment indexes the array; anything else fans out over its documents.
            let mut parts = rest.splitn(2, '.');
            let head = parts.next().unwrap_or_default();

            match head.parse::<usize>() {
                Ok(index) => {
                    if let Some(item) = items.get(index) {
                        descend(item, parts.next(), reached);
                    }
                }
                Err(_) => {
                    for item in items {
                        if let Bson::Document(document) = item {
                            reached.extend(resolve(document, rest));
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns `true` when `document` satisfies `expr`.
    pub fn matches(document: &Document, expr: &Expr) -> DocumentStoreResult<bool> {
        DocumentEvaluator::new(document).evaluate(expr)
    }

    fn any_candidate(&self, field: &str, test: impl Fn(&Comparable<'_>) -> bool) -> bool {
        resolve(self.document, field).into_iter().any(|value| {
            let candidate = Comparable::from(value);
            match &candidate {
                Comparable::Array(items) => test(&candidate) || items.iter().any(&test),
                _ => test(&candidate),
            }
        })
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(resolve(self.document, field).is_empty() != should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let expected = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => self.any_candidate(field, |candidate| *candidate == expected),
            FieldOp::Ne => !self.any_candidate(field, |candidate| *candidate == expected),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                self.any_candidate(field, |candidate| match candidate.partial_cmp(&expected) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                })
            }
            FieldOp::AnyOf | FieldOp::NoneOf => {
                let options = match &expected {
                    Comparable::Array(options) => options.as_slice(),
                    single => std::slice::from_ref(single),
                };
                let found = self.any_candidate(field, |candidate| {
                    options.iter().any(|option| option == candidate)
                });

                if *op == FieldOp::AnyOf { found } else { !found }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docrest_core::query::Filter;

    fn sample() -> (Document, ObjectId) {
        let element = ObjectId::new();
        let document = doc! {
            "name": "root",
            "age": 30,
            "tags": ["a", "b"],
            "profile": { "city": "Oslo" },
            "nested": [
                { "_id": ObjectId::new(), "dayOfWeek": "Sunday" },
                { "_id": element, "dayOfWeek": "Monday" },
            ],
        };
        (document, element)
    }

    fn check(expr: Expr) -> bool {
        DocumentEvaluator::matches(&sample().0, &expr).unwrap()
    }

    #[test]
    fn test_equality_and_comparisons() {
        assert!(check(Filter::eq("name", "root")));
        assert!(check(Filter::eq("age", 30.0)));
        assert!(check(Filter::gte("age", 30)));
        assert!(!check(Filter::gt("age", 30)));
        assert!(check(Filter::ne("name", "other")));
    }

    #[test]
    fn test_dotted_paths() {
        assert!(check(Filter::eq("profile.city", "Oslo")));
        assert!(check(Filter::eq("nested.dayOfWeek", "Monday")));
        assert!(check(Filter::eq("nested.1.dayOfWeek", "Monday")));
        assert!(!check(Filter::eq("nested.0.dayOfWeek", "Monday")));
    }

    #[test]
    fn test_array_fields_match_any_element() {
        assert!(check(Filter::eq("tags", "b")));
        assert!(check(Filter::any_of("tags", vec![Bson::from("z"), Bson::from("a")])));
        assert!(check(Filter::none_of("tags", vec![Bson::from("z")])));
        assert!(!check(Filter::none_of("tags", vec![Bson::from("a")])));
    }

    #[test]
    fn test_element_ids() {
        let (document, element) = sample();
        assert!(DocumentEvaluator::matches(&document, &Filter::eq("nested._id", element)).unwrap());
        assert!(!DocumentEvaluator::matches(&document, &Filter::eq("nested._id", ObjectId::new())).unwrap());
    }

    #[test]
    fn test_exists_and_logic() {
        assert!(check(Filter::exists("profile.city")));
        assert!(check(Filter::not_exists("missing")));
        assert!(check(Filter::and([])));
        assert!(!check(Filter::or([])));
        assert!(check(Filter::eq("name", "x").not()));
    }
}
