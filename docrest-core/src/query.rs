//! Filter expressions, projections and the [`Query`] handed to backends.
//!
//! Backends never see request JSON: they receive an [`Expr`] tree and render or evaluate
//! it through a [`QueryVisitor`]. [`Filter`] builds trees in code.
//!
//! Filters received over the wire are JSON documents in the familiar operator syntax
//! (`{"age": {"$gte": 18}}`) and are parsed into the same AST with [`parse_filter`].

use bson::{Bson, Document};
use serde_json::{Map, Value};

use crate::{
    api::{ApiError, ApiResult, ErrorDetail, messages},
    document::{ID_FIELD, json_to_bson},
    error::DocumentStoreError,
    identifier::Identifier,
};

/// Comparison applied to a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to. An array field matches when any element is equal.
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Field value is one of the values.
    AnyOf,
    /// Field value is none of the values.
    NoneOf,
}

impl FieldOp {
    /// Parses a comparison operator token such as `$gte`.
    pub fn from_operator(operator: &str) -> Option<Self> {
        Some(match operator {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::AnyOf,
            "$nin" => FieldOp::NoneOf,
            _ => return None,
        })
    }
}

/// Predicate over stored documents. An empty `And` matches every document, an empty `Or`
/// matches none.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// Field path and whether it must be present.
    Exists(String, bool),
    Field {
        /// Dotted path.
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// An expression matching every document.
    pub fn all() -> Self {
        Expr::And(Vec::new())
    }

    /// Conjunction; flattens into an existing `And`.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Disjunction; flattens into an existing `Or`.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// Field inclusion/exclusion list applied to query results.
///
/// A projection is either inclusive or exclusive for every field but `_id`, which may be
/// excluded from an inclusive projection or included in an exclusive one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<(String, bool)>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), true));
        self
    }

    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), false));
        self
    }

    pub fn fields(&self) -> &[(String, bool)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `true` when any field other than `_id` is explicitly included.
    pub fn is_inclusive(&self) -> bool {
        self.fields
            .iter()
            .any(|(field, included)| *included && field != ID_FIELD)
    }

    /// Whether `_id` survives the projection.
    pub fn keeps_id(&self) -> bool {
        !self
            .fields
            .iter()
            .any(|(field, included)| !*included && field == ID_FIELD)
    }

    /// Renders the projection as a `{field: 1|0}` document.
    pub fn to_document(&self) -> Document {
        self.fields
            .iter()
            .map(|(field, included)| (field.clone(), Bson::Int32(i32::from(*included))))
            .collect()
    }
}

/// Collection read passed to [`StoreBackend::find_documents`](crate::backend::StoreBackend::find_documents).
///
/// ```ignore
/// let first_active = Query::builder()
///     .filter(Filter::eq("status", "active"))
///     .limit(1)
///     .build();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// `None` matches everything.
    pub filter: Option<Expr>,
    pub projection: Option<Projection>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Shorthand constructors for [`Expr`], e.g. `Filter::eq("name", "Ada").and(Filter::gt("age", 18))`.
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// `$in`; a scalar `value` is treated as a one-element list.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }

    /// Matches the document whose `_id` is `id`.
    pub fn id(id: Identifier) -> Expr {
        Filter::eq(ID_FIELD, id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.query.projection = Some(projection);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// Parses a JSON filter document into an [`Expr`].
///
/// Supports field equality (dotted paths allowed), the comparison operators `$eq`, `$ne`,
/// `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`, the field-level `$not`, and the
/// logical operators `$and`, `$or`, `$nor`. Identifier-shaped strings compared against an
/// `_id` field are compared as object ids.
pub fn parse_filter(value: &Value) -> ApiResult<Expr> {
    let Value::Object(map) = value else {
        return Err(filter_error(messages::parsing_query_param_failed("query")));
    };

    let mut exprs = parse_object(map)?;
    Ok(match exprs.len() {
        1 => exprs.remove(0),
        _ => Expr::And(exprs),
    })
}

fn parse_object(map: &Map<String, Value>) -> ApiResult<Vec<Expr>> {
    let mut exprs = Vec::with_capacity(map.len());

    for (key, value) in map {
        match key.as_str() {
            "$and" => exprs.push(Expr::And(parse_clauses(value)?)),
            "$or" => exprs.push(Expr::Or(parse_clauses(value)?)),
            "$nor" => exprs.push(Expr::Or(parse_clauses(value)?).not()),
            operator if operator.starts_with('$') => {
                return Err(filter_error(messages::unsupported_operator(operator)));
            }
            field => exprs.extend(parse_condition(field, value)?),
        }
    }

    Ok(exprs)
}

fn parse_clauses(value: &Value) -> ApiResult<Vec<Expr>> {
    let Value::Array(clauses) = value else {
        return Err(filter_error(messages::parsing_query_param_failed("query")));
    };

    clauses.iter().map(parse_filter).collect()
}

fn parse_condition(field: &str, value: &Value) -> ApiResult<Vec<Expr>> {
    match value {
        Value::Object(ops) if is_operator_object(ops) => ops
            .iter()
            .map(|(operator, operand)| parse_operator(field, operator, operand))
            .collect(),
        other => Ok(vec![Filter::eq(field, filter_value(field, other))]),
    }
}

fn parse_operator(field: &str, operator: &str, operand: &Value) -> ApiResult<Expr> {
    match operator {
        "$exists" => Ok(Expr::Exists(field.to_string(), is_truthy(operand))),
        "$not" => match operand {
            Value::Object(ops) if is_operator_object(ops) => {
                let mut exprs = parse_condition(field, operand)?;
                let inner = match exprs.len() {
                    1 => exprs.remove(0),
                    _ => Expr::And(exprs),
                };
                Ok(inner.not())
            }
            _ => Err(filter_error(messages::parsing_query_param_failed("query"))),
        },
        _ => {
            let op = FieldOp::from_operator(operator)
                .ok_or_else(|| filter_error(messages::unsupported_operator(operator)))?;

            if matches!(op, FieldOp::AnyOf | FieldOp::NoneOf) && !operand.is_array() {
                return Err(filter_error(messages::parsing_query_param_failed("query")));
            }

            Ok(Expr::field(field.to_string(), op, filter_value(field, operand)))
        }
    }
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|key| key.starts_with('$'))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

fn is_id_path(field: &str) -> bool {
    field == ID_FIELD || field.ends_with("._id")
}

/// Converts a filter operand, casting identifier-shaped strings on `_id` paths.
fn filter_value(field: &str, value: &Value) -> Bson {
    if !is_id_path(field) {
        return json_to_bson(value);
    }

    match value {
        Value::String(s) => Identifier::parse(s).map_or_else(|| json_to_bson(value), Bson::from),
        Value::Array(items) => Bson::Array(items.iter().map(|item| filter_value(field, item)).collect()),
        other => json_to_bson(other),
    }
}

fn filter_error(message: String) -> ApiError {
    ApiError::bad_request(message).with_detail(ErrorDetail::query(
        messages::parsing_query_param_failed_detail("query"),
        "query",
    ))
}
