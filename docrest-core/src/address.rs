//! Path resolution.
//!
//! A request path (with the collection prefix already stripped) is parsed into an
//! [`Address`]: the root document id, the classified segments that follow it, and the
//! positional update scaffolding derived from them.
//!
//! Every identifier among the retained segments scopes the array field right before it.
//! That field is rendered in [`Address::scoped_field_path`] as a `$[label]` placeholder
//! and gets a matching [`ArrayScopeFilter`], so the path
//! `/<root>/nested/<id>/deeplyNested` resolves to the scoped path
//! `$[nested].deeplyNested` with the single filter `nested._id == <id>`.

use std::collections::HashSet;

use bson::Document;

use crate::{
    api::{ApiError, ApiResult, messages},
    identifier::{Identifier, PathSegment},
};

/// Selects the array element a `$[label]` placeholder refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayScopeFilter {
    label: String,
    field: String,
    match_id: Identifier,
}

impl ArrayScopeFilter {
    pub fn new(label: impl Into<String>, field: impl Into<String>, match_id: Identifier) -> Self {
        Self {
            label: label.into(),
            field: field.into(),
            match_id,
        }
    }

    /// Label used by the placeholder.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Name of the array field being scoped.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn match_id(&self) -> &Identifier {
        &self.match_id
    }

    /// The filter path, `<label>._id`.
    pub fn field_path(&self) -> String {
        format!("{}._id", self.label)
    }

    /// The placeholder token, `$[<label>]`.
    pub fn placeholder(&self) -> String {
        format!("$[{}]", self.label)
    }

    /// Renders the filter as a positional array filter document.
    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();
        filter.insert(self.field_path(), self.match_id.object_id());
        filter
    }
}

/// A resolved request path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    root: Option<String>,
    segments: Vec<PathSegment>,
    retained: usize,
    array_scope_filters: Vec<ArrayScopeFilter>,
    scoped_field_path: String,
    target_is_identifier: bool,
}

impl Address {
    /// Parses a slash-delimited path.
    ///
    /// With `omit_final_segment` the last segment is kept in [`Address::segments`] but takes
    /// no part in the scoped path or the filters. Nested deletes use this: their trailing
    /// identifier names the element to pull, not an array to descend into.
    pub fn parse(path: &str, omit_final_segment: bool) -> ApiResult<Self> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

        if trimmed.is_empty() {
            return Ok(Address::default());
        }

        let mut raw = trimmed.split('/');
        let root = raw.next().map(str::to_string);
        let segments = raw.map(PathSegment::classify).collect::<Vec<_>>();

        reject_unscoped_identifiers(&segments)?;

        let retained = if omit_final_segment {
            segments.len().saturating_sub(1)
        } else {
            segments.len()
        };

        let scope = ScopeBuilder::classify(&segments[..retained]).emit();

        Ok(Address {
            root,
            target_is_identifier: segments[..retained]
                .last()
                .is_some_and(PathSegment::is_identifier),
            segments,
            retained,
            array_scope_filters: scope.filters,
            scoped_field_path: scope.tokens.join("."),
        })
    }

    /// Raw root segment, `None` when the address is the whole collection.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Every segment after the root, including an omitted final segment.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The segments that make up the scoped path.
    pub fn retained_segments(&self) -> &[PathSegment] {
        &self.segments[..self.retained]
    }

    pub fn final_segment(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    pub fn array_scope_filters(&self) -> &[ArrayScopeFilter] {
        &self.array_scope_filters
    }

    pub fn scoped_field_path(&self) -> &str {
        &self.scoped_field_path
    }

    pub fn target_is_identifier(&self) -> bool {
        self.target_is_identifier
    }

    /// `true` when the address names the whole collection.
    pub fn is_collection(&self) -> bool {
        self.root.is_none()
    }

    /// `true` when the address goes below the root document.
    pub fn is_nested(&self) -> bool {
        !self.segments.is_empty()
    }
}

fn reject_unscoped_identifiers(segments: &[PathSegment]) -> ApiResult<()> {
    let mut previous_is_field = false;

    for segment in segments {
        if let PathSegment::Identifier(id) = segment {
            if !previous_is_field {
                return Err(ApiError::bad_request(messages::identifier_without_array(id)));
            }
        }
        previous_is_field = !segment.is_identifier();
    }

    Ok(())
}

#[derive(Debug)]
enum Classified<'a> {
    Plain(&'a str),
    Scoped { field: &'a str, label: String },
    Identifier { label: String, field: &'a str, id: Identifier },
}

#[derive(Debug, Default)]
struct Scope {
    tokens: Vec<String>,
    filters: Vec<ArrayScopeFilter>,
}

/// Two passes over the retained segments: label assignment first, token emission second.
#[derive(Debug)]
struct ScopeBuilder<'a> {
    classified: Vec<Classified<'a>>,
}

impl<'a> ScopeBuilder<'a> {
    fn classify(segments: &'a [PathSegment]) -> Self {
        let mut issued = HashSet::<String>::new();
        let mut classified = Vec::with_capacity(segments.len());

        for (index, segment) in segments.iter().enumerate() {
            match segment {
                PathSegment::Field(field) => {
                    let scoped = segments
                        .get(index + 1)
                        .is_some_and(PathSegment::is_identifier);

                    if scoped {
                        let label = unused_label(field, &issued);
                        issued.insert(label.clone());

                        classified.push(Classified::Scoped { field, label });
                    } else {
                        classified.push(Classified::Plain(field));
                    }
                }
                PathSegment::Identifier(id) => {
                    // Parse already rejected identifiers that do not follow a field.
                    if let Some(Classified::Scoped { field, label }) = classified.last() {
                        let (field, label) = (*field, label.clone());
                        classified.push(Classified::Identifier { label, field, id: *id });
                    }
                }
            }
        }

        Self { classified }
    }

    fn emit(self) -> Scope {
        let mut scope = Scope::default();

        for entry in self.classified {
            match entry {
                Classified::Plain(field) => scope.tokens.push(field.to_string()),
                Classified::Scoped { label, .. } => scope.tokens.push(format!("$[{label}]")),
                Classified::Identifier { label, field, id } => {
                    scope.filters.push(ArrayScopeFilter::new(label, field, id));
                }
            }
        }

        scope
    }
}

/// The field name itself, or the first `{field}{n}` (n >= 2) not already issued.
fn unused_label(field: &str, issued: &HashSet<String>) -> String {
    if !issued.contains(field) {
        return field.to_string();
    }

    let mut suffix = 2;
    loop {
        let label = format!("{field}{suffix}");
        if !issued.contains(&label) {
            return label;
        }
        suffix += 1;
    }
}
