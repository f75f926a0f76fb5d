//! Query string parameters understood by the verb handlers.
//!
//! - `query`: JSON filter document, see [`parse_filter`].
//! - `fields`: JSON array of field names; a `-` prefix excludes the field.
//! - `multiplicity`: `one` restricts collection reads and merges to the first match.

use std::collections::HashMap;

use serde_json::Value;

use crate::{
    api::{ApiError, ApiResult, ErrorDetail, messages},
    document::ID_FIELD,
    query::{Expr, Projection, parse_filter},
};

pub const QUERY_PARAM: &str = "query";
pub const FIELDS_PARAM: &str = "fields";
pub const MULTIPLICITY_PARAM: &str = "multiplicity";

/// How many documents a collection-level operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Multiplicity {
    One,
    #[default]
    Many,
}

impl Multiplicity {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("one") => Multiplicity::One,
            _ => Multiplicity::Many,
        }
    }

    pub fn is_single(self) -> bool {
        self == Multiplicity::One
    }
}

/// The parsed query string of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    pub filter: Option<Expr>,
    pub projection: Option<Projection>,
    pub multiplicity: Multiplicity,
}

impl RequestParams {
    pub fn parse(params: &HashMap<String, String>) -> ApiResult<Self> {
        let filter = params
            .get(QUERY_PARAM)
            .map(|raw| parse_json_param(QUERY_PARAM, raw).and_then(|value| parse_filter(&value)))
            .transpose()?;

        let projection = params
            .get(FIELDS_PARAM)
            .map(|raw| parse_json_param(FIELDS_PARAM, raw).and_then(|value| parse_projection(&value)))
            .transpose()?
            .filter(|projection| !projection.is_empty());

        Ok(Self {
            filter,
            projection,
            multiplicity: Multiplicity::parse(params.get(MULTIPLICITY_PARAM).map(String::as_str)),
        })
    }
}

/// Error for collection-wide writes that arrive without a `query` parameter.
pub fn query_required() -> ApiError {
    ApiError::bad_request(messages::query_parameter_required(QUERY_PARAM)).with_detail(
        ErrorDetail::query(messages::query_parameter_required_detail(QUERY_PARAM), QUERY_PARAM),
    )
}

fn parse_json_param(param: &str, raw: &str) -> ApiResult<Value> {
    serde_json::from_str(raw).map_err(|_| {
        ApiError::bad_request(messages::parsing_query_param_failed(param)).with_detail(
            ErrorDetail::query(messages::parsing_query_param_failed_detail(param), param),
        )
    })
}

/// Parses the `fields` list.
///
/// Non-string entries are ignored. Mixing inclusions and exclusions of fields other than
/// `_id` is rejected.
pub fn parse_projection(value: &Value) -> ApiResult<Projection> {
    let Value::Array(entries) = value else {
        return Err(ApiError::bad_request(messages::parsing_query_param_failed(FIELDS_PARAM))
            .with_detail(ErrorDetail::query(
                messages::parsing_query_param_failed_detail(FIELDS_PARAM),
                FIELDS_PARAM,
            )));
    };

    let mut projection = Projection::new();
    let (mut inclusions, mut exclusions) = (0usize, 0usize);

    for entry in entries.iter().filter_map(Value::as_str) {
        match entry.strip_prefix('-') {
            Some(field) => {
                if field != ID_FIELD {
                    exclusions += 1;
                }
                projection = projection.exclude(field);
            }
            None => {
                if entry != ID_FIELD {
                    inclusions += 1;
                }
                projection = projection.include(entry);
            }
        }
    }

    if inclusions > 0 && exclusions > 0 {
        return Err(ApiError::bad_request(messages::PROJECTION_INVALID).with_detail(
            ErrorDetail::query(messages::PROJECTION_INVALID_DETAIL, FIELDS_PARAM),
        ));
    }

    Ok(projection)
}
