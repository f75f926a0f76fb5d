//! HTTP routing for document collections.
//!
//! [`RestRouter`] mounts one [`RestCollection`] per configured name on an axum [`Router`]:
//! `/{collection}` addresses the collection and `/{collection}/{*path}` anything below it.
//! Every verb is dispatched through the same handler, which parses the query string and
//! the JSON body, delegates to the collection and renders the reply or the error.

use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use serde_json::{Value, json};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use docrest_core::{
    api::{ApiError, ApiResult, ErrorDetail, messages},
    backend::StoreBackend,
    handler::{Reply, RestCollection, Verb},
};

/// Header carrying the id assigned to each request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const COLLECTION_PARAM: &str = "collection";
const PATH_PARAM: &str = "path";

type Collections<B> = Arc<HashMap<String, RestCollection<Arc<B>>>>;

/// Entry point for building the HTTP surface.
#[derive(Debug)]
pub struct RestRouter;

impl RestRouter {
    /// Starts a router serving collections of `backend`.
    pub fn builder<B>(backend: Arc<B>) -> RestRouterBuilder<B>
    where
        B: StoreBackend + ?Sized + 'static,
    {
        RestRouterBuilder {
            backend,
            collections: Vec::new(),
        }
    }
}

/// Builder for the collection router.
#[derive(Debug)]
pub struct RestRouterBuilder<B: ?Sized> {
    backend: Arc<B>,
    collections: Vec<String>,
}

impl<B> RestRouterBuilder<B>
where
    B: StoreBackend + ?Sized + 'static,
{
    /// Serves the collection `name`.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collections.push(name.into());
        self
    }

    /// Serves every collection in `names`.
    pub fn collections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Router {
        let collections: Collections<B> = Arc::new(
            self.collections
                .into_iter()
                .map(|name| {
                    let collection = RestCollection::new(name.clone(), Arc::clone(&self.backend));
                    (name, collection)
                })
                .collect(),
        );

        Router::new()
            .route("/health", get(health))
            .route("/{collection}", any(dispatch::<B>))
            .route("/{collection}/", any(dispatch::<B>))
            .route("/{collection}/{*path}", any(dispatch::<B>))
            .fallback(unknown_route)
            .with_state(collections)
    }
}

/// Renders a handler result as an HTTP response.
#[derive(Debug)]
pub struct ApiResponse(pub ApiResult<Reply>);

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        match self.0 {
            Ok(reply) => {
                let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);
                match reply.body {
                    Some(body) => (status, Json(body)).into_response(),
                    None => status.into_response(),
                }
            }
            Err(err) => {
                let status = StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, Json(err.to_json())).into_response()
            }
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn unknown_route() -> ApiResponse {
    ApiResponse(Err(ApiError::not_found("The route specified does not exist")))
}

async fn dispatch<B>(
    State(collections): State<Collections<B>>,
    method: Method,
    Path(segments): Path<HashMap<String, String>>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    body: Bytes,
) -> Response
where
    B: StoreBackend + ?Sized + 'static,
{
    let request_id = Uuid::new_v4();
    let name = segments.get(COLLECTION_PARAM).cloned().unwrap_or_default();
    let path = segments.get(PATH_PARAM).cloned().unwrap_or_default();
    let span = info_span!("request", id = %request_id, %method, collection = %name, path = %path);

    let result = async {
        let collection = collections
            .get(&name)
            .ok_or_else(|| ApiError::not_found(format!("The collection specified: {name} does not exist")))?;
        let verb = Verb::from_method(method.as_str())
            .ok_or_else(|| ApiError::bad_request(messages::method_invalid(method.as_str())))?;
        let Query(params) = query.map_err(query_rejected)?;
        let body = parse_body(&body)?;

        collection.handle(verb, &path, &params, body).await
    }
    .instrument(span.clone())
    .await;

    span.in_scope(|| match &result {
        Ok(reply) => info!(status = reply.status, "request completed"),
        Err(err) => info!(status = err.status_code(), "request completed"),
    });

    let mut response = ApiResponse(result).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

fn query_rejected(rejection: QueryRejection) -> ApiError {
    ApiError::bad_request(messages::QUERY_STRING_INVALID)
        .with_detail(ErrorDetail::new(rejection.body_text()).location("query"))
}

/// An empty body reads as an empty object.
fn parse_body(body: &[u8]) -> ApiResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }

    serde_json::from_slice(body).map_err(|err| {
        ApiError::bad_request(messages::BODY_INVALID)
            .with_detail(ErrorDetail::new(err.to_string()).location("body"))
    })
}
