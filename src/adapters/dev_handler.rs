//! HTTP surface of the development server.
//!
//! Every method under the API prefix is resolved against the installed
//! route table (falling back to a direct file lookup for handlers added
//! since the last rebuild) and executed through the [`HandlerRuntime`].
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode, Uri, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use serde_json::{Value, json};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::{
    adapters::file_system::{HandlerFileResolver, ResolveError},
    core::{
        matcher::RouteMatcher,
        request::{HandlerReply, RequestContext},
        route_table::RouteTableHandle,
    },
    metrics::{self, RequestTimer},
    ports::handler_runtime::{HandlerRuntime, Invocation},
    tracing_setup::{create_request_span, new_request_id},
};

/// Introspection endpoint listing the installed routes.
pub const ROUTES_PATH: &str = "/__fnly/routes";

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const UNMATCHED_ROUTE: &str = "<unmatched>";

/// Shared state of the dev router.
#[derive(Clone)]
pub struct DevState {
    routes: RouteTableHandle,
    matcher: RouteMatcher,
    resolver: HandlerFileResolver,
    runtime: Arc<dyn HandlerRuntime>,
    api_prefix: String,
}

impl DevState {
    pub fn new(
        routes: RouteTableHandle,
        matcher: RouteMatcher,
        resolver: HandlerFileResolver,
        runtime: Arc<dyn HandlerRuntime>,
        api_prefix: impl Into<String>,
    ) -> Self {
        Self {
            routes,
            matcher,
            resolver,
            runtime,
            api_prefix: api_prefix.into(),
        }
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// Request path relative to the API prefix; the prefix itself maps to `/`.
    fn route_path<'a>(&self, path: &'a str) -> &'a str {
        let stripped = path.strip_prefix(self.api_prefix.as_str()).unwrap_or(path);
        if stripped.is_empty() { "/" } else { stripped }
    }
}

#[derive(Debug, Error)]
enum DevError {
    #[error("Route not found")]
    RouteNotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Internal(String),
}

impl DevError {
    fn into_response(self, method: &Method, path: &str) -> Response {
        match self {
            DevError::RouteNotFound => not_found_body("Route not found", method, path),
            DevError::MethodNotAllowed => not_found_body("Method not allowed", method, path),
            DevError::Internal(error) => {
                tracing::error!("Error handling request: {}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "message": "Internal server error",
                        "error": error,
                        "status": 500,
                    })),
                )
                    .into_response()
            }
        }
    }
}

fn not_found_body(message: &str, method: &Method, path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "message": message,
            "method": method.as_str(),
            "path": path,
            "status": 404,
        })),
    )
        .into_response()
}

/// Build the dev server router.
pub fn dev_router(state: DevState) -> Router {
    let prefix = state.api_prefix.clone();

    Router::new()
        .route(ROUTES_PATH, get(list_routes))
        .route(&prefix, any(handle_api))
        .route(&format!("{prefix}/"), any(handle_api))
        .route(&format!("{prefix}/{{*path}}"), any(handle_api))
        .fallback(fallback)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    create_request_span(
                        request.method().as_str(),
                        request.uri().path(),
                        &new_request_id(),
                    )
                })
                .on_response(|response: &Response, latency: Duration, span: &Span| {
                    span.record("http.status_code", response.status().as_u16());
                    span.record("duration_ms", latency.as_millis() as u64);
                    tracing::debug!("Finished with {}", response.status());
                }),
        )
        .with_state(state)
}

async fn fallback(method: Method, uri: Uri) -> Response {
    DevError::RouteNotFound.into_response(&method, uri.path())
}

async fn list_routes(State(state): State<DevState>) -> Response {
    let table = state.routes.load();
    let routes: Vec<Value> = table
        .iter()
        .map(|entry| {
            let file = entry
                .source_file()
                .strip_prefix(state.resolver.root())
                .unwrap_or(entry.source_file());
            json!({
                "pattern": entry.pattern(),
                "file": file.display().to_string(),
                "params": entry.param_names(),
            })
        })
        .collect();

    Json(json!({
        "prefix": state.api_prefix,
        "count": routes.len(),
        "routes": routes,
        "generated_at": chrono::Utc::now().to_rfc3339(),
    }))
    .into_response()
}

async fn handle_api(State(state): State<DevState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    let mut timer = RequestTimer::new(UNMATCHED_ROUTE, method.as_str());
    let (label, response) = match dispatch(&state, parts, body).await {
        Ok((pattern, response)) => (pattern, response),
        Err((pattern, e)) => (pattern, e.into_response(&method, &path)),
    };

    let label = label.unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
    timer.set_path(&label);
    metrics::increment_request_total(&label, method.as_str(), response.status().as_u16());
    response
}

type Dispatched = Result<(Option<String>, Response), (Option<String>, DevError)>;

async fn dispatch(state: &DevState, parts: Parts, body: Body) -> Dispatched {
    let route_path = state.route_path(parts.uri.path());

    let table = state.routes.load();
    let matched = state.matcher.find(route_path, &table);
    let pattern = matched.as_ref().map(|m| m.entry.pattern().to_string());
    if let Some(pattern) = &pattern {
        Span::current().record("route", pattern.as_str());
    }

    let file = match &matched {
        Some(m) => m.entry.source_file().to_path_buf(),
        None => match state.resolver.resolve(route_path).await {
            Ok(Some(file)) => {
                tracing::debug!("Resolved {} directly to {}", route_path, file.display());
                file
            }
            Ok(None) | Err(ResolveError::InvalidPath(_)) => {
                return Err((pattern, DevError::RouteNotFound));
            }
            Err(e) => return Err((pattern, DevError::Internal(e.to_string()))),
        },
    };

    let params: BTreeMap<String, String> = matched
        .map(|m| m.params.into_iter().collect())
        .unwrap_or_default();

    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Err((
                pattern,
                DevError::Internal(format!("failed to read request body: {e}")),
            ));
        }
    };
    let body = match decode_body(&parts.headers, &bytes) {
        Ok(body) => body,
        Err(e) => return Err((pattern, DevError::Internal(e))),
    };

    let context = RequestContext {
        method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        body,
        headers: flatten_headers(&parts.headers),
        query: parse_query(parts.uri.query()),
        params,
    };

    let value = match state.runtime.invoke(&file, &context).await {
        Ok(Invocation::Handled(value)) => value,
        Ok(Invocation::MethodNotFound) => return Err((pattern, DevError::MethodNotAllowed)),
        Err(e) => return Err((pattern, DevError::Internal(e.to_string()))),
    };

    match reply_response(HandlerReply::from_value(value)) {
        Ok(response) => Ok((pattern, response)),
        Err(e) => Err((pattern, DevError::Internal(e))),
    }
}

fn reply_response(reply: HandlerReply) -> Result<Response, String> {
    let status = StatusCode::from_u16(reply.status())
        .map_err(|_| format!("invalid status code {}", reply.status()))?;
    let body = reply
        .body_bytes()
        .map_err(|e| format!("failed to encode response body: {e}"))?;

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .map_err(|e| format!("failed to build response: {e}"))
}

/// JSON bodies are parsed, text bodies passed as a string, anything else is `{}`.
fn decode_body(headers: &HeaderMap, bytes: &Bytes) -> Result<Value, String> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .unwrap_or_default();

    if content_type == "application/json" || content_type.ends_with("+json") {
        if bytes.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON body: {e}"))
    } else if content_type.starts_with("text/") {
        Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()))
    } else {
        Ok(Value::Object(Default::default()))
    }
}

/// Repeated headers are joined with `", "`.
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            (name.as_str().to_string(), joined)
        })
        .collect()
}

/// Repeated query keys are joined with `", "`.
fn parse_query(query: Option<&str>) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = BTreeMap::new();
    let Some(query) = query else {
        return params;
    };

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    params
}
