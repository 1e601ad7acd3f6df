// Routing system for HTTP requests

use crate::handler::{BoxFuture, HandlerFn};
use crate::logging::{trace, warn};
use crate::{
    BufferedResponse, Error, HttpMethod, HttpRequest, HttpResponse, Next, RequestContext,
    Response, ResponseAction,
};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Path a route is registered under.
///
/// Literal paths use `:name` segments for parameters. Patterns capture
/// parameters through named groups and must match the whole path.
#[derive(Debug, Clone)]
pub enum RoutePath {
    Literal(String),
    Pattern(Regex),
}

impl RoutePath {
    pub fn as_str(&self) -> &str {
        match self {
            RoutePath::Literal(path) => path,
            RoutePath::Pattern(regex) => regex.as_str(),
        }
    }

    /// Match `path`, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        match self {
            RoutePath::Literal(pattern) => match_path(pattern, path),
            RoutePath::Pattern(regex) => {
                let captures = regex.captures(path)?;
                let whole = captures.get(0)?;
                if whole.start() != 0 || whole.end() != path.len() {
                    return None;
                }
                Some(
                    regex
                        .capture_names()
                        .flatten()
                        .filter_map(|name| {
                            captures
                                .name(name)
                                .map(|m| (name.to_string(), m.as_str().to_string()))
                        })
                        .collect(),
                )
            }
        }
    }
}

impl PartialEq for RoutePath {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RoutePath::Literal(a), RoutePath::Literal(b)) => a == b,
            (RoutePath::Pattern(a), RoutePath::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for RoutePath {
    fn from(path: &str) -> Self {
        RoutePath::Literal(path.to_string())
    }
}

impl From<String> for RoutePath {
    fn from(path: String) -> Self {
        RoutePath::Literal(path)
    }
}

impl From<Regex> for RoutePath {
    fn from(regex: Regex) -> Self {
        RoutePath::Pattern(regex)
    }
}

#[derive(Clone)]
enum Layer {
    Route {
        method: HttpMethod,
        path: RoutePath,
        handler: HandlerFn,
    },
    Use {
        prefix: String,
        handler: HandlerFn,
    },
    Error {
        prefix: String,
        handler: HandlerFn,
    },
    Mount {
        prefix: String,
        router: Arc<Router>,
    },
}

/// What a handler left behind for the chain.
enum Signal {
    Continue,
    Fail(Error),
}

/// Result of running one router's layers.
enum Step {
    /// A handler ended the request.
    Done,
    /// The chain ran off the end, possibly with a pending error.
    Continue(Option<Arc<Error>>),
}

/// Ordered stack of route, middleware, error and sub-router layers.
///
/// Registration goes through `&self`, so a shared router can keep growing.
/// Layers run in registration order. While an error is pending only error
/// layers run; otherwise error layers are skipped.
#[derive(Default)]
pub struct Router {
    layers: RwLock<Vec<Layer>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` requests matching `path`.
    pub fn route(&self, method: HttpMethod, path: impl Into<RoutePath>, handler: HandlerFn) {
        let path = path.into();
        trace!(method = %method, path = %path, "Adding route");
        self.layers.write().push(Layer::Route {
            method,
            path,
            handler,
        });
    }

    /// Register an error-handling layer under `prefix`.
    pub fn error(&self, prefix: &str, handler: HandlerFn) {
        self.layers.write().push(Layer::Error {
            prefix: normalize_prefix(prefix),
            handler,
        });
    }

    /// Register a middleware layer that sees every request under `prefix`.
    pub fn use_handler(&self, prefix: &str, handler: HandlerFn) {
        self.layers.write().push(Layer::Use {
            prefix: normalize_prefix(prefix),
            handler,
        });
    }

    /// Attach `router` under `prefix`; it sees paths with the prefix stripped.
    pub fn mount(&self, prefix: &str, router: Arc<Router>) {
        self.layers.write().push(Layer::Mount {
            prefix: normalize_prefix(prefix),
            router,
        });
    }

    pub fn len(&self) -> usize {
        self.layers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.read().is_empty()
    }

    /// Number of route layers, not counting nested routers.
    pub fn route_count(&self) -> usize {
        self.layers
            .read()
            .iter()
            .filter(|layer| matches!(layer, Layer::Route { .. }))
            .count()
    }

    /// Run `request` through the router and collect the buffered response.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let sink = Arc::new(BufferedResponse::new());
        self.handle_with(request, Response::new(sink.clone())).await;
        sink.to_response()
    }

    /// Run `request` through the router, writing into `response`.
    ///
    /// A pending error at the end of the chain becomes a JSON error body; a
    /// request nothing handled becomes a 404.
    pub async fn handle_with(&self, mut request: HttpRequest, response: Response) {
        let path = match request.path.split_once('?') {
            Some((path, query)) => {
                let path = path.to_string();
                request.query_params.extend(parse_query_string(query));
                request.path = path;
                request.path.clone()
            }
            None => request.path.clone(),
        };

        let request = Arc::new(request);
        let step = self.run(&request, &path, &response, None).await;

        if response.is_sent() {
            return;
        }
        match step {
            Step::Done => {}
            Step::Continue(Some(err)) => {
                warn!(error = %err, path = %path, "Unhandled error");
                write_error(&response, &err);
            }
            Step::Continue(None) => {
                let err = Error::RouteNotFound(format!("{} {}", request.method, path));
                trace!(path = %path, "No layer handled request");
                write_error(&response, &err);
            }
        }
    }

    fn run<'a>(
        &'a self,
        request: &'a Arc<HttpRequest>,
        path: &'a str,
        response: &'a Response,
        mut error: Option<Arc<Error>>,
    ) -> BoxFuture<'a, Step> {
        Box::pin(async move {
            let layers = self.layers.read().clone();

            for layer in layers {
                match layer {
                    Layer::Route {
                        method,
                        path: pattern,
                        handler,
                    } => {
                        if error.is_some() || !request.method.eq_ignore_ascii_case(method.as_str()) {
                            continue;
                        }
                        let Some(params) = pattern.matches(path) else {
                            continue;
                        };
                        trace!(method = %method, route = %pattern, "Route matched");
                        let mut routed = HttpRequest::clone(request);
                        routed.path_params = params;
                        match invoke(&handler, Arc::new(routed), response, None).await {
                            Some(next) => error = next,
                            None => return Step::Done,
                        }
                    }
                    Layer::Use { prefix, handler } => {
                        if error.is_some() || strip_prefix(&prefix, path).is_none() {
                            continue;
                        }
                        match invoke(&handler, request.clone(), response, None).await {
                            Some(next) => error = next,
                            None => return Step::Done,
                        }
                    }
                    Layer::Error { prefix, handler } => {
                        let Some(pending) = error.clone() else {
                            continue;
                        };
                        if strip_prefix(&prefix, path).is_none() {
                            continue;
                        }
                        match invoke(&handler, request.clone(), response, Some(pending)).await {
                            Some(next) => error = next,
                            None => return Step::Done,
                        }
                    }
                    Layer::Mount { prefix, router } => {
                        let Some(rest) = strip_prefix(&prefix, path) else {
                            continue;
                        };
                        match router.run(request, rest, response, error.clone()).await {
                            Step::Done => return Step::Done,
                            Step::Continue(next) => error = next,
                        }
                    }
                }
            }

            Step::Continue(error)
        })
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("layers", &self.len())
            .finish()
    }
}

/// Call one handler. `Some(error)` means continue with that pending error;
/// `None` means the handler ended the request.
async fn invoke(
    handler: &HandlerFn,
    request: Arc<HttpRequest>,
    response: &Response,
    error: Option<Arc<Error>>,
) -> Option<Option<Arc<Error>>> {
    let slot: Arc<Mutex<Option<Signal>>> = Arc::new(Mutex::new(None));
    let next = {
        let slot = slot.clone();
        Next::new(move |err| {
            let mut slot = slot.lock();
            if slot.is_none() {
                *slot = Some(match err {
                    None => Signal::Continue,
                    Some(e) => Signal::Fail(e),
                });
            }
        })
    };

    let mut ctx = RequestContext::new(request, response.clone(), next);
    if let Some(error) = error {
        ctx = ctx.with_error(error);
    }

    if let Err(uncaught) = handler(ctx).await {
        return Some(Some(Arc::new(uncaught)));
    }
    if response.is_sent() {
        return None;
    }

    let signal = slot.lock().take();
    match signal {
        Some(Signal::Continue) => Some(None),
        Some(Signal::Fail(err)) => Some(Some(Arc::new(err))),
        None => None,
    }
}

fn write_error(response: &Response, err: &Error) {
    let status = err.status_code();
    response.status(status);
    let body = json!({ "error": err.to_string(), "status": status });
    if let Err(e) = response.dispatch(ResponseAction::Json, body) {
        warn!(error = %e, "Failed to write error response");
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Remainder of `path` under `prefix`, always starting with `/`.
fn strip_prefix<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Match a route path pattern against a request path
/// Returns Some(params) if matched, None otherwise
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            let value = urlencoding::decode(path_part)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| path_part.to_string());
            params.insert(param_name.to_string(), value);
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}

/// Parse and percent-decode a query string
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            let key = decode_component(key)?;
            let value = decode_component(value)?;
            Some((key, value))
        })
        .collect()
}

fn decode_component(raw: &str) -> Option<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .ok()
        .map(|v| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(body: serde_json::Value) -> HandlerFn {
        Arc::new(move |ctx: RequestContext| {
            let body = body.clone();
            Box::pin(async move { ctx.response.json(&body) })
        })
    }

    fn pass() -> HandlerFn {
        Arc::new(|ctx: RequestContext| {
            Box::pin(async move {
                ctx.next.call();
                Ok(())
            })
        })
    }

    #[test]
    fn test_match_path_with_param() {
        let params = match_path("/users/:id", "/users/123").unwrap();
        assert_eq!(params.get("id"), Some(&"123".to_string()));
        assert!(match_path("/users/:id", "/posts/123").is_none());
        assert!(match_path("/", "/").unwrap().is_empty());
        assert!(match_path("/users", "/users/").is_some());
    }

    #[test]
    fn test_match_path_multiple_params() {
        let params = match_path("/users/:user_id/posts/:post_id", "/users/1/posts/a%20b").unwrap();
        assert_eq!(params.get("user_id"), Some(&"1".to_string()));
        assert_eq!(params.get("post_id"), Some(&"a b".to_string()));
    }

    #[test]
    fn test_pattern_path() {
        let path = RoutePath::from(Regex::new(r"/files/(?P<name>[a-z]+)\.txt").unwrap());
        let params = path.matches("/files/notes.txt").unwrap();
        assert_eq!(params.get("name"), Some(&"notes".to_string()));
        assert!(path.matches("/files/notes.txt/extra").is_none());
        assert!(path.matches("/x/files/notes.txt").is_none());
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("name=john%20doe&flag&tag=a+b&");
        assert_eq!(params.get("name"), Some(&"john doe".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));
        assert_eq!(params.get("tag"), Some(&"a b".to_string()));
        assert!(parse_query_string("").is_empty());
    }

    #[test]
    fn test_prefix_helpers() {
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("api/"), "/api");
        assert_eq!(strip_prefix("/api", "/api/items"), Some("/items"));
        assert_eq!(strip_prefix("/api", "/api"), Some("/"));
        assert_eq!(strip_prefix("/api", "/apix"), None);
        assert_eq!(strip_prefix("", "/x"), Some("/x"));
    }

    #[tokio::test]
    async fn test_route_dispatch_and_params() {
        let router = Router::new();
        router.route(
            HttpMethod::GET,
            "/items/:id",
            Arc::new(|ctx: RequestContext| {
                Box::pin(async move {
                    let id = ctx.request.param("id").cloned().unwrap_or_default();
                    let q = ctx.request.query("q").cloned().unwrap_or_default();
                    ctx.response.json(&json!({ "id": id, "q": q }))
                })
            }),
        );

        let res = router.handle(HttpRequest::new("GET", "/items/7?q=a%26b")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.json_body().unwrap(), json!({"id": "7", "q": "a&b"}));

        let res = router.handle(HttpRequest::new("POST", "/items/7")).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_middleware_then_route() {
        let router = Router::new();
        router.use_handler("/", pass());
        router.route(HttpMethod::GET, "/", reply(json!({"ok": true})));

        let res = router.handle(HttpRequest::new("GET", "/")).await;
        assert_eq!(res.json_body().unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_nested_router_strips_prefix() {
        let inner = Arc::new(Router::new());
        inner.route(HttpMethod::GET, "/items", reply(json!("inner")));
        let root = Router::new();
        root.mount("/v1", inner.clone());

        let res = root.handle(HttpRequest::new("GET", "/v1/items")).await;
        assert_eq!(res.json_body().unwrap(), json!("inner"));

        // routes added after mounting are visible
        inner.route(HttpMethod::GET, "/late", reply(json!("late")));
        let res = root.handle(HttpRequest::new("GET", "/v1/late")).await;
        assert_eq!(res.json_body().unwrap(), json!("late"));

        let res = root.handle(HttpRequest::new("GET", "/items")).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_error_skips_routes_until_error_layer() {
        let router = Router::new();
        router.use_handler(
            "/",
            Arc::new(|ctx: RequestContext| {
                Box::pin(async move {
                    ctx.next.fail(Error::Forbidden("nope".into()));
                    Ok(())
                })
            }),
        );
        router.route(HttpMethod::GET, "/", reply(json!("unreachable")));
        router.error(
            "/",
            Arc::new(|ctx: RequestContext| {
                Box::pin(async move {
                    let message = ctx.error.as_ref().map(|e| e.to_string());
                    ctx.response.status(418);
                    ctx.response.json(&json!({ "caught": message }))
                })
            }),
        );

        let res = router.handle(HttpRequest::new("GET", "/")).await;
        assert_eq!(res.status, 418);
        assert_eq!(res.json_body().unwrap(), json!({"caught": "Forbidden: nope"}));
    }

    #[tokio::test]
    async fn test_uncaught_error_becomes_json() {
        let router = Router::new();
        router.route(
            HttpMethod::GET,
            "/",
            Arc::new(|_ctx: RequestContext| {
                Box::pin(async move { Err(Error::Conflict("dup".into())) })
            }),
        );

        let res = router.handle(HttpRequest::new("GET", "/")).await;
        assert_eq!(res.status, 409);
        assert_eq!(
            res.json_body().unwrap(),
            json!({"error": "Conflict: dup", "status": 409})
        );
    }

    #[tokio::test]
    async fn test_uncaught_error_reaches_error_layer() {
        let router = Router::new();
        router.route(
            HttpMethod::GET,
            "/",
            Arc::new(|_ctx: RequestContext| {
                Box::pin(async move { Err(Error::Conflict("dup".into())) })
            }),
        );
        router.error(
            "/",
            Arc::new(|ctx: RequestContext| {
                Box::pin(async move {
                    let status = ctx.error.as_ref().map(|e| e.status_code()).unwrap_or(500);
                    ctx.response.status(status);
                    ctx.response.json(&json!({ "handled": true }))
                })
            }),
        );

        let res = router.handle(HttpRequest::new("GET", "/")).await;
        assert_eq!(res.status, 409);
        assert_eq!(res.json_body().unwrap(), json!({ "handled": true }));
    }

    #[tokio::test]
    async fn test_error_layer_skipped_without_error() {
        let router = Router::new();
        router.error("/", reply(json!("error layer")));
        router.route(HttpMethod::GET, "/", reply(json!("route")));

        let res = router.handle(HttpRequest::new("GET", "/")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.json_body().unwrap(), json!("route"));
    }

    #[tokio::test]
    async fn test_error_layer_can_recover() {
        let router = Router::new();
        router.route(
            HttpMethod::GET,
            "/",
            Arc::new(|ctx: RequestContext| {
                Box::pin(async move {
                    ctx.next.fail(Error::BadRequest("x".into()));
                    Ok(())
                })
            }),
        );
        router.error("/", pass());
        router.route(HttpMethod::GET, "/", reply(json!("recovered")));

        let res = router.handle(HttpRequest::new("GET", "/")).await;
        assert_eq!(res.json_body().unwrap(), json!("recovered"));
    }
}
