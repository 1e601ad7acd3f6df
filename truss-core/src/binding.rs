//! Argument bindings and their resolution against a live request.
//!
//! A binding names where one positional argument of a user method comes from.
//! Bindings may be declared in any order; [`resolve`] sorts them by position
//! before producing the argument array.

use crate::logging::trace;
use crate::{Error, HttpRequest, Next, RequestContext, Response, Status};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Origin of a single argument value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSource {
    PathParam,
    Query,
    Body,
    Header,
    Status,
    Next,
    Request,
    Response,
    Error,
}

impl BindingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingSource::PathParam => "params",
            BindingSource::Query => "query",
            BindingSource::Body => "body",
            BindingSource::Header => "headers",
            BindingSource::Status => "status",
            BindingSource::Next => "next",
            BindingSource::Request => "request",
            BindingSource::Response => "response",
            BindingSource::Error => "error",
        }
    }

    /// Sources looked up by name on a request facet.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            BindingSource::PathParam
                | BindingSource::Query
                | BindingSource::Body
                | BindingSource::Header
        )
    }
}

impl fmt::Display for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared argument source of a method parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentBinding {
    pub source: BindingSource,
    pub name: String,
    pub position: usize,
}

impl ArgumentBinding {
    pub fn new(source: BindingSource, name: impl Into<String>, position: usize) -> Self {
        Self {
            source,
            name: name.into(),
            position,
        }
    }

    pub fn param(name: impl Into<String>, position: usize) -> Self {
        Self::new(BindingSource::PathParam, name, position)
    }

    pub fn query(name: impl Into<String>, position: usize) -> Self {
        Self::new(BindingSource::Query, name, position)
    }

    pub fn body(name: impl Into<String>, position: usize) -> Self {
        Self::new(BindingSource::Body, name, position)
    }

    pub fn header(name: impl Into<String>, position: usize) -> Self {
        Self::new(BindingSource::Header, name, position)
    }

    /// Binding to a context object; the source name doubles as the binding name.
    pub fn context(source: BindingSource, position: usize) -> Self {
        Self::new(source, source.as_str(), position)
    }
}

/// A resolved argument value.
#[derive(Debug, Clone)]
pub enum Argument {
    /// Facet lookup result; `None` when the facet has no such key.
    Value(Option<Value>),
    Status(Status),
    Next(Next),
    Request(Arc<HttpRequest>),
    Response(Response),
    Error(Option<Arc<Error>>),
}

/// Positional arguments for one user-method call.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: Vec<Argument>,
}

impl Arguments {
    pub fn new(values: Vec<Argument>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Argument> {
        self.values.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.values.iter()
    }

    /// The raw facet value at `position`; `None` when it was absent.
    pub fn raw(&self, position: usize) -> Result<Option<&Value>, Error> {
        match self.values.get(position) {
            Some(Argument::Value(value)) => Ok(value.as_ref()),
            _ => Err(mismatch(position, "a request value")),
        }
    }

    /// Deserialize the facet value at `position`.
    ///
    /// Absent values deserialize from `null`, so `Option<T>` receives `None`.
    /// Strings that do not fit `T` directly are retried as JSON text, which
    /// lets `"42"` from a query string bind to a number.
    pub fn value<T: DeserializeOwned>(&self, position: usize) -> Result<T, Error> {
        let value = self.raw(position)?.cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<T>(value.clone()) {
            Ok(parsed) => Ok(parsed),
            Err(err) => match value {
                Value::String(text) => serde_json::from_str(&text)
                    .map_err(|_| Error::BadRequest(format!("argument {}: {}", position, err))),
                _ => Err(Error::BadRequest(format!("argument {}: {}", position, err))),
            },
        }
    }

    pub fn request(&self, position: usize) -> Result<Arc<HttpRequest>, Error> {
        match self.values.get(position) {
            Some(Argument::Request(request)) => Ok(request.clone()),
            _ => Err(mismatch(position, "the request")),
        }
    }

    pub fn response(&self, position: usize) -> Result<Response, Error> {
        match self.values.get(position) {
            Some(Argument::Response(response)) => Ok(response.clone()),
            _ => Err(mismatch(position, "the response")),
        }
    }

    pub fn status(&self, position: usize) -> Result<Status, Error> {
        match self.values.get(position) {
            Some(Argument::Status(status)) => Ok(status.clone()),
            _ => Err(mismatch(position, "the status setter")),
        }
    }

    pub fn next(&self, position: usize) -> Result<Next, Error> {
        match self.values.get(position) {
            Some(Argument::Next(next)) => Ok(next.clone()),
            _ => Err(mismatch(position, "the next continuation")),
        }
    }

    pub fn error(&self, position: usize) -> Result<Option<Arc<Error>>, Error> {
        match self.values.get(position) {
            Some(Argument::Error(error)) => Ok(error.clone()),
            _ => Err(mismatch(position, "the in-flight error")),
        }
    }
}

fn mismatch(position: usize, expected: &'static str) -> Error {
    Error::ArgumentMismatch { position, expected }
}

/// Produce the positional argument array for `bindings`.
///
/// Lookups never fail: a name the facet does not own resolves to an absent
/// value. Context sources are injected unconditionally.
pub fn resolve(bindings: &[ArgumentBinding], ctx: &RequestContext) -> Arguments {
    if bindings.is_empty() {
        return Arguments::default();
    }

    let mut ordered: Vec<&ArgumentBinding> = bindings.iter().collect();
    ordered.sort_by_key(|binding| binding.position);

    let values = ordered
        .into_iter()
        .map(|binding| {
            let argument = resolve_one(binding, ctx);
            trace!(
                source = %binding.source,
                name = %binding.name,
                position = binding.position,
                "Resolved argument"
            );
            argument
        })
        .collect();

    Arguments::new(values)
}

fn resolve_one(binding: &ArgumentBinding, ctx: &RequestContext) -> Argument {
    let request = &ctx.request;
    match binding.source {
        BindingSource::PathParam => Argument::Value(
            request
                .path_params
                .get(&binding.name)
                .map(|v| Value::String(v.clone())),
        ),
        BindingSource::Query => Argument::Value(
            request
                .query_params
                .get(&binding.name)
                .map(|v| Value::String(v.clone())),
        ),
        BindingSource::Header => Argument::Value(
            request
                .header(&binding.name)
                .map(|v| Value::String(v.clone())),
        ),
        BindingSource::Body => Argument::Value(request.body_field(&binding.name).cloned()),
        BindingSource::Status => Argument::Status(ctx.response.status_setter()),
        BindingSource::Next => Argument::Next(ctx.next.clone()),
        BindingSource::Request => Argument::Request(ctx.request.clone()),
        BindingSource::Response => Argument::Response(ctx.response.clone()),
        BindingSource::Error => Argument::Error(ctx.error.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(request: HttpRequest) -> RequestContext {
        RequestContext::buffered(request, Next::noop()).0
    }

    #[test]
    fn test_empty_bindings_resolve_to_empty() {
        let ctx = context(HttpRequest::new("GET", "/"));
        assert!(resolve(&[], &ctx).is_empty());
    }

    #[test]
    fn test_positions_sorted_regardless_of_declaration_order() {
        let request = HttpRequest::new("GET", "/search").with_query("q", "hello");
        let ctx = context(request);
        let bindings = vec![
            ArgumentBinding::query("q", 1),
            ArgumentBinding::context(BindingSource::Request, 0),
        ];

        let args = resolve(&bindings, &ctx);
        assert_eq!(args.len(), 2);
        assert_eq!(args.request(0).unwrap().path, "/search");
        assert_eq!(args.value::<String>(1).unwrap(), "hello");
    }

    fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for (i, first) in items.iter().enumerate() {
            let mut rest = items.to_vec();
            rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, *first);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_every_declaration_order_resolves_by_position() {
        let request = HttpRequest::new("GET", "/search")
            .with_query("q", "hello")
            .with_header("X-Token", "t");
        let ctx = context(request);
        let binding_at = |position: usize| match position {
            0 => ArgumentBinding::context(BindingSource::Request, 0),
            1 => ArgumentBinding::query("q", 1),
            2 => ArgumentBinding::header("x-token", 2),
            _ => ArgumentBinding::context(BindingSource::Status, 3),
        };

        let orders = permutations(&[0, 1, 2, 3]);
        assert_eq!(orders.len(), 24);
        for order in orders {
            let bindings: Vec<ArgumentBinding> = order.iter().map(|&p| binding_at(p)).collect();
            let args = resolve(&bindings, &ctx);

            assert_eq!(args.len(), 4, "order {:?}", order);
            assert_eq!(args.request(0).unwrap().path, "/search", "order {:?}", order);
            assert_eq!(args.value::<String>(1).unwrap(), "hello", "order {:?}", order);
            assert_eq!(args.value::<String>(2).unwrap(), "t", "order {:?}", order);
            assert!(args.status(3).is_ok(), "order {:?}", order);
        }
    }

    #[test]
    fn test_absent_lookup_is_none_not_error() {
        let ctx = context(HttpRequest::new("GET", "/"));
        let bindings = vec![
            ArgumentBinding::param("id", 0),
            ArgumentBinding::query("page", 1),
            ArgumentBinding::header("x-missing", 2),
            ArgumentBinding::body("name", 3),
        ];

        let args = resolve(&bindings, &ctx);
        for position in 0..4 {
            assert_eq!(args.raw(position).unwrap(), None);
            assert_eq!(args.value::<Option<String>>(position).unwrap(), None);
        }
    }

    #[test]
    fn test_explicit_falsy_value_is_present() {
        let request = HttpRequest::new("POST", "/")
            .with_json(&json!({"count": 0, "flag": false}))
            .unwrap();
        let ctx = context(request);
        let bindings = vec![ArgumentBinding::body("count", 0), ArgumentBinding::body("flag", 1)];

        let args = resolve(&bindings, &ctx);
        assert_eq!(args.raw(0).unwrap(), Some(&json!(0)));
        assert_eq!(args.raw(1).unwrap(), Some(&json!(false)));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = HttpRequest::new("GET", "/").with_header("Authorization", "Bearer t");
        let ctx = context(request);
        let args = resolve(&[ArgumentBinding::header("Authorization", 0)], &ctx);
        assert_eq!(args.value::<String>(0).unwrap(), "Bearer t");
    }

    #[test]
    fn test_string_values_coerce_to_numbers() {
        let mut request = HttpRequest::new("GET", "/items/7");
        request.path_params.insert("id".into(), "7".into());
        let ctx = context(request);

        let args = resolve(&[ArgumentBinding::param("id", 0)], &ctx);
        assert_eq!(args.value::<u32>(0).unwrap(), 7);
        assert_eq!(args.value::<String>(0).unwrap(), "7");
        assert!(matches!(args.value::<Vec<u8>>(0), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_context_sources_injected() {
        let ctx = context(HttpRequest::new("GET", "/"))
            .with_error(Arc::new(Error::NotFound("x".into())));
        let bindings = vec![
            ArgumentBinding::context(BindingSource::Error, 4),
            ArgumentBinding::context(BindingSource::Status, 0),
            ArgumentBinding::context(BindingSource::Next, 1),
            ArgumentBinding::context(BindingSource::Response, 3),
            ArgumentBinding::context(BindingSource::Request, 2),
        ];

        let args = resolve(&bindings, &ctx);
        assert!(args.status(0).is_ok());
        assert!(args.next(1).is_ok());
        assert!(args.request(2).is_ok());
        assert!(args.response(3).is_ok());
        assert_eq!(
            args.error(4).unwrap().map(|e| e.to_string()).as_deref(),
            Some("Not Found: x")
        );
    }

    #[test]
    fn test_wrong_accessor_is_mismatch() {
        let ctx = context(HttpRequest::new("GET", "/"));
        let args = resolve(&[ArgumentBinding::context(BindingSource::Next, 0)], &ctx);
        assert!(matches!(
            args.request(0),
            Err(Error::ArgumentMismatch { position: 0, .. })
        ));
        assert!(matches!(
            args.value::<String>(1),
            Err(Error::ArgumentMismatch { position: 1, .. })
        ));
    }
}
