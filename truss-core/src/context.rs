// Per-request context handed to compiled handlers

use crate::{BufferedResponse, Error, HttpRequest, Response};
use std::fmt;
use std::sync::Arc;

type NextFn = dyn Fn(Option<Error>) + Send + Sync;

/// The failure-continuation of the surrounding chain.
///
/// `call()` passes control to the next layer; `fail(err)` hands an error to
/// the error-handling layers instead of dispatching a response.
#[derive(Clone)]
pub struct Next {
    inner: Arc<NextFn>,
}

impl Next {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<Error>) + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// A continuation that ignores every signal.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn call(&self) {
        (self.inner)(None)
    }

    pub fn fail(&self, error: Error) {
        (self.inner)(Some(error))
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next")
    }
}

/// Everything argument resolution may draw from for one request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request: Arc<HttpRequest>,
    pub response: Response,
    pub next: Next,
    /// The in-flight error, present only for error-handling layers.
    pub error: Option<Arc<Error>>,
}

impl RequestContext {
    pub fn new(request: Arc<HttpRequest>, response: Response, next: Next) -> Self {
        Self {
            request,
            response,
            next,
            error: None,
        }
    }

    /// Context over a fresh [`BufferedResponse`], returning the sink too.
    pub fn buffered(request: HttpRequest, next: Next) -> (Self, Arc<BufferedResponse>) {
        let sink = Arc::new(BufferedResponse::new());
        let ctx = Self::new(Arc::new(request), Response::new(sink.clone()), next);
        (ctx, sink)
    }

    pub fn with_error(mut self, error: Arc<Error>) -> Self {
        self.error = Some(error);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_next_forwards_signals() {
        let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let next = Next::new(move |err| sink.lock().push(err.map(|e| e.to_string())));

        next.call();
        next.fail(Error::NotFound("item".into()));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], None);
        assert_eq!(seen[1].as_deref(), Some("Not Found: item"));
    }

    #[test]
    fn test_buffered_context() {
        let (ctx, sink) = RequestContext::buffered(HttpRequest::new("GET", "/"), Next::noop());
        ctx.response.status(204);
        assert_eq!(sink.to_response().status, 204);
        assert!(ctx.error.is_none());
    }
}
