//! Handler compilation: wrapping a user method into one dispatch function.
//!
//! The compiled handler resolves arguments, calls the method with its owning
//! instance, and normalizes the returned [`Outcome`]:
//!
//! - `Failure(err)` is forwarded to `next` and nothing is dispatched
//! - `Empty` or a falsy value stops silently (the method wrote the response)
//! - `Pending(fut)` is awaited and its result normalized the same way
//! - any other value is dispatched once through the chosen [`ResponseAction`]

use crate::binding::{resolve, ArgumentBinding, Arguments};
use crate::logging::{debug, trace};
use crate::{Error, Json, RequestContext, ResponseAction};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A user method: the owning instance plus resolved arguments in, an outcome out.
pub type UserMethod<T> = Arc<dyn Fn(Arc<T>, Arguments) -> Outcome + Send + Sync>;

/// A compiled handler, not yet bound to an instance.
pub type CompiledHandler<T> =
    Arc<dyn Fn(Arc<T>, RequestContext) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// A compiled handler bound to its instance, ready for a router.
///
/// An `Err` is an uncaught failure; forwarded failures go through `next`.
pub type HandlerFn =
    Arc<dyn Fn(RequestContext) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// What a user method produced.
pub enum Outcome {
    /// Nothing to dispatch; the method handled the response itself.
    Empty,
    /// A value to dispatch, unless it is falsy.
    Value(Value),
    /// A failure to hand to the failure-continuation.
    Failure(Error),
    /// An eventual outcome.
    Pending(BoxFuture<'static, Outcome>),
}

impl Outcome {
    /// Defer to a future whose output converts into an outcome.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future + Send + 'static,
        F::Output: IntoOutcome,
    {
        Outcome::Pending(Box::pin(async move { future.await.into_outcome() }))
    }

    /// Serialize `value`; a serialization failure becomes a forwarded failure.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Outcome::Value(value),
            Err(e) => Outcome::Failure(Error::Serialization(e.to_string())),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Empty => f.write_str("Empty"),
            Outcome::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Outcome::Failure(e) => f.debug_tuple("Failure").field(e).finish(),
            Outcome::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Conversion of method return types into an [`Outcome`].
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Outcome {
        self
    }
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome {
        Outcome::Empty
    }
}

impl IntoOutcome for Value {
    fn into_outcome(self) -> Outcome {
        Outcome::Value(self)
    }
}

impl IntoOutcome for String {
    fn into_outcome(self) -> Outcome {
        Outcome::Value(Value::String(self))
    }
}

impl IntoOutcome for &'static str {
    fn into_outcome(self) -> Outcome {
        Outcome::Value(Value::String(self.to_string()))
    }
}

impl IntoOutcome for bool {
    fn into_outcome(self) -> Outcome {
        Outcome::Value(Value::Bool(self))
    }
}

impl IntoOutcome for Error {
    fn into_outcome(self) -> Outcome {
        Outcome::Failure(self)
    }
}

impl<T: Serialize> IntoOutcome for Json<T> {
    fn into_outcome(self) -> Outcome {
        Outcome::json(&self.0)
    }
}

impl<T: IntoOutcome> IntoOutcome for Option<T> {
    fn into_outcome(self) -> Outcome {
        match self {
            Some(inner) => inner.into_outcome(),
            None => Outcome::Empty,
        }
    }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<Error>,
{
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(inner) => inner.into_outcome(),
            Err(err) => Outcome::Failure(err.into()),
        }
    }
}

/// `null`, `false`, `0` and `""` are falsy; arrays and objects never are.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Wrap `method` into a compiled handler.
///
/// The response action is fixed here; the sink's support for it is checked
/// on every call before the method runs.
pub fn compile<T>(
    method: UserMethod<T>,
    bindings: Vec<ArgumentBinding>,
    action: ResponseAction,
) -> CompiledHandler<T>
where
    T: Send + Sync + 'static,
{
    let bindings: Arc<[ArgumentBinding]> = bindings.into();

    Arc::new(move |instance: Arc<T>, ctx: RequestContext| {
        let method = method.clone();
        let bindings = bindings.clone();

        Box::pin(async move {
            if !ctx.response.supports(action) {
                return Err(Error::ResponseActionNotSupported(action.to_string()));
            }

            let args = resolve(&bindings, &ctx);
            let outcome = method(instance, args);
            settle(outcome, action, &ctx).await
        })
    })
}

/// Bind a compiled handler to its owning instance.
pub fn bind<T>(handler: CompiledHandler<T>, instance: Arc<T>) -> HandlerFn
where
    T: Send + Sync + 'static,
{
    Arc::new(move |ctx: RequestContext| handler(instance.clone(), ctx))
}

async fn settle(
    mut outcome: Outcome,
    action: ResponseAction,
    ctx: &RequestContext,
) -> Result<(), Error> {
    loop {
        match outcome {
            Outcome::Failure(err) => {
                debug!(error = %err, "Forwarding failure to next");
                ctx.next.fail(err);
                return Ok(());
            }
            Outcome::Empty => return Ok(()),
            Outcome::Value(value) if is_falsy(&value) => {
                trace!("Falsy result, skipping dispatch");
                return Ok(());
            }
            Outcome::Value(value) => {
                trace!(action = %action, "Dispatching result");
                return ctx.response.dispatch(action, value);
            }
            Outcome::Pending(future) => outcome = future.await,
        }
    }
}
