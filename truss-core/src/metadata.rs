//! Per-class routing metadata.
//!
//! [`ClassMetadata`] accumulates the method registry and the argument store of
//! one annotated type. Registration is two-phase: bindings and descriptors are
//! collected in any order, then [`ClassMetadata::compile`] attaches the full
//! binding list to every descriptor and compiles its handler.
//! [`MetadataBuilder`] wraps both phases behind a chainable API.

use crate::binding::{ArgumentBinding, Arguments};
use crate::handler::{self, CompiledHandler, IntoOutcome, UserMethod};
use crate::logging::debug;
use crate::{HttpMethod, ResponseAction, RoutePath};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reserved method key of an exception type's error-handling method.
pub const INTERCEPT_KEY: &str = "intercept";

/// Reserved method key of a middleware type's handling method.
pub const HANDLE_KEY: &str = "handle";

/// Verb, path and optional response override of one route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInfo {
    pub method: HttpMethod,
    pub path: RoutePath,
    pub response_type: Option<ResponseAction>,
}

impl RouteInfo {
    pub fn new(method: HttpMethod, path: impl Into<RoutePath>) -> Self {
        Self {
            method,
            path: path.into(),
            response_type: None,
        }
    }

    pub fn get(path: impl Into<RoutePath>) -> Self {
        Self::new(HttpMethod::GET, path)
    }

    pub fn post(path: impl Into<RoutePath>) -> Self {
        Self::new(HttpMethod::POST, path)
    }

    pub fn put(path: impl Into<RoutePath>) -> Self {
        Self::new(HttpMethod::PUT, path)
    }

    pub fn patch(path: impl Into<RoutePath>) -> Self {
        Self::new(HttpMethod::PATCH, path)
    }

    pub fn delete(path: impl Into<RoutePath>) -> Self {
        Self::new(HttpMethod::DELETE, path)
    }

    /// Override the class-level response action for this route.
    pub fn response_type(mut self, action: ResponseAction) -> Self {
        self.response_type = Some(action);
        self
    }
}

/// What a descriptor is mounted as.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorTarget {
    Route(RouteInfo),
    Intercept,
    Middleware,
}

/// A registered method: target, implementation and argument bindings.
pub struct Descriptor<T> {
    pub target: DescriptorTarget,
    pub response_type: Option<ResponseAction>,
    pub method: UserMethod<T>,
    pub bindings: Vec<ArgumentBinding>,
    pub compiled: Option<CompiledHandler<T>>,
}

impl<T> Descriptor<T> {
    pub fn route(&self) -> Option<&RouteInfo> {
        match &self.target {
            DescriptorTarget::Route(route) => Some(route),
            _ => None,
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }
}

impl<T> fmt::Debug for Descriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("target", &self.target)
            .field("response_type", &self.response_type)
            .field("bindings", &self.bindings)
            .field("compiled", &self.compiled.is_some())
            .finish()
    }
}

/// Routing shape of one annotated type, shared by all of its instances.
pub struct ClassMetadata<T> {
    path: Option<String>,
    response_type: Option<ResponseAction>,
    methods: Vec<(String, Descriptor<T>)>,
    arguments: HashMap<String, Vec<ArgumentBinding>>,
}

impl<T> ClassMetadata<T> {
    pub fn new() -> Self {
        Self {
            path: None,
            response_type: None,
            methods: Vec::new(),
            arguments: HashMap::new(),
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = Some(path.into());
    }

    /// Class-level response action, if one was declared.
    pub fn response_type(&self) -> Option<ResponseAction> {
        self.response_type
    }

    pub fn set_response_type(&mut self, action: ResponseAction) {
        self.response_type = Some(action);
    }

    /// Append a binding for `key`; existing bindings are kept.
    pub fn add_binding(&mut self, key: impl Into<String>, binding: ArgumentBinding) {
        self.arguments.entry(key.into()).or_default().push(binding);
    }

    pub fn bindings(&self, key: &str) -> &[ArgumentBinding] {
        self.arguments.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Store a route descriptor for `key`, replacing any earlier one.
    pub fn register(&mut self, key: impl Into<String>, route: RouteInfo, method: UserMethod<T>) {
        let response_type = route.response_type;
        self.insert(key.into(), DescriptorTarget::Route(route), response_type, method);
    }

    /// Store the error-handling method under [`INTERCEPT_KEY`].
    pub fn register_intercept(&mut self, method: UserMethod<T>) {
        self.insert(
            INTERCEPT_KEY.to_string(),
            DescriptorTarget::Intercept,
            None,
            method,
        );
    }

    /// Store the middleware method under [`HANDLE_KEY`].
    pub fn register_middleware(&mut self, method: UserMethod<T>) {
        self.insert(
            HANDLE_KEY.to_string(),
            DescriptorTarget::Middleware,
            None,
            method,
        );
    }

    fn insert(
        &mut self,
        key: String,
        target: DescriptorTarget,
        response_type: Option<ResponseAction>,
        method: UserMethod<T>,
    ) {
        let descriptor = Descriptor {
            target,
            response_type,
            method,
            bindings: self.bindings(&key).to_vec(),
            compiled: None,
        };
        debug!(method = %key, target = ?descriptor.target, "Registered descriptor");

        match self.methods.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = descriptor,
            None => self.methods.push((key, descriptor)),
        }
    }

    pub fn descriptor(&self, key: &str) -> Option<&Descriptor<T>> {
        self.methods
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, descriptor)| descriptor)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = (&str, &Descriptor<T>)> {
        self.methods.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Method keys that have bindings but no descriptor.
    pub fn orphan_bindings(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .arguments
            .keys()
            .map(String::as_str)
            .filter(|key| self.descriptor(key).is_none())
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn is_compiled(&self) -> bool {
        self.methods.iter().all(|(_, d)| d.is_compiled())
    }
}

impl<T: Send + Sync + 'static> ClassMetadata<T> {
    /// Start a [`MetadataBuilder`].
    pub fn builder() -> MetadataBuilder<T> {
        MetadataBuilder::new()
    }

    /// Attach every accumulated binding and compile each descriptor.
    ///
    /// Per-route response actions win over the class default, which falls
    /// back to JSON.
    pub fn compile(&mut self) {
        let class_default = self.response_type;
        for (key, descriptor) in self.methods.iter_mut() {
            descriptor.bindings = self.arguments.get(key).cloned().unwrap_or_default();
            let action = descriptor
                .response_type
                .or(class_default)
                .unwrap_or_default();
            descriptor.compiled = Some(handler::compile(
                descriptor.method.clone(),
                descriptor.bindings.clone(),
                action,
            ));
            debug!(
                method = %key,
                action = %action,
                bindings = descriptor.bindings.len(),
                "Compiled handler"
            );
        }
    }
}

impl<T> Default for ClassMetadata<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ClassMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMetadata")
            .field("path", &self.path)
            .field("response_type", &self.response_type)
            .field("methods", &self.methods)
            .field("arguments", &self.arguments)
            .finish()
    }
}

fn user_method<T, F, R>(f: F) -> UserMethod<T>
where
    F: Fn(Arc<T>, Arguments) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    Arc::new(move |this, args| f(this, args).into_outcome())
}

/// Chainable, two-phase construction of [`ClassMetadata`].
///
/// ```
/// use truss_core::{ArgumentBinding, ClassMetadata, Outcome};
/// use serde_json::json;
///
/// struct Items;
///
/// let metadata = ClassMetadata::<Items>::builder()
///     .path("/items")
///     .get("list", "/", |_this, args| {
///         let q: Option<String> = args.value(0)?;
///         Ok::<_, truss_core::Error>(json!({ "q": q }))
///     })
///     .bind("list", ArgumentBinding::query("q", 0))
///     .build();
///
/// assert_eq!(metadata.bindings("list").len(), 1);
/// assert!(metadata.is_compiled());
/// ```
pub struct MetadataBuilder<T> {
    metadata: ClassMetadata<T>,
}

impl<T: Send + Sync + 'static> MetadataBuilder<T> {
    pub fn new() -> Self {
        Self {
            metadata: ClassMetadata::new(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.metadata.set_path(path);
        self
    }

    pub fn response_type(mut self, action: ResponseAction) -> Self {
        self.metadata.set_response_type(action);
        self
    }

    pub fn bind(mut self, key: impl Into<String>, binding: ArgumentBinding) -> Self {
        self.metadata.add_binding(key, binding);
        self
    }

    pub fn route<F, R>(mut self, key: impl Into<String>, route: RouteInfo, f: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.metadata.register(key, route, user_method(f));
        self
    }

    pub fn get<F, R>(self, key: impl Into<String>, path: impl Into<RoutePath>, f: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.route(key, RouteInfo::get(path), f)
    }

    pub fn post<F, R>(self, key: impl Into<String>, path: impl Into<RoutePath>, f: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.route(key, RouteInfo::post(path), f)
    }

    pub fn put<F, R>(self, key: impl Into<String>, path: impl Into<RoutePath>, f: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.route(key, RouteInfo::put(path), f)
    }

    pub fn patch<F, R>(self, key: impl Into<String>, path: impl Into<RoutePath>, f: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.route(key, RouteInfo::patch(path), f)
    }

    pub fn delete<F, R>(self, key: impl Into<String>, path: impl Into<RoutePath>, f: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.route(key, RouteInfo::delete(path), f)
    }

    /// Register the error-handling method of an exception type.
    pub fn intercept<F, R>(mut self, f: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.metadata.register_intercept(user_method(f));
        self
    }

    /// Register the handling method of a middleware type.
    pub fn handle<F, R>(mut self, f: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.metadata.register_middleware(user_method(f));
        self
    }

    /// Compile every descriptor and return the finished metadata.
    pub fn build(mut self) -> ClassMetadata<T> {
        self.metadata.compile();
        self.metadata
    }
}

impl<T: Send + Sync + 'static> Default for MetadataBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
