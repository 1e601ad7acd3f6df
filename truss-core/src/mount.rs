//! Mount compilation: turning compiled metadata into router-attached handlers.
//!
//! A [`MountRegistry`] builds each component type's [`ClassMetadata`] once and
//! shares it between instances. Controllers also get one memoized [`Router`]
//! per type, so mounting the same type twice adds its routes to the same
//! router again rather than creating a second one.

use crate::handler::{self, HandlerFn};
use crate::logging::debug;
use crate::metadata::{HANDLE_KEY, INTERCEPT_KEY};
use crate::{ClassMetadata, Component, Error, Router};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What mounting one instance produced, ready to attach to a parent router.
pub enum Mounted {
    /// A controller's routes.
    Router { path: String, router: Arc<Router> },
    /// An exception type's error-handling entry point.
    ErrorHandler { path: String, handler: HandlerFn },
    /// A middleware type's handler.
    Middleware { path: String, handler: HandlerFn },
}

impl Mounted {
    pub fn path(&self) -> &str {
        match self {
            Mounted::Router { path, .. }
            | Mounted::ErrorHandler { path, .. }
            | Mounted::Middleware { path, .. } => path,
        }
    }

    /// Attach to `parent` at this value's path.
    pub fn attach(self, parent: &Router) {
        match self {
            Mounted::Router { path, router } => parent.mount(&path, router),
            Mounted::ErrorHandler { path, handler } => parent.error(&path, handler),
            Mounted::Middleware { path, handler } => parent.use_handler(&path, handler),
        }
    }
}

impl fmt::Debug for Mounted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mounted::Router { path, router } => f
                .debug_struct("Router")
                .field("path", path)
                .field("router", router)
                .finish(),
            Mounted::ErrorHandler { path, .. } => {
                f.debug_struct("ErrorHandler").field("path", path).finish()
            }
            Mounted::Middleware { path, .. } => {
                f.debug_struct("Middleware").field("path", path).finish()
            }
        }
    }
}

type SharedMetadata = Arc<dyn Any + Send + Sync>;

/// Per-type metadata and router cache, keyed by type identity.
#[derive(Default)]
pub struct MountRegistry {
    metadata: Mutex<HashMap<TypeId, SharedMetadata>>,
    routers: Mutex<HashMap<TypeId, Arc<Router>>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared metadata of `T`, built on first use.
    pub fn metadata<T: Component>(&self) -> Arc<ClassMetadata<T>> {
        let key = TypeId::of::<T>();
        let cached = self.metadata.lock().get(&key).cloned();
        if let Some(metadata) = cached.and_then(|any| any.downcast::<ClassMetadata<T>>().ok()) {
            return metadata;
        }

        let built: Arc<ClassMetadata<T>> = Arc::new(T::metadata());
        debug!(
            component = std::any::type_name::<T>(),
            methods = built.len(),
            "Built class metadata"
        );

        let mut cache = self.metadata.lock();
        let entry = cache.entry(key).or_insert_with(|| built.clone() as SharedMetadata);
        entry
            .clone()
            .downcast::<ClassMetadata<T>>()
            .unwrap_or(built)
    }

    /// The memoized router of controller type `T`.
    pub fn router<T: Component>(&self) -> Arc<Router> {
        self.routers
            .lock()
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                debug!(component = std::any::type_name::<T>(), "Created class router");
                Arc::new(Router::new())
            })
            .clone()
    }

    pub fn has_router<T: Component>(&self) -> bool {
        self.routers.lock().contains_key(&TypeId::of::<T>())
    }

    /// Register every route of `instance` on its type's router.
    ///
    /// Nothing is registered if any descriptor fails validation.
    pub fn mount_controller<T: Component>(&self, instance: Arc<T>) -> Result<Mounted, Error> {
        let metadata = self.metadata::<T>();
        check_orphans(&metadata)?;

        let mut routes = Vec::with_capacity(metadata.len());
        for (key, descriptor) in metadata.descriptors() {
            let route = descriptor
                .route()
                .ok_or_else(|| Error::MissingDescriptor(key.to_string()))?;
            let compiled = descriptor
                .compiled
                .clone()
                .ok_or_else(|| Error::MissingHandler(key.to_string()))?;
            routes.push((route, compiled));
        }

        let router = self.router::<T>();
        for (route, compiled) in routes {
            router.route(
                route.method,
                route.path.clone(),
                handler::bind(compiled, instance.clone()),
            );
        }

        debug!(
            component = std::any::type_name::<T>(),
            routes = metadata.len(),
            "Mounted controller"
        );

        Ok(Mounted::Router {
            path: class_path(&metadata),
            router,
        })
    }

    /// Bind the single `intercept` method of `instance` as an error handler.
    pub fn mount_exception<T: Component>(&self, instance: Arc<T>) -> Result<Mounted, Error> {
        let metadata = self.metadata::<T>();
        let handler = single_handler(&metadata, INTERCEPT_KEY, instance)?;
        debug!(component = std::any::type_name::<T>(), "Mounted exception handler");
        Ok(Mounted::ErrorHandler {
            path: class_path(&metadata),
            handler,
        })
    }

    /// Bind the single `handle` method of `instance` as middleware.
    pub fn mount_middleware<T: Component>(&self, instance: Arc<T>) -> Result<Mounted, Error> {
        let metadata = self.metadata::<T>();
        let handler = single_handler(&metadata, HANDLE_KEY, instance)?;
        debug!(component = std::any::type_name::<T>(), "Mounted middleware");
        Ok(Mounted::Middleware {
            path: class_path(&metadata),
            handler,
        })
    }
}

impl fmt::Debug for MountRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountRegistry")
            .field("metadata", &self.metadata.lock().len())
            .field("routers", &self.routers.lock().len())
            .finish()
    }
}

fn class_path<T>(metadata: &ClassMetadata<T>) -> String {
    metadata.path().unwrap_or("/").to_string()
}

fn check_orphans<T>(metadata: &ClassMetadata<T>) -> Result<(), Error> {
    match metadata.orphan_bindings().first() {
        Some(key) => Err(Error::MissingDescriptor(key.to_string())),
        None => Ok(()),
    }
}

fn single_handler<T: Component>(
    metadata: &ClassMetadata<T>,
    key: &str,
    instance: Arc<T>,
) -> Result<HandlerFn, Error> {
    check_orphans(metadata)?;
    if let Some((other, _)) = metadata.descriptors().find(|(k, _)| *k != key) {
        return Err(Error::MissingDescriptor(other.to_string()));
    }
    let descriptor = metadata
        .descriptor(key)
        .ok_or_else(|| Error::MissingDescriptor(key.to_string()))?;
    let compiled = descriptor
        .compiled
        .clone()
        .ok_or_else(|| Error::MissingHandler(key.to_string()))?;
    Ok(handler::bind(compiled, instance))
}
