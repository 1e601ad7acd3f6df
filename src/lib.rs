// Truss - A metadata-driven HTTP framework for Rust
//
// Controllers, exception handlers and middleware declare their routes and
// argument bindings with attributes; the framework compiles them into
// routers at startup and mounts them under a versioned prefix.

// Re-export core functionality
pub use truss_core::*;

// Re-export procedural macros
pub use truss_macro::{controller, exception, middleware, routes};

// Re-export optional crates
#[cfg(feature = "config")]
pub use truss_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AppConfig,
        AppOptions,
        Application,
        Arguments,
        Component,
        Error,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        Json,
        Next,
        Outcome,
        Response,
        ResponseAction,
        Status,
        controller,
        exception,
        middleware,
        routes,
    };
}
