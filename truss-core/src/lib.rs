// Core library for the Truss HTTP framework
// Metadata registration, argument binding, handler compilation and mounting

pub mod application;
pub mod binding;
pub mod context;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod metadata;
pub mod mount;
pub mod response;
pub mod routing;
pub mod traits;

// Re-export commonly used types
pub use application::{AppConfig, AppOptions, Application};
pub use binding::{resolve, Argument, ArgumentBinding, Arguments, BindingSource};
pub use context::{Next, RequestContext};
pub use error::*;
pub use handler::{
    is_falsy, BoxFuture, CompiledHandler, HandlerFn, IntoOutcome, Outcome, UserMethod,
};
pub use self::http::*;
pub use metadata::{
    ClassMetadata, Descriptor, DescriptorTarget, MetadataBuilder, RouteInfo, HANDLE_KEY,
    INTERCEPT_KEY,
};
pub use mount::{MountRegistry, Mounted};
pub use response::{BufferedResponse, Response, ResponseAction, ResponseSink, Status};
pub use routing::{RoutePath, Router};
pub use traits::*;
