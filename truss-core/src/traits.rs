// Core traits for the Truss framework

use crate::ClassMetadata;

/// A type that declares routing metadata: controllers, exceptions and
/// middlewares.
///
/// Usually implemented by `#[controller]`, `#[exception]` or `#[middleware]`
/// together with `#[routes]`, but a hand-written impl works the same:
///
/// ```
/// use truss_core::{ClassMetadata, Component};
/// use serde_json::json;
///
/// struct Health;
///
/// impl Component for Health {
///     fn metadata() -> ClassMetadata<Self> {
///         ClassMetadata::builder()
///             .path("/health")
///             .get("check", "/", |_this, _args| json!({ "status": "ok" }))
///             .build()
///     }
/// }
///
/// assert_eq!(Health::metadata().path(), Some("/health"));
/// ```
pub trait Component: Send + Sync + Sized + 'static {
    /// Build the compiled metadata of this type.
    ///
    /// Called once per type by a [`MountRegistry`](crate::MountRegistry),
    /// which shares the result between all mounted instances.
    fn metadata() -> ClassMetadata<Self>;
}
