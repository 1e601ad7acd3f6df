// Procedural macros for the Truss HTTP framework
// Attribute syntax that declares routing metadata on structs and impl blocks

use proc_macro::TokenStream;

mod controller;
mod params;
mod response;
mod routes;

use controller::ComponentKind;

/// Marks a struct as a controller.
///
/// ```ignore
/// #[controller("/items")]
/// struct Items;
///
/// #[controller(path = "/pages", response = "send")]
/// struct Pages;
/// ```
///
/// The struct needs a `#[routes]` impl block declaring its methods.
#[proc_macro_attribute]
pub fn controller(attr: TokenStream, item: TokenStream) -> TokenStream {
    controller::component_impl(attr, item, ComponentKind::Controller)
}

/// Marks a struct as an exception handler with one `#[intercept]` method.
#[proc_macro_attribute]
pub fn exception(attr: TokenStream, item: TokenStream) -> TokenStream {
    controller::component_impl(attr, item, ComponentKind::Exception)
}

/// Marks a struct as middleware with one `#[handle]` method.
#[proc_macro_attribute]
pub fn middleware(attr: TokenStream, item: TokenStream) -> TokenStream {
    controller::component_impl(attr, item, ComponentKind::Middleware)
}

/// Collects route methods and parameter bindings of an impl block.
///
/// Route attributes: `#[get]`, `#[post]`, `#[put]`, `#[patch]`, `#[delete]`,
/// `#[route(method = "GET", path = "/", response = "json")]`, `#[intercept]`
/// and `#[handle]`. Every parameter of a route method needs one of
/// `#[param("name")]`, `#[query("name")]`, `#[body("name")]`,
/// `#[header("name")]`, `#[status]`, `#[next]`, `#[request]`, `#[response]`
/// or `#[error]`.
#[proc_macro_attribute]
pub fn routes(attr: TokenStream, item: TokenStream) -> TokenStream {
    routes::routes_impl(attr, item)
}
