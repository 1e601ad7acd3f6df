use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{Attribute, Ident, LitStr, PatType, Type};

/// Where one parameter of a route method comes from.
pub enum Source {
    Param(LitStr),
    Query(LitStr),
    Body(LitStr),
    Header(LitStr),
    Status,
    Next,
    Request,
    Response,
    Error,
}

const LOOKUPS: [&str; 4] = ["param", "query", "body", "header"];
const CONTEXTS: [&str; 5] = ["status", "next", "request", "response", "error"];

pub fn is_binding_attr(attr: &Attribute) -> bool {
    attr.path()
        .get_ident()
        .map(|ident| {
            let name = ident.to_string();
            LOOKUPS.contains(&name.as_str()) || CONTEXTS.contains(&name.as_str())
        })
        .unwrap_or(false)
}

/// A parameter with its binding and position.
pub struct BoundParam {
    pub source: Source,
    pub position: usize,
    pub by_ref: bool,
    pub ty: Type,
}

impl BoundParam {
    pub fn parse(param: &PatType, position: usize) -> syn::Result<Self> {
        let mut found = None;
        for attr in param.attrs.iter().filter(|a| is_binding_attr(a)) {
            if found.is_some() {
                return Err(syn::Error::new_spanned(
                    attr,
                    "a parameter takes exactly one binding attribute",
                ));
            }
            found = Some(parse_source(attr)?);
        }

        let source = found.ok_or_else(|| {
            syn::Error::new_spanned(
                &param.pat,
                "route parameters need a binding attribute such as #[param(\"id\")] or #[request]",
            )
        })?;

        let by_ref = matches!(param.ty.as_ref(), Type::Reference(_));
        Ok(Self {
            source,
            position,
            by_ref,
            ty: (*param.ty).clone(),
        })
    }

    pub fn local(&self) -> Ident {
        format_ident!("__arg{}", self.position)
    }

    /// `.bind(key, ArgumentBinding)` for this parameter.
    pub fn bind_call(&self, key: &TokenStream2) -> TokenStream2 {
        let position = self.position;
        let binding = match &self.source {
            Source::Param(name) => quote! { ::truss::ArgumentBinding::param(#name, #position) },
            Source::Query(name) => quote! { ::truss::ArgumentBinding::query(#name, #position) },
            Source::Body(name) => quote! { ::truss::ArgumentBinding::body(#name, #position) },
            Source::Header(name) => quote! { ::truss::ArgumentBinding::header(#name, #position) },
            Source::Status => context(quote! { Status }, position),
            Source::Next => context(quote! { Next }, position),
            Source::Request => context(quote! { Request }, position),
            Source::Response => context(quote! { Response }, position),
            Source::Error => context(quote! { Error }, position),
        };
        quote! { .bind(#key, #binding) }
    }

    /// `let __argN = ...;` pulling this parameter out of `__args`.
    pub fn extraction(&self) -> TokenStream2 {
        let local = self.local();
        let position = self.position;
        let accessor = match &self.source {
            Source::Param(_) | Source::Query(_) | Source::Body(_) | Source::Header(_) => {
                let ty = match &self.ty {
                    Type::Reference(reference) if is_str(&reference.elem) => {
                        syn::parse_quote! { ::std::string::String }
                    }
                    Type::Reference(reference) => reference.elem.as_ref().clone(),
                    other => other.clone(),
                };
                quote! { __args.value::<#ty>(#position) }
            }
            Source::Status => quote! { __args.status(#position) },
            Source::Next => quote! { __args.next(#position) },
            Source::Request => quote! { __args.request(#position) },
            Source::Response => quote! { __args.response(#position) },
            Source::Error => quote! { __args.error(#position) },
        };
        quote! {
            let #local = match #accessor {
                Ok(value) => value,
                Err(e) => return ::truss::Outcome::Failure(e),
            };
        }
    }

    /// The expression passed to the user method.
    pub fn call_arg(&self) -> TokenStream2 {
        let local = self.local();
        if self.by_ref {
            quote! { &#local }
        } else {
            quote! { #local }
        }
    }
}

fn is_str(ty: &Type) -> bool {
    matches!(ty, Type::Path(path) if path.qself.is_none() && path.path.is_ident("str"))
}

fn context(variant: TokenStream2, position: usize) -> TokenStream2 {
    quote! { ::truss::ArgumentBinding::context(::truss::BindingSource::#variant, #position) }
}

fn parse_source(attr: &Attribute) -> syn::Result<Source> {
    let name = attr
        .path()
        .get_ident()
        .map(|i| i.to_string())
        .unwrap_or_default();

    if LOOKUPS.contains(&name.as_str()) {
        let key: LitStr = attr.parse_args().map_err(|_| {
            syn::Error::new_spanned(attr, format!("expected #[{}(\"name\")]", name))
        })?;
        return Ok(match name.as_str() {
            "param" => Source::Param(key),
            "query" => Source::Query(key),
            "body" => Source::Body(key),
            _ => Source::Header(key),
        });
    }

    if attr.meta.require_path_only().is_err() {
        return Err(syn::Error::new_spanned(
            attr,
            format!("#[{}] takes no arguments", name),
        ));
    }
    Ok(match name.as_str() {
        "status" => Source::Status,
        "next" => Source::Next,
        "request" => Source::Request,
        "response" => Source::Response,
        "error" => Source::Error,
        _ => return Err(syn::Error::new(Span::call_site(), "unknown binding attribute")),
    })
}
