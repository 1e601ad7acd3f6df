use crate::params::{BoundParam, is_binding_attr};
use crate::response::action_tokens;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{
    Attribute, FnArg, ImplItem, ImplItemFn, ItemImpl, LitStr, Meta, Type, parse_macro_input,
};

const VERBS: [&str; 5] = ["get", "post", "put", "patch", "delete"];
const METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// What a method is registered as.
enum Target {
    Route {
        method: String,
        path: LitStr,
        response: Option<LitStr>,
    },
    Intercept,
    Handle,
}

enum Receiver {
    None,
    Ref,
    Arc,
}

fn is_route_attr(attr: &Attribute) -> bool {
    attr.path()
        .get_ident()
        .map(|ident| {
            let name = ident.to_string();
            VERBS.contains(&name.as_str()) || matches!(name.as_str(), "route" | "intercept" | "handle")
        })
        .unwrap_or(false)
}

fn parse_target(attr: &Attribute) -> syn::Result<Target> {
    let name = attr
        .path()
        .get_ident()
        .map(|i| i.to_string())
        .unwrap_or_default();

    match name.as_str() {
        "intercept" => {
            attr.meta.require_path_only()?;
            Ok(Target::Intercept)
        }
        "handle" => {
            attr.meta.require_path_only()?;
            Ok(Target::Handle)
        }
        "route" => {
            let mut method = None;
            let mut path = None;
            let mut response = None;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("method") {
                    method = Some(meta.value()?.parse::<LitStr>()?);
                } else if meta.path.is_ident("path") {
                    path = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("response") {
                    response = Some(meta.value()?.parse()?);
                } else {
                    return Err(meta.error("expected `method`, `path` or `response`"));
                }
                Ok(())
            })?;
            let method = method
                .ok_or_else(|| syn::Error::new_spanned(attr, "#[route] needs `method = \"...\"`"))?;
            let verb = method.value().to_uppercase();
            if !METHODS.contains(&verb.as_str()) {
                return Err(syn::Error::new(
                    method.span(),
                    format!("unknown HTTP method: {}", method.value()),
                ));
            }
            Ok(Target::Route {
                method: verb,
                path: path.unwrap_or_else(|| LitStr::new("/", Span::call_site())),
                response,
            })
        }
        verb => {
            let method = verb.to_uppercase();
            let default_path = || LitStr::new("/", Span::call_site());
            match &attr.meta {
                Meta::Path(_) => Ok(Target::Route {
                    method,
                    path: default_path(),
                    response: None,
                }),
                _ => {
                    // #[get("/items")]
                    if let Ok(path) = attr.parse_args::<LitStr>() {
                        return Ok(Target::Route {
                            method,
                            path,
                            response: None,
                        });
                    }
                    // #[get(path = "/items", response = "send")]
                    let mut path = None;
                    let mut response = None;
                    attr.parse_nested_meta(|meta| {
                        if meta.path.is_ident("path") {
                            path = Some(meta.value()?.parse()?);
                        } else if meta.path.is_ident("response") {
                            response = Some(meta.value()?.parse()?);
                        } else {
                            return Err(meta.error("expected `path` or `response`"));
                        }
                        Ok(())
                    })?;
                    Ok(Target::Route {
                        method,
                        path: path.unwrap_or_else(default_path),
                        response,
                    })
                }
            }
        }
    }
}

fn parse_receiver(method: &ImplItemFn) -> syn::Result<Receiver> {
    let Some(FnArg::Receiver(receiver)) = method.sig.inputs.first() else {
        return Ok(Receiver::None);
    };

    if receiver.colon_token.is_some() {
        // self: Arc<Self>
        if let Type::Path(path) = receiver.ty.as_ref()
            && path.path.segments.last().is_some_and(|s| s.ident == "Arc")
        {
            return Ok(Receiver::Arc);
        }
    } else if receiver.reference.is_some() && receiver.mutability.is_none() {
        return Ok(Receiver::Ref);
    }

    Err(syn::Error::new_spanned(
        receiver,
        "route methods take `&self`, `self: Arc<Self>` or no receiver",
    ))
}

/// The `MetadataBuilder` calls declaring one method.
fn declare_method(method: &ImplItemFn, target: Target) -> syn::Result<TokenStream2> {
    let name = &method.sig.ident;
    let receiver = parse_receiver(method)?;

    let params = method
        .sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(param) => Some(param),
            FnArg::Receiver(_) => None,
        })
        .enumerate()
        .map(|(position, param)| BoundParam::parse(param, position))
        .collect::<syn::Result<Vec<_>>>()?;

    let key = match &target {
        Target::Route { .. } => {
            let key = LitStr::new(&name.to_string(), name.span());
            quote! { #key }
        }
        Target::Intercept => quote! { ::truss::INTERCEPT_KEY },
        Target::Handle => quote! { ::truss::HANDLE_KEY },
    };

    let binds = params.iter().map(|p| p.bind_call(&key));
    let extractions = params.iter().map(BoundParam::extraction);
    let call_args = params.iter().map(BoundParam::call_arg);

    let (this_arg, discard) = match receiver {
        Receiver::None => (quote! {}, quote! { let _ = __this; }),
        Receiver::Ref => (quote! { &__this, }, quote! {}),
        Receiver::Arc => (quote! { __this, }, quote! {}),
    };
    let call = quote! { Self::#name(#this_arg #(#call_args),*) };

    let invoke = if method.sig.asyncness.is_some() {
        quote! { ::truss::Outcome::pending(async move { #call.await }) }
    } else {
        quote! { ::truss::IntoOutcome::into_outcome(#call) }
    };

    let closure = quote! {
        |__this: ::std::sync::Arc<Self>, __args: ::truss::Arguments| -> ::truss::Outcome {
            #discard
            #(#extractions)*
            #invoke
        }
    };

    let register = match target {
        Target::Route {
            method: verb,
            path,
            response,
        } => {
            let verb = format_ident!("{}", verb);
            let response = response
                .as_ref()
                .map(action_tokens)
                .transpose()?
                .map(|action| quote! { .response_type(#action) });
            quote! {
                .route(
                    #key,
                    ::truss::RouteInfo::new(::truss::HttpMethod::#verb, #path) #response,
                    #closure,
                )
            }
        }
        Target::Intercept => quote! { .intercept(#closure) },
        Target::Handle => quote! { .handle(#closure) },
    };

    Ok(quote! {
        #(#binds)*
        #register
    })
}

fn strip_attrs(method: &ImplItemFn) -> ImplItemFn {
    let mut method = method.clone();
    method.attrs.retain(|attr| !is_route_attr(attr));
    for arg in method.sig.inputs.iter_mut() {
        if let FnArg::Typed(param) = arg {
            param.attrs.retain(|attr| !is_binding_attr(attr));
        }
    }
    method
}

pub fn routes_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    let _ = attr;
    let input = parse_macro_input!(item as ItemImpl);

    if let Some((_, path, _)) = &input.trait_ {
        return syn::Error::new_spanned(path, "#[routes] goes on an inherent impl block")
            .to_compile_error()
            .into();
    }

    let mut declarations: Vec<TokenStream2> = Vec::new();
    let mut items: Vec<ImplItem> = Vec::new();
    let mut errors: Option<syn::Error> = None;

    for item in &input.items {
        let ImplItem::Fn(method) = item else {
            items.push(item.clone());
            continue;
        };

        let mut targets = method.attrs.iter().filter(|a| is_route_attr(a));
        let declared = match (targets.next(), targets.next()) {
            (None, _) => None,
            (Some(attr), None) => Some(parse_target(attr).and_then(|t| declare_method(method, t))),
            (Some(_), Some(extra)) => Some(Err(syn::Error::new_spanned(
                extra,
                "a method takes exactly one route attribute",
            ))),
        };

        match declared {
            Some(Ok(tokens)) => declarations.push(tokens),
            Some(Err(e)) => match errors.as_mut() {
                Some(existing) => existing.combine(e),
                None => errors = Some(e),
            },
            None => {}
        }
        items.push(ImplItem::Fn(strip_attrs(method)));
    }

    if let Some(errors) = errors {
        return errors.to_compile_error().into();
    }

    let attrs = &input.attrs;
    let self_ty = &input.self_ty;
    let (impl_generics, _, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        #(#attrs)*
        impl #impl_generics #self_ty #where_clause {
            #(#items)*

            /// Route and binding declarations, generated by `#[routes]`.
            #[doc(hidden)]
            pub fn __truss_declare(
                builder: ::truss::MetadataBuilder<Self>,
            ) -> ::truss::MetadataBuilder<Self> {
                builder
                    #(#declarations)*
            }
        }
    };

    TokenStream::from(expanded)
}
