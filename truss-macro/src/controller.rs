use crate::response::action_tokens;
use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, LitStr, parse_macro_input};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Controller,
    Exception,
    Middleware,
}

impl ComponentKind {
    fn name(self) -> &'static str {
        match self {
            ComponentKind::Controller => "controller",
            ComponentKind::Exception => "exception",
            ComponentKind::Middleware => "middleware",
        }
    }
}

#[derive(Default)]
struct ComponentArgs {
    path: Option<LitStr>,
    response: Option<LitStr>,
}

fn parse_args(attr: TokenStream) -> syn::Result<ComponentArgs> {
    if attr.is_empty() {
        return Ok(ComponentArgs::default());
    }

    // #[controller("/items")]
    if let Ok(path) = syn::parse::<LitStr>(attr.clone()) {
        return Ok(ComponentArgs {
            path: Some(path),
            response: None,
        });
    }

    // #[controller(path = "/items", response = "send")]
    let mut args = ComponentArgs::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("path") {
            args.path = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("response") {
            args.response = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("expected `path` or `response`"))
        }
    });
    syn::parse::Parser::parse(parser, attr)?;
    Ok(args)
}

pub fn component_impl(attr: TokenStream, item: TokenStream, kind: ComponentKind) -> TokenStream {
    let input = parse_macro_input!(item as ItemStruct);
    let args = match parse_args(attr) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };

    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let path_call = args.path.as_ref().map(|path| quote! { .path(#path) });

    let response_call = match (&args.response, kind) {
        (None, _) => None,
        (Some(name), ComponentKind::Middleware) => {
            return syn::Error::new(
                name.span(),
                format!("`response` is not allowed on a {}", kind.name()),
            )
            .to_compile_error()
            .into();
        }
        (Some(name), _) => match action_tokens(name) {
            Ok(action) => Some(quote! { .response_type(#action) }),
            Err(e) => return e.to_compile_error().into(),
        },
    };

    let expanded = quote! {
        #input

        impl #impl_generics ::truss::Component for #struct_name #ty_generics #where_clause {
            fn metadata() -> ::truss::ClassMetadata<Self> {
                let builder = ::truss::MetadataBuilder::<Self>::new()
                    #path_call
                    #response_call;
                Self::__truss_declare(builder).build()
            }
        }
    };

    TokenStream::from(expanded)
}
