use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::LitStr;

/// Map a response action name to its `ResponseAction` path.
pub fn action_tokens(name: &LitStr) -> syn::Result<TokenStream2> {
    let variant = match name.value().as_str() {
        "json" => quote! { Json },
        "send" => quote! { Send },
        "redirect" => quote! { Redirect },
        "send_status" | "sendStatus" => quote! { SendStatus },
        "end" => quote! { End },
        "render" => quote! { Render },
        other => {
            return Err(syn::Error::new(
                name.span(),
                format!("Response action not supported: {}", other),
            ));
        }
    };
    Ok(quote! { ::truss::ResponseAction::#variant })
}
