use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Expr, FnArg, ItemFn, Lit, MetaNameValue, Pat, ReturnType};

/// Reads `name = "..."`, the only supported attribute argument.
fn display_name(attr: TokenStream2) -> syn::Result<Option<String>> {
    if attr.is_empty() {
        return Ok(None);
    }
    let meta = syn::parse2::<MetaNameValue>(attr)?;
    if !meta.path.is_ident("name") {
        return Err(syn::Error::new_spanned(meta.path, "unsupported component attribute"));
    }
    match meta.value {
        Expr::Lit(expr) => match expr.lit {
            Lit::Str(name) => Ok(Some(name.value())),
            other => Err(syn::Error::new_spanned(other, "component name must be a string")),
        },
        other => Err(syn::Error::new_spanned(other, "component name must be a string")),
    }
}

fn expand(attr: TokenStream2, func: ItemFn) -> syn::Result<TokenStream2> {
    let name = display_name(attr)?;
    let sig = &func.sig;
    if !sig.generics.params.is_empty() || sig.generics.where_clause.is_some() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "components cannot be generic; use a `FunctionComponent` impl instead",
        ));
    }
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new_spanned(asyncness, "components cannot be async"));
    }
    if matches!(sig.output, ReturnType::Default) {
        return Err(syn::Error::new_spanned(
            sig,
            "components must return `RenderResult`",
        ));
    }

    // A component without a props argument still receives them.
    let props_pat: Box<Pat> = match sig.inputs.len() {
        0 => syn::parse_quote! { _props },
        1 => match &sig.inputs[0] {
            FnArg::Typed(arg) => arg.pat.clone(),
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new_spanned(receiver, "components cannot take `self`"));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &sig.inputs,
                "components take a single `&Props` argument",
            ));
        }
    };

    let ident = &sig.ident;
    let name = name.unwrap_or_else(|| ident.to_string());
    let vis = &func.vis;
    let attrs = &func.attrs;
    let output = &sig.output;
    let block = &func.block;

    Ok(quote! {
        #(#attrs)*
        #[allow(non_camel_case_types)]
        #[derive(Clone, Copy, Debug, Default)]
        #vis struct #ident;

        impl ::vdom_core::FunctionComponent for #ident {
            fn name(&self) -> &'static str {
                #name
            }

            fn render(&self, #props_pat: &::vdom_core::Props) #output #block
        }
    })
}

/// Turns a render function into a unit component type.
///
/// ```ignore
/// #[component]
/// fn Greeting(props: &Props) -> RenderResult {
///     let name = props.get_str("name").unwrap_or("world");
///     Ok(format!("hello {name}").into())
/// }
///
/// renderer.render(Greeting.element().prop("name", "vdom"), root)?;
/// ```
///
/// The props argument may be omitted. `#[component(name = "Label")]`
/// overrides the name reported to observers.
#[proc_macro_attribute]
pub fn component(attr: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as ItemFn);
    match expand(TokenStream2::from(attr), func) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
