//! Procedural macros for GeoGPT function registration.
//!
//! `#[register_function]` keeps the annotated function exactly as written and
//! emits a static registration beside it, so the function stays directly
//! callable by its module while also being discoverable through a registry.

use proc_macro::TokenStream;
use proc_macro_crate::{FoundCrate, crate_name};
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{Error, Expr, ExprArray, ExprLit, ItemFn, Lit, LitStr, Meta, MetaNameValue, Token};

/// Registers a function as a GeoGPT tool.
///
/// The function must take a single `serde_json::Value` and return
/// `ToolResult<serde_json::Value>`; it may be `async`. Accepted arguments:
///
/// - `name = "..."`: registry key, defaults to the function name.
/// - `description = "..."`: defaults to the function's doc comment.
/// - `inputs = [...]`, `outputs = [...]`, `tags = [...]`: string lists.
///
/// ```ignore
/// #[register_function(name = "gpkg_to_kml", tags = ["conversion", "kml"])]
/// fn gpkg_to_kml(input: Value) -> ToolResult<Value> { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn register_function(attr: TokenStream, item: TokenStream) -> TokenStream {
    let function = syn::parse_macro_input!(item as ItemFn);
    match expand(attr.into(), &function) {
        Ok(tokens) => tokens.into(),
        Err(err) => {
            let err = err.to_compile_error();
            quote!(#function #err).into()
        }
    }
}

#[derive(Default)]
struct Args {
    name: Option<LitStr>,
    description: Option<LitStr>,
    inputs: Vec<LitStr>,
    outputs: Vec<LitStr>,
    tags: Vec<LitStr>,
}

fn parse_args(attr: TokenStream2) -> syn::Result<Args> {
    let pairs = Punctuated::<MetaNameValue, Token![,]>::parse_terminated.parse2(attr)?;
    let mut args = Args::default();
    for pair in pairs {
        let key = pair
            .path
            .get_ident()
            .map(ToString::to_string)
            .unwrap_or_default();
        match key.as_str() {
            "name" => args.name = Some(string_literal(&pair.value)?),
            "description" => args.description = Some(string_literal(&pair.value)?),
            "inputs" => args.inputs = string_list(&pair.value)?,
            "outputs" => args.outputs = string_list(&pair.value)?,
            "tags" => args.tags = string_list(&pair.value)?,
            _ => {
                return Err(Error::new_spanned(
                    &pair.path,
                    "expected one of `name`, `description`, `inputs`, `outputs`, `tags`",
                ));
            }
        }
    }
    Ok(args)
}

fn string_literal(expr: &Expr) -> syn::Result<LitStr> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(lit), ..
        }) => Ok(lit.clone()),
        other => Err(Error::new_spanned(other, "expected a string literal")),
    }
}

fn string_list(expr: &Expr) -> syn::Result<Vec<LitStr>> {
    match expr {
        Expr::Array(ExprArray { elems, .. }) => elems.iter().map(string_literal).collect(),
        other => Err(Error::new_spanned(
            other,
            "expected a list of string literals, e.g. `[\"a\", \"b\"]`",
        )),
    }
}

fn doc_comment(function: &ItemFn) -> String {
    let lines: Vec<String> = function
        .attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(MetaNameValue {
                value:
                    Expr::Lit(ExprLit {
                        lit: Lit::Str(lit), ..
                    }),
                ..
            }) => Some(lit.value().trim().to_owned()),
            _ => None,
        })
        .collect();
    lines.join(" ").trim().to_owned()
}

/// Path to the runtime crate as seen from the calling crate: `geogpt-tools`
/// when it is a dependency, otherwise the `tools` module of the `geogpt`
/// facade.
fn runtime_path() -> TokenStream2 {
    match crate_name("geogpt-tools") {
        Ok(FoundCrate::Name(name)) => {
            let ident = format_ident!("{name}");
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(::geogpt_tools),
        Err(_) => match crate_name("geogpt") {
            Ok(FoundCrate::Name(name)) => {
                let ident = format_ident!("{name}");
                quote!(::#ident::tools)
            }
            Ok(FoundCrate::Itself) => quote!(::geogpt::tools),
            Err(_) => quote!(::geogpt_tools),
        },
    }
}

fn expand(attr: TokenStream2, function: &ItemFn) -> syn::Result<TokenStream2> {
    let args = parse_args(attr)?;
    let ident = &function.sig.ident;

    if function.sig.inputs.len() != 1 {
        return Err(Error::new_spanned(
            &function.sig.inputs,
            "registered functions take exactly one `serde_json::Value` argument",
        ));
    }
    if !function.sig.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &function.sig.generics,
            "registered functions cannot be generic",
        ));
    }

    let name = args
        .name
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
    let description = args
        .description
        .unwrap_or_else(|| LitStr::new(&doc_comment(function), Span::call_site()));
    let inputs = &args.inputs;
    let outputs = &args.outputs;
    let tags = &args.tags;
    let runtime = runtime_path();

    let call = if function.sig.asyncness.is_some() {
        quote!(::std::boxed::Box::pin(#ident(input)))
    } else {
        quote!(::std::boxed::Box::pin(#runtime::macros::run_blocking(
            move || #ident(input)
        )))
    };

    Ok(quote! {
        #function

        #runtime::inventory::submit! {
            #runtime::macros::ToolRegistration::new(
                #name,
                #description,
                &[#(#inputs),*],
                &[#(#outputs),*],
                &[#(#tags),*],
                {
                    fn __geogpt_executor(
                        input: #runtime::serde_json::Value,
                    ) -> #runtime::ToolFuture {
                        #call
                    }
                    __geogpt_executor
                },
            )
        }
    })
}
