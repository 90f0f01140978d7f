//! Attribute expansion.
//!
//! Every instrumentation attribute re-emits the annotated function unchanged
//! and adds a hidden sibling function returning its metadata:
//!
//! - trace attributes: `__telemetron_trace_<fn>() -> TraceMetadata`
//! - metrics attributes: `__telemetron_metrics_<fn>() -> MetricsMetadata`

use proc_macro2::TokenStream;
use quote::{format_ident, quote, ToTokens};
use syn::ItemFn;

use crate::parse::{AttrEntry, AttrLiteral, MethodSig, MetricsArgs, TraceArgs};

/// Operation preset selected by a specialized attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// `#[trace_http]`, `#[metrics_http]`
    Http,
    /// `#[trace_db]`, `#[metrics_db]`
    Database,
    /// `#[trace_external]`
    External,
    /// `#[trace_business]`, `#[metrics_business]`
    Business,
}

impl ToTokens for Preset {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let variant = match self {
            Self::Http => format_ident!("Http"),
            Self::Database => format_ident!("Database"),
            Self::External => format_ident!("External"),
            Self::Business => format_ident!("Business"),
        };
        tokens.extend(quote!(::telemetron_core::OperationKind::#variant));
    }
}

impl ToTokens for AttrLiteral {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        tokens.extend(match self {
            Self::Str(s) => quote!(::telemetron_core::AttrValue::String(::std::string::String::from(#s))),
            Self::Int(i) => quote!(::telemetron_core::AttrValue::Int(#i)),
            Self::Float(f) => quote!(::telemetron_core::AttrValue::Float(#f)),
            Self::Bool(b) => quote!(::telemetron_core::AttrValue::Bool(#b)),
        });
    }
}

fn attribute_calls(entries: &[AttrEntry]) -> TokenStream {
    let calls = entries.iter().map(|AttrEntry { key, value }| {
        quote!(.attribute(#key, #value))
    });
    quote!(#(#calls)*)
}

fn optional_call<T: ToTokens>(method: &str, value: Option<&T>) -> TokenStream {
    let method = format_ident!("{}", method);
    value.map_or_else(TokenStream::new, |value| quote!(.#method(#value)))
}

/// Expands a trace attribute.
///
/// `preset` is `None` for plain `#[traced]`, which alone accepts `kind`.
pub fn expand_trace(
    preset: Option<Preset>,
    attr: TokenStream,
    item: TokenStream,
) -> syn::Result<TokenStream> {
    let args: TraceArgs = syn::parse2(attr)?;
    let function: ItemFn = syn::parse2(item)?;

    if let (Some(_), Some(kind)) = (preset, &args.kind) {
        return Err(syn::Error::new(
            kind.span,
            "`kind` is fixed by this attribute; use #[traced(kind = ...)] instead",
        ));
    }

    let sig = MethodSig::from_signature(&function.sig);
    let metadata_fn = format_ident!("__telemetron_trace_{}", function.sig.ident);
    let vis = &function.vis;
    let method_name = &sig.name;
    let names = argument_names(&sig);

    let name = optional_call("name", args.name.as_ref());
    let kind = args.kind.as_ref().map_or_else(TokenStream::new, |kind| {
        let variant = format_ident!("{}", kind.variant);
        quote!(.kind(::telemetron_core::SpanKind::#variant))
    });
    let record_args = optional_call("record_args", args.record_args.as_ref());
    let record_result = optional_call("record_result", args.record_result.as_ref());
    let attributes = attribute_calls(&args.attributes);
    let finish = match preset {
        Some(preset) => quote!(.preset(#preset, #method_name)),
        None => quote!(.build(#method_name)),
    };

    Ok(quote! {
        #function

        #[doc(hidden)]
        #[allow(non_snake_case, dead_code)]
        #vis fn #metadata_fn() -> ::telemetron_core::TraceMetadata {
            #names
            ::telemetron_core::TraceOptions::new()
                #name
                #kind
                #attributes
                #record_args
                #record_result
                .argument_names(argument_names)
                #finish
        }
    })
}

/// Expands a metrics attribute.
///
/// `preset` is `None` for plain `#[metered]`.
pub fn expand_metrics(
    preset: Option<Preset>,
    attr: TokenStream,
    item: TokenStream,
) -> syn::Result<TokenStream> {
    let args: MetricsArgs = syn::parse2(attr)?;
    let function: ItemFn = syn::parse2(item)?;

    if preset == Some(Preset::External) {
        return Err(syn::Error::new(
            function.sig.ident.span(),
            "no metrics preset exists for external calls",
        ));
    }

    let sig = MethodSig::from_signature(&function.sig);
    let metadata_fn = format_ident!("__telemetron_metrics_{}", function.sig.ident);
    let vis = &function.vis;
    let method_name = &sig.name;
    let names = argument_names(&sig);

    let counter = optional_call("counter", args.counter.as_ref());
    let histogram = optional_call("histogram", args.histogram.as_ref());
    let record_args = optional_call("record_args", args.record_args.as_ref());
    let record_status = optional_call("record_status", args.record_status.as_ref());
    let attributes = attribute_calls(&args.attributes);
    let finish = match preset {
        Some(preset) => quote!(.preset(#preset, #method_name)),
        None => quote!(.build(#method_name)),
    };

    Ok(quote! {
        #function

        #[doc(hidden)]
        #[allow(non_snake_case, dead_code)]
        #vis fn #metadata_fn() -> ::telemetron_core::MetricsMetadata {
            #names
            ::telemetron_core::MetricsOptions::new()
                #counter
                #histogram
                #attributes
                #record_args
                #record_status
                .argument_names(argument_names)
                #finish
        }
    })
}

/// `let argument_names: [&str; N] = [...];`
fn argument_names(sig: &MethodSig) -> TokenStream {
    let names = &sig.argument_names;
    let len = names.len();
    quote!(let argument_names: [&str; #len] = [#(#names),*];)
}
