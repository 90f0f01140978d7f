//! Parsing for instrumentation attributes.
//!
//! This module parses the argument lists of the trace and metrics attributes
//! and reads argument names out of the annotated method's signature.

use proc_macro2::Span;
use syn::{
    ext::IdentExt,
    parse::{Parse, ParseStream},
    punctuated::Punctuated,
    spanned::Spanned,
    Expr, ExprLit, ExprUnary, FnArg, Lit, LitStr, Meta, MetaNameValue, Pat, PatIdent, Signature,
    Token, UnOp,
};

/// A static attribute value written in an `attributes(...)` list.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrLiteral {
    /// `"text"`
    Str(String),
    /// `42`, `-1`
    Int(i64),
    /// `0.5`
    Float(f64),
    /// `true`
    Bool(bool),
}

/// One `"key" = value` entry.
#[derive(Debug, Clone)]
pub struct AttrEntry {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: AttrLiteral,
}

impl Parse for AttrEntry {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let key: LitStr = input.parse()?;
        input.parse::<Token![=]>()?;
        let value: Expr = input.parse()?;
        Ok(Self {
            key: key.value(),
            value: attr_literal(&value)?,
        })
    }
}

fn attr_literal(expr: &Expr) -> syn::Result<AttrLiteral> {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => match lit {
            Lit::Str(s) => Ok(AttrLiteral::Str(s.value())),
            Lit::Int(i) => Ok(AttrLiteral::Int(i.base10_parse()?)),
            Lit::Float(f) => Ok(AttrLiteral::Float(f.base10_parse()?)),
            Lit::Bool(b) => Ok(AttrLiteral::Bool(b.value)),
            other => Err(syn::Error::new(
                other.span(),
                "expected string, integer, float or bool literal",
            )),
        },
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => match attr_literal(expr)? {
            AttrLiteral::Int(i) => Ok(AttrLiteral::Int(-i)),
            AttrLiteral::Float(f) => Ok(AttrLiteral::Float(-f)),
            _ => Err(syn::Error::new(expr.span(), "only numbers can be negated")),
        },
        other => Err(syn::Error::new(
            other.span(),
            "expected string, integer, float or bool literal",
        )),
    }
}

/// A span kind named in `kind = ...`.
#[derive(Debug, Clone)]
pub struct KindArg {
    /// `SpanKind` variant name.
    pub variant: &'static str,
    /// Where the argument was written.
    pub span: Span,
}

/// Parsed arguments of the trace attributes.
#[derive(Debug, Default)]
pub struct TraceArgs {
    /// Span name override.
    pub name: Option<String>,
    /// Span kind, plain `#[traced]` only.
    pub kind: Option<KindArg>,
    /// Record arguments as span attributes.
    pub record_args: Option<bool>,
    /// Record the return value as a span attribute.
    pub record_result: Option<bool>,
    /// Static span attributes.
    pub attributes: Vec<AttrEntry>,
}

impl Parse for TraceArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = Self::default();
        for meta in Punctuated::<Meta, Token![,]>::parse_terminated(input)? {
            let key = meta_key(&meta)?;
            match key.as_str() {
                "name" => set_once(&mut args.name, string_value(&meta)?, &meta)?,
                "kind" => set_once(&mut args.kind, kind_value(&meta)?, &meta)?,
                "record_args" => set_once(&mut args.record_args, flag_value(&meta)?, &meta)?,
                "record_result" => set_once(&mut args.record_result, flag_value(&meta)?, &meta)?,
                "attributes" => args.attributes.extend(attribute_list(&meta)?),
                _ => {
                    return Err(syn::Error::new(
                        meta.path().span(),
                        format!("unknown trace argument: {key}"),
                    ))
                }
            }
        }
        Ok(args)
    }
}

/// Parsed arguments of the metrics attributes.
#[derive(Debug, Default)]
pub struct MetricsArgs {
    /// Counter name override.
    pub counter: Option<String>,
    /// Histogram name override.
    pub histogram: Option<String>,
    /// Record arguments as metric attributes.
    pub record_args: Option<bool>,
    /// Record the invocation outcome as a metric attribute.
    pub record_status: Option<bool>,
    /// Static metric attributes.
    pub attributes: Vec<AttrEntry>,
}

impl Parse for MetricsArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = Self::default();
        for meta in Punctuated::<Meta, Token![,]>::parse_terminated(input)? {
            let key = meta_key(&meta)?;
            match key.as_str() {
                "counter" => set_once(&mut args.counter, string_value(&meta)?, &meta)?,
                "histogram" => set_once(&mut args.histogram, string_value(&meta)?, &meta)?,
                "record_args" => set_once(&mut args.record_args, flag_value(&meta)?, &meta)?,
                "record_status" => set_once(&mut args.record_status, flag_value(&meta)?, &meta)?,
                "attributes" => args.attributes.extend(attribute_list(&meta)?),
                _ => {
                    return Err(syn::Error::new(
                        meta.path().span(),
                        format!("unknown metrics argument: {key}"),
                    ))
                }
            }
        }
        Ok(args)
    }
}

fn meta_key(meta: &Meta) -> syn::Result<String> {
    meta.path()
        .get_ident()
        .map(ToString::to_string)
        .ok_or_else(|| syn::Error::new(meta.path().span(), "expected identifier"))
}

fn set_once<T>(slot: &mut Option<T>, value: T, meta: &Meta) -> syn::Result<()> {
    if slot.is_some() {
        return Err(syn::Error::new(meta.span(), "duplicate argument"));
    }
    *slot = Some(value);
    Ok(())
}

fn name_value(meta: &Meta) -> syn::Result<&MetaNameValue> {
    match meta {
        Meta::NameValue(nv) => Ok(nv),
        _ => Err(syn::Error::new(meta.span(), "expected name = value")),
    }
}

fn string_value(meta: &Meta) -> syn::Result<String> {
    match &name_value(meta)?.value {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) if !s.value().is_empty() => Ok(s.value()),
        other => Err(syn::Error::new(other.span(), "expected non-empty string literal")),
    }
}

/// `record_args` alone means `true`; otherwise a bool literal is required.
fn flag_value(meta: &Meta) -> syn::Result<bool> {
    match meta {
        Meta::Path(_) => Ok(true),
        Meta::NameValue(nv) => match &nv.value {
            Expr::Lit(ExprLit {
                lit: Lit::Bool(b), ..
            }) => Ok(b.value),
            other => Err(syn::Error::new(other.span(), "expected `true` or `false`")),
        },
        Meta::List(_) => Err(syn::Error::new(meta.span(), "expected flag or name = bool")),
    }
}

fn kind_value(meta: &Meta) -> syn::Result<KindArg> {
    let value = &name_value(meta)?.value;
    let written = match value {
        Expr::Path(path) => path
            .path
            .segments
            .last()
            .map(|s| s.ident.unraw().to_string())
            .unwrap_or_default(),
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => s.value(),
        _ => String::new(),
    };
    let variant = match written.to_ascii_lowercase().as_str() {
        "internal" => "Internal",
        "server" => "Server",
        "client" => "Client",
        "producer" => "Producer",
        "consumer" => "Consumer",
        _ => {
            return Err(syn::Error::new(
                value.span(),
                "expected one of: Internal, Server, Client, Producer, Consumer",
            ))
        }
    };
    Ok(KindArg {
        variant,
        span: value.span(),
    })
}

fn attribute_list(meta: &Meta) -> syn::Result<Vec<AttrEntry>> {
    match meta {
        Meta::List(list) => Ok(list
            .parse_args_with(Punctuated::<AttrEntry, Token![,]>::parse_terminated)?
            .into_iter()
            .collect()),
        _ => Err(syn::Error::new(
            meta.span(),
            "expected attributes(\"key\" = value, ...)",
        )),
    }
}

/// Name of the annotated method and its arguments.
#[derive(Debug)]
pub struct MethodSig {
    /// Method name, without any `r#` prefix.
    pub name: String,
    /// Argument names in order, receiver excluded.
    pub argument_names: Vec<String>,
}

impl MethodSig {
    /// Reads names out of a signature.
    ///
    /// `Json(body)`-style patterns use the inner binding; anything without a
    /// single name (`_`, tuples) is named `argN` by position.
    pub fn from_signature(sig: &Signature) -> Self {
        let argument_names = sig
            .inputs
            .iter()
            .filter_map(|arg| match arg {
                FnArg::Receiver(_) => None,
                FnArg::Typed(typed) => Some(&*typed.pat),
            })
            .enumerate()
            .map(|(index, pat)| binding_name(pat).unwrap_or_else(|| format!("arg{index}")))
            .collect();

        Self {
            name: sig.ident.unraw().to_string(),
            argument_names,
        }
    }
}

fn binding_name(pat: &Pat) -> Option<String> {
    match pat {
        Pat::Ident(PatIdent { ident, .. }) => Some(ident.unraw().to_string()),
        Pat::TupleStruct(ts) if ts.elems.len() == 1 => ts.elems.first().and_then(binding_name),
        Pat::Reference(r) => binding_name(&r.pat),
        Pat::Type(t) => binding_name(&t.pat),
        _ => None,
    }
}
