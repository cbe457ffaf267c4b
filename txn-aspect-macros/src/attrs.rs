//! Attribute parsing for the `#[transactional(...)]` macro.
//!
//! Follows the corpus's syn-`Meta`-based parsing convention (bare
//! flags as `Meta::Path`, `key = "value"` as `Meta::NameValue`) rather
//! than a hand-rolled token scanner.

use proc_macro2::Span;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{Expr, Lit, Meta, Token};

#[derive(Debug, Default)]
pub struct TransactionalAttrs {
    pub propagation: Option<String>,
    pub timeout_ms: Option<u64>,
    pub read_only: bool,
    pub isolation: Option<String>,
    pub datasource: Option<String>,
    pub name: Option<String>,
}

impl TransactionalAttrs {
    /// Parse `#[transactional(propagation = "requires_new", timeout_ms = 500, read_only, isolation = "serializable")]`.
    /// A bare `#[transactional]` (no args) is also accepted and yields
    /// all-default (REQUIRED propagation, no timeout, read-write).
    pub fn from_args(args: proc_macro::TokenStream) -> syn::Result<Self> {
        let mut attrs = TransactionalAttrs::default();
        if args.is_empty() {
            return Ok(attrs);
        }

        let parser = Punctuated::<Meta, Token![,]>::parse_terminated;
        let metas = parser.parse(args)?;

        for meta in metas {
            match &meta {
                Meta::Path(path) if path.is_ident("read_only") => {
                    attrs.read_only = true;
                }
                Meta::NameValue(nv) => {
                    let key = nv
                        .path
                        .get_ident()
                        .ok_or_else(|| syn::Error::new_spanned(&nv.path, "expected a plain identifier"))?
                        .to_string();
                    match key.as_str() {
                        "propagation" => attrs.propagation = Some(string_value(&nv.value)?),
                        "isolation" => attrs.isolation = Some(string_value(&nv.value)?),
                        "datasource" | "datasource_name" => attrs.datasource = Some(string_value(&nv.value)?),
                        "name" => attrs.name = Some(string_value(&nv.value)?),
                        "timeout_ms" => attrs.timeout_ms = Some(int_value(&nv.value)?),
                        "read_only" => attrs.read_only = bool_value(&nv.value)?,
                        other => {
                            return Err(syn::Error::new_spanned(
                                &nv.path,
                                format!("unknown `#[transactional]` key `{other}`"),
                            ));
                        }
                    }
                }
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "expected `key = \"value\"` or the bare flag `read_only`",
                    ));
                }
            }
        }

        Ok(attrs)
    }
}

fn string_value(expr: &Expr) -> syn::Result<String> {
    if let Expr::Lit(lit) = expr {
        if let Lit::Str(s) = &lit.lit {
            return Ok(s.value());
        }
    }
    Err(syn::Error::new_spanned(expr, "expected a string literal"))
}

fn int_value(expr: &Expr) -> syn::Result<u64> {
    if let Expr::Lit(lit) = expr {
        if let Lit::Int(i) = &lit.lit {
            return i.base10_parse::<u64>();
        }
    }
    Err(syn::Error::new_spanned(expr, "expected an integer literal"))
}

fn bool_value(expr: &Expr) -> syn::Result<bool> {
    if let Expr::Lit(lit) = expr {
        if let Lit::Bool(b) = &lit.lit {
            return Ok(b.value);
        }
    }
    Err(syn::Error::new(Span::call_site(), "expected a bool literal"))
}
