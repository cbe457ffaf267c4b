//! Codegen for `#[transactional]`: wraps an `async fn`'s body so every
//! call runs through `txn_aspect::run_transactional` with the options
//! the attribute specifies, mirroring spec.md §6's "method-decoration
//! primitive" over an `async fn` (this crate's realization of the
//! TypeScript decorator surface).

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{ItemFn, parse_macro_input};

use crate::attrs::TransactionalAttrs;

pub fn generate_transactional_impl(args: TokenStream, input: TokenStream) -> TokenStream {
    let attrs = match TransactionalAttrs::from_args(args) {
        Ok(attrs) => attrs,
        Err(err) => return err.to_compile_error().into(),
    };
    let item_fn = parse_macro_input!(input as ItemFn);

    if item_fn.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            &item_fn.sig.fn_token,
            "#[transactional] can only be applied to an `async fn` — the aspect awaits the decorated body",
        )
        .to_compile_error()
        .into();
    }

    let propagation = propagation_tokens(attrs.propagation.as_deref());
    let propagation = match propagation {
        Ok(tokens) => tokens,
        Err(err) => return err.to_compile_error().into(),
    };
    let isolation = isolation_tokens(attrs.isolation.as_deref());
    let isolation = match isolation {
        Ok(tokens) => tokens,
        Err(err) => return err.to_compile_error().into(),
    };

    let timeout = match attrs.timeout_ms {
        Some(ms) => quote! { ::std::option::Option::Some(::std::time::Duration::from_millis(#ms)) },
        None => quote! { ::std::option::Option::None },
    };
    let read_only = attrs.read_only;
    let datasource_name = attrs.datasource.unwrap_or_else(|| "DB".to_string());
    let label = attrs.name.unwrap_or_else(|| item_fn.sig.ident.to_string());

    let fn_attrs = &item_fn.attrs;
    let fn_vis = &item_fn.vis;
    let fn_sig = &item_fn.sig;
    let fn_block = &item_fn.block;

    let expanded: TokenStream2 = quote! {
        #(#fn_attrs)*
        #fn_vis #fn_sig {
            let __txn_options = ::txn_aspect::TransactionOptions {
                propagation: #propagation,
                timeout: #timeout,
                read_only: #read_only,
                isolation: #isolation,
                datasource_name: #datasource_name.to_string(),
                hooks: ::std::default::Default::default(),
                name: ::std::option::Option::Some(#label.to_string()),
            };
            ::txn_aspect::run_transactional(__txn_options, move || async move #fn_block)
                .await
                .map_err(::std::convert::Into::into)
        }
    };

    expanded.into()
}

fn propagation_tokens(propagation: Option<&str>) -> syn::Result<TokenStream2> {
    Ok(match propagation {
        None | Some("required") => quote! { ::txn_aspect::Propagation::Required },
        Some("requires_new") => quote! { ::txn_aspect::Propagation::RequiresNew },
        Some("supports") => quote! { ::txn_aspect::Propagation::Supports },
        Some("not_supported") => quote! { ::txn_aspect::Propagation::NotSupported },
        Some("never") => quote! { ::txn_aspect::Propagation::Never },
        Some("nested") => quote! { ::txn_aspect::Propagation::Nested },
        Some("mandatory") => quote! { ::txn_aspect::Propagation::Mandatory },
        Some(other) => {
            return Err(syn::Error::new(
                proc_macro2::Span::call_site(),
                format!(
                    "unknown `propagation` value `{other}` — expected one of: required, requires_new, \
                     supports, not_supported, never, nested, mandatory"
                ),
            ));
        }
    })
}

fn isolation_tokens(isolation: Option<&str>) -> syn::Result<TokenStream2> {
    Ok(match isolation {
        None => quote! { ::std::option::Option::None },
        Some("read_uncommitted") => {
            quote! { ::std::option::Option::Some(::txn_aspect::IsolationLevel::ReadUncommitted) }
        }
        Some("read_committed") => {
            quote! { ::std::option::Option::Some(::txn_aspect::IsolationLevel::ReadCommitted) }
        }
        Some("repeatable_read") => {
            quote! { ::std::option::Option::Some(::txn_aspect::IsolationLevel::RepeatableRead) }
        }
        Some("serializable") => {
            quote! { ::std::option::Option::Some(::txn_aspect::IsolationLevel::Serializable) }
        }
        Some(other) => {
            return Err(syn::Error::new(
                proc_macro2::Span::call_site(),
                format!(
                    "unknown `isolation` value `{other}` — expected one of: read_uncommitted, \
                     read_committed, repeatable_read, serializable"
                ),
            ));
        }
    })
}
