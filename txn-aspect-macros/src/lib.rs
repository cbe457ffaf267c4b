//! Procedural macro for `txn_aspect`'s decorator surface.
//!
//! Mirrors the corpus's runtime-crate/macro-crate split (a proc-macro
//! crate that re-exports nothing on its own, with the runtime crate
//! re-exporting its attribute at the crate root so callers depend on
//! one crate). See `txn_aspect::transactional` for the public doc entry
//! point.

use proc_macro::TokenStream;

mod attrs;
mod transactional;

/// Wraps an `async fn` so every call runs through the transaction
/// aspect with the given options (spec.md §6's decorator surface).
///
/// # Example
///
/// ```ignore
/// use txn_aspect::transactional;
///
/// struct Accounts;
///
/// impl Accounts {
///     #[transactional(propagation = "requires_new", timeout_ms = 500, read_only, isolation = "serializable")]
///     async fn balance(&self, id: i64) -> anyhow::Result<i64> {
///         Ok(id)
///     }
/// }
/// ```
///
/// Recognised keys: `propagation` (`required` (default), `requires_new`,
/// `supports`, `not_supported`, `never`, `nested`, `mandatory`),
/// `isolation` (`read_uncommitted`, `read_committed`, `repeatable_read`,
/// `serializable`), `timeout_ms`, the bare flag `read_only`,
/// `datasource` (default `"DB"`), and `name` (defaults to the function
/// name). Lifecycle hooks have no attribute-macro surface — callers
/// needing `beforeCommit`/`afterCommit`/`beforeRollback`/`afterRollback`
/// use `txn_aspect::run_transactional` directly, which the macro
/// expands into.
#[proc_macro_attribute]
pub fn transactional(args: TokenStream, input: TokenStream) -> TokenStream {
    transactional::generate_transactional_impl(args, input)
}
