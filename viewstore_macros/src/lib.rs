//! Derive macros for `viewstore`.

mod record;

use proc_macro::TokenStream;

/// Derives `viewstore::Record` for a struct with named fields.
///
/// The id is taken from the field marked `#[record(id)]`, or from a field
/// named `id` when no field is marked.
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, Record)]
/// struct Folder {
///     #[record(id)]
///     pub slug: String,
///     pub name: String,
/// }
/// ```
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    record::derive_record(input)
}
