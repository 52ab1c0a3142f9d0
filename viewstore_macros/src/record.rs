use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, Ident};

pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let id_field = match extract_id_field(&input) {
        Ok(field) => field,
        Err(err) => return err.to_compile_error().into(),
    };

    let expanded = quote! {
        impl #impl_generics viewstore::Record for #name #ty_generics #where_clause {
            fn id(&self) -> &str {
                &self.#id_field
            }
        }
    };

    TokenStream::from(expanded)
}

fn extract_id_field(input: &DeriveInput) -> syn::Result<Ident> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(Error::new_spanned(
                    &input.ident,
                    "Record derive only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(Error::new_spanned(
                &input.ident,
                "Record derive only supports structs",
            ))
        }
    };

    let mut marked = None;
    for field in fields {
        for attr in &field.attrs {
            if !attr.path().is_ident("record") {
                continue;
            }
            let mut is_id = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    is_id = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported record attribute, expected `id`"))
                }
            })?;
            if is_id {
                if marked.is_some() {
                    return Err(Error::new_spanned(
                        attr,
                        "only one field may be marked #[record(id)]",
                    ));
                }
                marked = field.ident.clone();
            }
        }
    }

    if let Some(ident) = marked {
        return Ok(ident);
    }

    // Default: a field named `id`
    fields
        .iter()
        .filter_map(|field| field.ident.clone())
        .find(|ident| ident == "id")
        .ok_or_else(|| {
            Error::new_spanned(
                &input.ident,
                "Record derive: no field marked with #[record(id)] and no field named `id`",
            )
        })
}
