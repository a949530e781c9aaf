use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DataEnum, DataStruct, DeriveInput, Fields, Ident};

/// Derives `kiln_utils::WalkStrings` for structs and enums. Fields marked
/// `#[skip]` are left untouched by the walker.
#[proc_macro_derive(WalkStrings, attributes(skip))]
pub fn derive_walk_strings(token_stream: TokenStream) -> TokenStream {
    let ast = syn::parse::<DeriveInput>(token_stream).unwrap();
    let name = &ast.ident;

    let body = match &ast.data {
        Data::Struct(data) => struct_body(data),
        Data::Enum(data) => enum_body(name, data),
        _ => vec![],
    };

    let q = quote! {
        impl ::kiln_utils::WalkStrings for #name {
            fn walk<W: ::kiln_utils::StringWalker>(&mut self, walker: &mut W) {
                #(#body)*;
            }
        }
    };

    q.into()
}

fn is_skipped(field: &syn::Field) -> bool {
    field
        .attrs
        .iter()
        .any(|attr| attr.path.segments[0].ident == "skip")
}

fn struct_body(data: &DataStruct) -> Vec<proc_macro2::TokenStream> {
    data.fields
        .iter()
        .filter(|field| !is_skipped(field))
        .map(|field| {
            let name = field.ident.as_ref().unwrap();
            quote! {
                self.#name.walk(walker);
            }
        })
        .collect()
}

fn enum_body(name: &Ident, data: &DataEnum) -> Vec<proc_macro2::TokenStream> {
    let mut arms = vec![];

    for variant in &data.variants {
        let var_name = &variant.ident;

        let arm = match &variant.fields {
            Fields::Named(named) => {
                let fields: Vec<Ident> = named
                    .named
                    .iter()
                    .map(|field| field.ident.as_ref().unwrap().clone())
                    .collect();

                quote! {
                    #name::#var_name { #(#fields),* } => {
                        #(#fields.walk(walker);)*
                    }
                }
            }

            Fields::Unnamed(unnamed) => {
                let fields: Vec<Ident> = (0..unnamed.unnamed.len())
                    .map(|idx| Ident::new(&format!("f{}", idx), proc_macro2::Span::call_site()))
                    .collect();

                quote! {
                    #name::#var_name(#(#fields),*) => {
                        #(#fields.walk(walker);)*
                    }
                }
            }

            Fields::Unit => quote! {
                #name::#var_name => {}
            },
        };

        arms.push(arm);
    }

    vec![quote! {
        match self {
            #(#arms),*
        }
    }]
}
