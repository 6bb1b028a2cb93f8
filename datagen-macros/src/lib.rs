use proc_macro::{self, TokenStream};
use proc_macro2::Ident;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

fn expand_event_type(ast: DeriveInput, root: proc_macro2::TokenStream) -> TokenStream {
    let name = ast.ident.clone();
    let ident_string = name.to_string();
    let mod_name = Ident::new(
        format!("{}_metrics_mod", ident_string).as_str(),
        name.span(),
    );

    let generics = ast.generics.clone();
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    quote! {
        #ast

        impl #impl_generics #root::logging::LogEvent for #name #ty_generics #where_clause {
            const NAME: &'static str = #ident_string;
        }

        #[allow(non_snake_case)]
        mod #mod_name {
            use #root::logging::registry::*;

            #[distributed_slice(METRICS)]
            static EVENT_NAME: &'static str = #ident_string;
        }
    }
    .into()
}

/// Declares a loggable event type for crates depending on `snax_datagen`.
/// Implements `LogEvent` with the type name and registers that name so that log filters can refer to it.
#[proc_macro_attribute]
pub fn event_type(_attrs: TokenStream, item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as DeriveInput);
    expand_event_type(ast, quote! {::snax_datagen})
}

/// Same as [macro@event_type], for use inside `snax_datagen` itself.
#[proc_macro_attribute]
pub fn event_type_internal(_attrs: TokenStream, item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as DeriveInput);
    expand_event_type(ast, quote! {crate})
}
