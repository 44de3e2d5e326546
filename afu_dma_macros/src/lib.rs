// This file is part of afu-dma, a host driver for FPGA DMA accelerators exposed through the Linux DFL subsystem.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// afu-dma is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// afu-dma is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Procedural macros for afu-dma.
//!
//! Currently provides [`macro@backend`], which registers an accelerator backend with the
//! registry in `afu_dma::accelerators::accelerator`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, LitStr, parse_macro_input};

/// Register a struct as an accelerator backend under the given name.
///
/// The annotated struct must provide
/// `fn open(config: &AcceleratorConfig) -> Result<Self, AfuError>` and implement `Afu`.
/// The macro keeps the struct as written and adds:
///
/// * `BACKEND_NAME` - the registered name
/// * `register_backend()` - inserts a constructor into the backend registry
///
/// ```rust,ignore
/// #[backend(name = "dfl")]
/// pub struct DflAccelerator { /* ... */ }
///
/// DflAccelerator::register_backend();
/// ```
#[proc_macro_attribute]
pub fn backend(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut name: Option<LitStr> = None;
    let name_parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("name") {
            name = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported backend property, expected `name`"))
        }
    });
    parse_macro_input!(attr with name_parser);
    let item_struct = parse_macro_input!(item as ItemStruct);

    let Some(name) = name else {
        return syn::Error::new_spanned(
            &item_struct.ident,
            "#[backend] requires a name, e.g. #[backend(name = \"dfl\")]",
        )
        .to_compile_error()
        .into();
    };

    let ident = &item_struct.ident;
    let expanded = quote! {
        #item_struct

        impl #ident {
            /// Name under which this backend is registered.
            pub const BACKEND_NAME: &'static str = #name;

            /// Add this backend to the global accelerator backend registry.
            pub fn register_backend() {
                crate::accelerators::accelerator::register_backend(#name, |config| {
                    let accelerator = #ident::open(config)?;
                    Ok(Box::new(accelerator) as Box<dyn crate::accelerators::accelerator::Afu>)
                });
            }
        }
    };
    expanded.into()
}
