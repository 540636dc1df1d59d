//! `#[tokio_timeout_test]`: runs an async test on its own tokio runtime in a
//! separate thread and fails it once the deadline passes, so a socket that
//! never answers cannot wedge the whole suite.
//!
//! ```ignore
//! #[test_timeout::tokio_timeout_test]
//! async fn defaults_to_ten_seconds() {}
//!
//! #[test_timeout::tokio_timeout_test(secs = 3, flavor = "multi_thread")]
//! async fn custom_deadline() {}
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{meta::ParseNestedMeta, parse_macro_input, Attribute, ItemFn, LitInt, LitStr};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Copy)]
enum Flavor {
    CurrentThread,
    MultiThread,
}

struct Options {
    secs: u64,
    flavor: Flavor,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            secs: DEFAULT_TIMEOUT_SECS,
            flavor: Flavor::CurrentThread,
        }
    }
}

impl Options {
    fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("secs") {
            let lit: LitInt = meta.value()?.parse()?;
            let secs: u64 = lit.base10_parse()?;
            if secs == 0 {
                return Err(syn::Error::new_spanned(lit, "timeout must be greater than zero"));
            }
            self.secs = secs;
            Ok(())
        } else if meta.path.is_ident("flavor") {
            let lit: LitStr = meta.value()?.parse()?;
            self.flavor = match lit.value().as_str() {
                "current_thread" => Flavor::CurrentThread,
                "multi_thread" => Flavor::MultiThread,
                _ => {
                    return Err(syn::Error::new_spanned(
                        lit,
                        "flavor must be \"current_thread\" or \"multi_thread\"",
                    ))
                }
            };
            Ok(())
        } else {
            Err(meta.error("expected `secs = N` or `flavor = \"...\"`"))
        }
    }
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut options = Options::default();
    let parser = syn::meta::parser(|meta| options.parse(meta));
    parse_macro_input!(attr with parser);

    let function = parse_macro_input!(item as ItemFn);
    match expand(options, function) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(options: Options, function: ItemFn) -> syn::Result<TokenStream2> {
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = function;

    if sig.asyncness.take().is_none() {
        return Err(syn::Error::new_spanned(
            &sig.ident,
            "tokio_timeout_test only applies to async functions",
        ));
    }

    let attrs: Vec<Attribute> = attrs.into_iter().filter(|attr| !is_test_marker(attr)).collect();
    let secs = options.secs;
    let builder = match options.flavor {
        Flavor::CurrentThread => quote!(tokio::runtime::Builder::new_current_thread()),
        Flavor::MultiThread => quote!(tokio::runtime::Builder::new_multi_thread()),
    };

    Ok(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let deadline = std::time::Duration::from_secs(#secs);
            let (report, outcome) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let runtime = #builder
                        .enable_all()
                        .build()
                        .expect("failed to build tokio runtime");
                    runtime.block_on(async move {
                        tokio::time::timeout(deadline, async move #block)
                            .await
                            .expect("test exceeded its deadline")
                    })
                }));
                let _ = report.send(result);
            });
            match outcome.recv_timeout(deadline + std::time::Duration::from_secs(1)) {
                Ok(Ok(value)) => value,
                Ok(Err(panic)) => std::panic::resume_unwind(panic),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("test exceeded its deadline of {}s", #secs)
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread exited without reporting")
                }
            }
        }
    })
}

// `#[test]` and `#[tokio::test]` would double-register the function.
fn is_test_marker(attr: &Attribute) -> bool {
    let path: Vec<String> = attr
        .path()
        .segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect();
    path == ["test"] || path == ["tokio", "test"]
}
