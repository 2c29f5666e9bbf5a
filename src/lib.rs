//! # permjs - a permutation-partitioned JavaScript compiler
//!
//! Compiles a module of JavaScript sources once into a shared AST, then
//! specializes that AST for every combination of the module's binding
//! properties (each combination is a *permutation*), emitting one payload
//! per permutation plus a selection script that picks the right payload in
//! the browser at load time.
//!
//! The pipeline has three stages connected through the filesystem:
//!
//! 1. **precompile** - parse and optimize the sources, enumerate the
//!    permutation space, write `precompilation.ser` to the work dir.
//! 2. **compile-perms** - specialize, optimize and instrument each
//!    permutation in parallel, writing `permutation-<N>.js` per index.
//! 3. **link** - assemble `<N>.cache.js` payloads, public resources and
//!    the `<module>.nocache.js` selection script into the output dir.
//!
//! ## Parsing and printing JavaScript
//!
//! ```
//! use permjs::parser;
//! use permjs::js::writer::{generate, JsOutputStyle};
//!
//! let program = parser::parse_program(&[(
//!     "hello.js".to_string(),
//!     "var x = 1 + 2;".to_string(),
//! )])
//! .unwrap();
//! assert_eq!(generate(&program, JsOutputStyle::Compact), "var x=1+2;");
//! ```
//!
//! ## Enumerating a module's permutations
//!
//! ```
//! use std::path::Path;
//! use permjs::cfg::{ModuleDef, PropertyPermutations};
//!
//! let module = ModuleDef::parse(
//!     r#"
//!     name = "hello"
//!     sources = ["hello.js"]
//!
//!     [[property]]
//!     name = "user.agent"
//!     values = ["ie6", "gecko"]
//!     "#,
//!     Path::new("."),
//! )
//! .unwrap();
//! assert_eq!(PropertyPermutations::new(&module).count(), 2);
//! ```
//!
//! ## Architecture
//!
//! - **[`parser`]** - pest grammar and AST builder for the JavaScript subset
//! - **[`js`]** - the JS AST, source writer, and the per-permutation passes
//!   (static evaluation, property/rebind specialization, stack emulation)
//! - **[`cfg`]** - module definitions and the permutation cross-product
//! - **[`compile`]** - the precompile and parallel compile stages
//! - **[`link`]** - output assembly and selection-script generation

pub mod cfg;
pub mod compile;
pub mod error;
pub mod js;
pub mod link;
pub mod parser;
