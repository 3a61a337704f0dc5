//! Splice: source-to-source macro expansion for a small brace-delimited
//! language.
//!
//! Macros are functions decorated with `@macro`, imported with
//! `from pkg.__macros__ import name;` and expanded at load time by
//! substituting call-site argument trees into the macro's template.
//!
//! The pipeline is parse ([`syntax`]) → expand ([`macros`]) → validate
//! ([`validation`]) → execute ([`runtime`]); [`engine`] wires it together.

pub mod ast;
pub mod diagnostics;
pub mod engine;
pub mod macros;
pub mod runtime;
pub mod syntax;
pub mod validation;

pub use crate::diagnostics::{ErrorType, SourceContext, SpliceError};
pub use crate::engine::{Engine, Expansion, MacroImporter, ModuleExpansion, RunOutcome};
pub use crate::macros::{
    Expander, ExpanderOptions, FileSystemLocator, MacroRegistry, MemoryLocator, ModuleLocator,
};
pub use crate::runtime::{EvalOptions, Interpreter, Value};
