//! # Splice Macro Expansion System
//!
//! This module is responsible for the purely syntactic transformation of a
//! parsed [`Module`](crate::ast::Module) before validation and execution.
//! Macros are ordinary-looking function definitions annotated with
//! `@macro`; their bodies are templates that replace every call site.
//!
//! ## Core Principles
//!
//! - **Syntactic Only**: expansion never evaluates anything. It moves and
//!   copies subtrees.
//! - **Explicit Registration**: a call is a macro call only if its callee
//!   name is present in the expanding unit's [`MacroTable`].
//! - **Layered**: parse → expand → validate → execute. Each stage owns its
//!   tree and hands it on.
//!
//! ## Macro Kinds
//!
//! - **Expression macro**: the body is exactly one expression statement.
//!   Usable wherever an expression is, including as a statement.
//! - **Block macro**: any other body. Usable as a statement; if the body
//!   contains the `__body__` placeholder it must instead be invoked as the
//!   governing call of a `with` block, whose statements replace the
//!   placeholder.
//!
//! Example:
//! ```text
//! @macro
//! def do_while(cond) {
//!     while True { __body__; if not cond { break; } }
//! }
//!
//! with do_while(i != 0) { j = 1; }
//! ```

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::{ExprNode, Span, StmtNode};

pub mod definition;
pub mod error;
pub mod expander;
pub mod loader;
pub mod registry;
pub mod template;

pub use definition::extract_macros;
pub use expander::{ExpanderOptions, ExpansionStep, Expander};
pub use loader::{FileSystemLocator, LocateError, MemoryLocator, ModuleLocator, ModuleSource};
pub use registry::MacroRegistry;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Maximum nesting depth for macro expansion.
pub const MAX_MACRO_RECURSION_DEPTH: usize = 128;

/// Decorator name that marks a function definition as a macro.
pub const MACRO_DECORATOR: &str = "macro";

/// Expression statement replaced by the caller's `with` body.
pub const BODY_PLACEHOLDER: &str = "__body__";

/// Import modules ending in this suffix name macro sources, not runtime
/// modules: `from pkg.__macros__ import m;` reads macros from `pkg`.
pub const MACRO_MODULE_SUFFIX: &str = ".__macros__";

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// A macro extracted from a source unit. Immutable once built; shared
/// between tables through `Rc` and deep-copied on every instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MacroDefinition {
    Expression {
        name: String,
        params: Vec<String>,
        template: ExprNode,
        span: Span,
    },
    Block {
        name: String,
        params: Vec<String>,
        template: Vec<StmtNode>,
        has_body: bool,
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacroKind {
    Expression,
    Block,
}

/// Macros visible to one expanding unit, keyed by the name they are called
/// by (the import alias, when there is one).
pub type MacroTable = HashMap<String, Rc<MacroDefinition>>;

impl MacroDefinition {
    /// Name the macro was defined under.
    pub fn name(&self) -> &str {
        match self {
            MacroDefinition::Expression { name, .. } | MacroDefinition::Block { name, .. } => name,
        }
    }

    pub fn params(&self) -> &[String] {
        match self {
            MacroDefinition::Expression { params, .. } | MacroDefinition::Block { params, .. } => {
                params
            }
        }
    }

    pub fn arity(&self) -> usize {
        self.params().len()
    }

    pub fn kind(&self) -> MacroKind {
        match self {
            MacroDefinition::Expression { .. } => MacroKind::Expression,
            MacroDefinition::Block { .. } => MacroKind::Block,
        }
    }

    /// True for a block macro whose template uses `__body__`.
    pub fn has_body_slot(&self) -> bool {
        matches!(self, MacroDefinition::Block { has_body: true, .. })
    }

    /// Span of the defining `def`.
    pub fn span(&self) -> Span {
        match self {
            MacroDefinition::Expression { span, .. } | MacroDefinition::Block { span, .. } => *span,
        }
    }
}

/// Strips [`MACRO_MODULE_SUFFIX`] from an import module name, returning the
/// module that holds the macro definitions.
pub fn macro_source_module(import: &str) -> Option<&str> {
    import
        .strip_suffix(MACRO_MODULE_SUFFIX)
        .filter(|module| !module.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macro_source_module_strips_suffix() {
        assert_eq!(macro_source_module("demo.macros.__macros__"), Some("demo.macros"));
        assert_eq!(macro_source_module("demo.macros"), None);
        assert_eq!(macro_source_module(".__macros__"), None);
    }
}
