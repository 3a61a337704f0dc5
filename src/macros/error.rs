//! Error helpers for macro operations.
//!
//! Thin constructors over [`SpliceError`] so every macro failure carries a
//! consistent message for the same misuse, wherever it is detected.

use crate::ast::Span;
use crate::diagnostics::SpliceError;

// =============================
// Definition errors
// =============================

pub fn definition_error(name: &str, span: Span) -> SpliceError {
    SpliceError::macro_definition(format!("macro {name} has an unsupported signature"), span)
}

pub fn duplicate_param_error(name: &str, param: &str, span: Span) -> SpliceError {
    SpliceError::macro_definition(
        format!("macro {name} declares parameter {param} more than once"),
        span,
    )
}

pub fn reserved_param_error(name: &str, param: &str, span: Span) -> SpliceError {
    SpliceError::macro_definition(
        format!("macro {name} uses reserved name {param} as a parameter"),
        span,
    )
}

// =============================
// Resolution errors
// =============================

pub fn module_not_found_error(module: &str, cause: impl std::fmt::Display, span: Span) -> SpliceError {
    SpliceError::macro_resolution(format!("macro module {module} not found: {cause}"), span)
}

pub fn resolution_error(name: &str, module: &str, span: Span) -> SpliceError {
    SpliceError::macro_resolution(format!("macro {name} not found in module {module}"), span)
}

// =============================
// Call errors
// =============================

pub fn call_error(message: impl Into<String>, span: Span) -> SpliceError {
    SpliceError::macro_call(message, span)
}

pub fn arity_error(name: &str, expected: usize, actual: usize, span: Span) -> SpliceError {
    call_error(
        format!("invalid number of arguments: {name}() takes {expected}, got {actual}"),
        span,
    )
}

pub fn star_args_error(span: Span) -> SpliceError {
    call_error("macro call with keyword or star arguments", span)
}

pub fn body_required_error(name: &str, span: Span) -> SpliceError {
    call_error(format!("macro requires a body: use `with {name}(...) {{ ... }}`"), span)
}

pub fn body_rejected_error(name: &str, span: Span) -> SpliceError {
    call_error(format!("macro accepts no body: {name} has no {} substitution", super::BODY_PLACEHOLDER), span)
}

pub fn not_a_block_macro_error(name: &str, span: Span) -> SpliceError {
    call_error(format!("macro {name} is not a block macro"), span)
}

pub fn not_an_expression_macro_error(name: &str, span: Span) -> SpliceError {
    call_error(format!("macro {name} is not an expression macro"), span)
}

pub fn with_target_error(span: Span) -> SpliceError {
    call_error("macro call in `with` cannot bind an `as` target", span)
}

pub fn recursion_limit_error(name: &str, limit: usize, span: Span) -> SpliceError {
    call_error(
        format!("macro recursion limit exceeded while expanding {name} (limit {limit})"),
        span,
    )
}
