//! Macro definition extraction.
//!
//! Scans the top level of a parsed unit for `@macro` function definitions
//! and classifies each one as an expression or block macro.

use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{any_stmt, FunctionDef, Module, Span, Stmt, StmtNode};
use crate::diagnostics::SpliceError;
use crate::macros::error::{definition_error, duplicate_param_error, reserved_param_error};
use crate::macros::{MacroDefinition, MacroTable, BODY_PLACEHOLDER, MACRO_DECORATOR};

/// Extracts every macro defined at the top level of `module`.
///
/// A definition is a macro only if it carries exactly one decorator and that
/// decorator is the bare name `macro`; anything else is an ordinary function
/// and is skipped. Macros with `*rest`, `**kw` or defaulted parameters fail
/// the whole extraction.
pub fn extract_macros(module: &Module) -> Result<MacroTable, SpliceError> {
    let mut table = MacroTable::new();
    for stmt in &module.body {
        let Stmt::FunctionDef(def) = &stmt.value else {
            continue;
        };
        if !is_macro_definition(def) {
            continue;
        }
        let definition = build_definition(def, stmt.span)?;
        tracing::debug!(
            name = %def.name,
            kind = ?definition.kind(),
            arity = definition.arity(),
            has_body = definition.has_body_slot(),
            "macro extracted"
        );
        table.insert(def.name.clone(), Rc::new(definition));
    }
    Ok(table)
}

/// Returns true if `def` is annotated with exactly `@macro`.
pub fn is_macro_definition(def: &FunctionDef) -> bool {
    match def.decorators.as_slice() {
        [decorator] => decorator.value.as_name() == Some(MACRO_DECORATOR),
        _ => false,
    }
}

/// True if `block` uses the body placeholder at any depth.
pub fn uses_body_placeholder(block: &[StmtNode]) -> bool {
    any_stmt(block, &|stmt| stmt.is_bare_name(BODY_PLACEHOLDER))
}

fn build_definition(def: &FunctionDef, span: Span) -> Result<MacroDefinition, SpliceError> {
    if !def.params.is_fixed() {
        return Err(definition_error(&def.name, span));
    }

    let mut seen = HashSet::new();
    for param in &def.params.args {
        if param.name == BODY_PLACEHOLDER || param.name == MACRO_DECORATOR {
            return Err(reserved_param_error(&def.name, &param.name, param.span));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(duplicate_param_error(&def.name, &param.name, param.span));
        }
    }
    let params: Vec<String> = def.params.names().map(str::to_string).collect();

    if let [only] = def.body.as_slice() {
        match &only.value {
            Stmt::Expr(expr) if !only.value.is_bare_name(BODY_PLACEHOLDER) => {
                return Ok(MacroDefinition::Expression {
                    name: def.name.clone(),
                    params,
                    template: expr.clone(),
                    span,
                });
            }
            _ => {}
        }
    }

    Ok(MacroDefinition::Block {
        name: def.name.clone(),
        params,
        has_body: uses_body_placeholder(&def.body),
        template: def.body.clone(),
        span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;
    use crate::macros::MacroKind;
    use crate::syntax::parse_str;

    const DEFS: &str = r#"
from os import path;

def not_a_macro() { pass; }

@macro
def add(i, j, k) { i + j + k; }

@macro
def assign(name, value) { name = value; }

@macro
def do_while(cond) {
    while True {
        __body__;
        if not cond { break; }
    }
}

@other
@macro
def twice(x) { x; }
"#;

    fn table() -> MacroTable {
        extract_macros(&parse_str(DEFS).unwrap()).unwrap()
    }

    #[test]
    fn only_annotated_functions_are_macros() {
        let table = table();
        assert!(!table.contains_key("not_a_macro"));
        assert!(!table.contains_key("twice"));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn classification() {
        let table = table();
        assert_eq!(table["add"].kind(), MacroKind::Expression);
        assert_eq!(table["assign"].kind(), MacroKind::Block);
        assert!(!table["assign"].has_body_slot());
        assert!(table["do_while"].has_body_slot());
        assert_eq!(table["add"].arity(), 3);
    }

    #[test]
    fn unsupported_signatures_are_rejected() {
        for source in [
            "@macro\ndef foo(x, y = 1) { pass; }",
            "@macro\ndef foo(*args) { pass; }",
            "@macro\ndef foo(x, **kw) { pass; }",
        ] {
            let err = extract_macros(&parse_str(source).unwrap()).unwrap_err();
            assert_eq!(err.error_type(), ErrorType::MacroDefinition, "{source}");
            assert!(err.message().contains("unsupported signature"));
        }
    }

    #[test]
    fn reserved_names_cannot_be_parameters() {
        for (source, param) in [
            ("@macro\ndef wrap(__body__) { print(__body__); __body__; }", "__body__"),
            ("@macro\ndef wrap(x, macro) { x + macro; }", "macro"),
        ] {
            let err = extract_macros(&parse_str(source).unwrap()).unwrap_err();
            assert_eq!(err.error_type(), ErrorType::MacroDefinition, "{source}");
            assert_eq!(
                err.message(),
                format!("macro wrap uses reserved name {param} as a parameter")
            );
        }
    }

    #[test]
    fn nested_definitions_are_ignored() {
        let source = "def outer() {\n@macro\ndef inner(x) { x; }\n}";
        assert!(extract_macros(&parse_str(source).unwrap()).unwrap().is_empty());
    }
}
