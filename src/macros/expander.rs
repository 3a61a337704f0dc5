//! Macro expansion engine.
//!
//! Walks a module's statement lists and replaces every call to a macro in
//! the unit's [`MacroTable`] with an instantiated copy of its template.
//!
//! ## Invocation shapes
//!
//! - `name(args)` in expression position: expression macros only.
//! - `name(args);` as a statement: expression macros, or block macros
//!   without a body slot. A block result is spliced into the enclosing
//!   statement list in place of the call.
//! - `with name(args) { body }`: block macros with a body slot only. The
//!   body is expanded first, then replaces `__body__`.
//!
//! Arguments are expanded before they are substituted, so nested calls
//! expand inside-out. The instantiated result is walked again so calls that
//! the template itself makes are expanded too; that walk is bounded by
//! [`ExpanderOptions::max_depth`].
//!
//! `from pkg.__macros__ import ...;` statements are consumed: their macros
//! are merged into the table (last import wins) and the statement is removed
//! from the output.
//!
//! A failure aborts the whole pass. The module is taken by value, so no
//! partially rewritten tree is ever handed back.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::pretty::{render_block, render_expr};
use crate::ast::{Arg, Expr, ExprNode, ImportName, Module, Span, Stmt, StmtNode, WithSpan};
use crate::diagnostics::SpliceError;
use crate::macros::error::{
    body_rejected_error, body_required_error, module_not_found_error, not_a_block_macro_error,
    not_an_expression_macro_error, recursion_limit_error, star_args_error, with_target_error,
};
use crate::macros::template::{instantiate, Instance};
use crate::macros::{
    macro_source_module, MacroDefinition, MacroKind, MacroRegistry, MacroTable,
    MAX_MACRO_RECURSION_DEPTH,
};

// ============================================================================
// CONFIGURATION AND TRACE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpanderOptions {
    /// Nesting limit for re-expanding instantiated templates.
    pub max_depth: usize,
    /// Record an [`ExpansionStep`] per expanded call site.
    pub record_trace: bool,
}

impl Default for ExpanderOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_MACRO_RECURSION_DEPTH,
            record_trace: true,
        }
    }
}

/// A single macro expansion step, for traceability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionStep {
    /// Name the macro was called by.
    pub macro_name: String,
    pub kind: MacroKind,
    pub span: Span,
    pub depth: usize,
    /// The call site as written, after argument expansion.
    pub input: String,
    /// The instantiated template, before it is walked again.
    pub output: String,
}

// ============================================================================
// EXPANDER
// ============================================================================

/// Expansion state for one source unit.
#[derive(Debug)]
pub struct Expander<'r> {
    registry: Option<&'r MacroRegistry>,
    macros: MacroTable,
    options: ExpanderOptions,
    trace: Vec<ExpansionStep>,
    expansions: usize,
}

impl<'r> Expander<'r> {
    /// Expander that resolves macro imports through `registry`.
    pub fn new(registry: &'r MacroRegistry) -> Self {
        Self {
            registry: Some(registry),
            ..Self::standalone()
        }
    }

    /// Expander with no registry. Only macros supplied through
    /// [`Expander::with_macros`] or [`Expander::define`] are known, and any
    /// macro import fails to resolve.
    pub fn standalone() -> Self {
        Self {
            registry: None,
            macros: MacroTable::new(),
            options: ExpanderOptions::default(),
            trace: Vec::new(),
            expansions: 0,
        }
    }

    pub fn with_options(mut self, options: ExpanderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_macros(mut self, macros: MacroTable) -> Self {
        self.merge(macros);
        self
    }

    /// Registers `definition` under `name`, replacing any previous entry.
    pub fn define(&mut self, name: impl Into<String>, definition: Rc<MacroDefinition>) {
        let name = name.into();
        if self.macros.insert(name.clone(), definition).is_some() {
            tracing::debug!(name = %name, overwritten = true, "macro redefined");
        }
    }

    /// Macros currently visible to the unit.
    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn trace(&self) -> &[ExpansionStep] {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Vec<ExpansionStep> {
        std::mem::take(&mut self.trace)
    }

    /// Number of call sites expanded so far.
    pub fn expansions(&self) -> usize {
        self.expansions
    }

    /// Expands every macro call in `module`.
    pub fn expand_module(&mut self, module: Module) -> Result<Module, SpliceError> {
        let body = self.expand_block(module.body, 0)?;
        Ok(Module::new(body))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn expand_block(
        &mut self,
        block: Vec<StmtNode>,
        depth: usize,
    ) -> Result<Vec<StmtNode>, SpliceError> {
        let mut out = Vec::with_capacity(block.len());
        for stmt in block {
            out.extend(self.expand_stmt(stmt, depth)?);
        }
        Ok(out)
    }

    fn expand_stmt(&mut self, stmt: StmtNode, depth: usize) -> Result<Vec<StmtNode>, SpliceError> {
        let span = stmt.span;
        match stmt.value {
            Stmt::ImportFrom { module, names } => {
                if let Some(source) = macro_source_module(&module) {
                    self.import(source, &names, span)?;
                    return Ok(Vec::new());
                }
                Ok(vec![WithSpan::new(Stmt::ImportFrom { module, names }, span)])
            }
            Stmt::Expr(expr) if self.lookup_call(&expr).is_some() => {
                self.expand_call_stmt(expr, span, depth)
            }
            Stmt::With {
                context,
                target,
                body,
            } if self.lookup_call(&context).is_some() => {
                self.expand_with(context, target, body, span, depth)
            }
            mut value => {
                for expr in value.exprs_mut() {
                    self.expand_expr(expr, depth)?;
                }
                for block in value.blocks_mut() {
                    let nested = std::mem::take(block);
                    *block = self.expand_block(nested, depth)?;
                }
                Ok(vec![WithSpan::new(value, span)])
            }
        }
    }

    /// `name(args);` as a statement.
    fn expand_call_stmt(
        &mut self,
        call: ExprNode,
        span: Span,
        depth: usize,
    ) -> Result<Vec<StmtNode>, SpliceError> {
        let (name, definition, args) = self.take_call(call, depth)?;
        if definition.has_body_slot() {
            return Err(body_required_error(&name, span));
        }

        match self.instantiate_traced(&name, &definition, args, None, span, depth)? {
            // Still in statement position: a block macro here splices.
            Instance::Expr(expr) if self.lookup_call(&expr).is_some() => {
                self.expand_stmt(WithSpan::new(Stmt::Expr(expr), span), depth + 1)
            }
            Instance::Expr(mut expr) => {
                self.expand_expr(&mut expr, depth + 1)?;
                Ok(vec![WithSpan::new(Stmt::Expr(expr), span)])
            }
            Instance::Block(stmts) => self.expand_block(stmts, depth + 1),
        }
    }

    /// `with name(args) { body }`.
    fn expand_with(
        &mut self,
        context: ExprNode,
        target: Option<ExprNode>,
        body: Vec<StmtNode>,
        span: Span,
        depth: usize,
    ) -> Result<Vec<StmtNode>, SpliceError> {
        if target.is_some() {
            return Err(with_target_error(span));
        }
        let Some((name, definition)) = self.lookup_call(&context) else {
            return Ok(vec![WithSpan::new(
                Stmt::With {
                    context,
                    target,
                    body,
                },
                span,
            )]);
        };
        if definition.kind() == MacroKind::Expression {
            return Err(not_a_block_macro_error(&name, span));
        }
        if !definition.has_body_slot() {
            return Err(body_rejected_error(&name, span));
        }

        let body = self.expand_block(body, depth)?;
        let (name, definition, args) = self.take_call(context, depth)?;
        match self.instantiate_traced(&name, &definition, args, Some(body), span, depth)? {
            Instance::Block(stmts) => self.expand_block(stmts, depth + 1),
            Instance::Expr(expr) => Err(not_a_block_macro_error(&name, expr.span)),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expand_expr(&mut self, node: &mut ExprNode, depth: usize) -> Result<(), SpliceError> {
        let Some((name, definition)) = self.lookup_call(node) else {
            for child in node.value.children_mut() {
                self.expand_expr(child, depth)?;
            }
            return Ok(());
        };
        if definition.kind() != MacroKind::Expression {
            return Err(not_an_expression_macro_error(&name, node.span));
        }

        let span = node.span;
        let call = std::mem::replace(node, placeholder(span));
        let (name, definition, args) = self.take_call(call, depth)?;
        match self.instantiate_traced(&name, &definition, args, None, span, depth)? {
            Instance::Expr(mut expr) => {
                self.expand_expr(&mut expr, depth + 1)?;
                *node = expr;
                Ok(())
            }
            Instance::Block(_) => Err(not_an_expression_macro_error(&name, span)),
        }
    }

    // ------------------------------------------------------------------
    // Call sites
    // ------------------------------------------------------------------

    /// The macro `node` calls, if it is a call to a registered name.
    fn lookup_call(&self, node: &ExprNode) -> Option<(String, Rc<MacroDefinition>)> {
        let (name, _) = node.value.as_named_call()?;
        let definition = self.macros.get(name)?;
        Some((name.to_string(), Rc::clone(definition)))
    }

    /// Validates a registered call and returns its expanded positional
    /// arguments.
    fn take_call(
        &mut self,
        call: ExprNode,
        depth: usize,
    ) -> Result<(String, Rc<MacroDefinition>, Vec<ExprNode>), SpliceError> {
        let span = call.span;
        let Some((name, definition)) = self.lookup_call(&call) else {
            return Err(not_an_expression_macro_error("<unknown>", span));
        };
        if depth >= self.options.max_depth {
            return Err(recursion_limit_error(&name, self.options.max_depth, span));
        }
        let Expr::Call { args, .. } = call.value else {
            return Err(not_an_expression_macro_error(&name, span));
        };

        let mut positional = Vec::with_capacity(args.len());
        for arg in args {
            let Arg::Positional(mut value) = arg else {
                return Err(star_args_error(span));
            };
            self.expand_expr(&mut value, depth)?;
            positional.push(value);
        }
        Ok((name, definition, positional))
    }

    fn instantiate_traced(
        &mut self,
        name: &str,
        definition: &MacroDefinition,
        args: Vec<ExprNode>,
        body: Option<Vec<StmtNode>>,
        span: Span,
        depth: usize,
    ) -> Result<Instance, SpliceError> {
        let input = self
            .options
            .record_trace
            .then(|| render_call(name, &args, body.as_deref()));

        let instance = instantiate(definition, args, body, span)?;
        self.expansions += 1;
        tracing::debug!(macro_name = name, line = span.line, depth, "macro expanded");

        if let Some(input) = input {
            let output = match &instance {
                Instance::Expr(expr) => render_expr(expr),
                Instance::Block(stmts) => render_block(stmts, 0),
            };
            self.trace.push(ExpansionStep {
                macro_name: name.to_string(),
                kind: definition.kind(),
                span,
                depth,
                input,
                output,
            });
        }
        Ok(instance)
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn import(&mut self, module: &str, names: &[ImportName], span: Span) -> Result<(), SpliceError> {
        let Some(registry) = self.registry else {
            return Err(module_not_found_error(
                module,
                "no module locator configured",
                span,
            ));
        };
        let table = registry.resolve(module, names, span)?;
        self.merge(table);
        Ok(())
    }

    fn merge(&mut self, table: MacroTable) {
        for (name, definition) in table {
            self.define(name, definition);
        }
    }
}

/// Stand-in left in a call slot while the call is being expanded.
fn placeholder(span: Span) -> ExprNode {
    WithSpan::new(Expr::NoneLit, span)
}

fn render_call(name: &str, args: &[ExprNode], body: Option<&[StmtNode]>) -> String {
    let args = args.iter().map(render_expr).collect::<Vec<_>>().join(", ");
    match body {
        None => format!("{name}({args})"),
        Some(body) => format!("with {name}({args}) {{\n{}}}", render_block(body, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;
    use crate::macros::extract_macros;
    use crate::syntax::parse_str;

    const DEFS: &str = r#"
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

@macro
def forever(x) { forever(x); }
"#;

    fn expander() -> Expander<'static> {
        let table = extract_macros(&parse_str(DEFS).unwrap()).unwrap();
        Expander::standalone().with_macros(table)
    }

    fn expand(source: &str) -> Result<Module, SpliceError> {
        expander().expand_module(parse_str(source)?)
    }

    fn normalized(source: &str) -> Module {
        let mut module = parse_str(source).unwrap();
        module.clear_spans();
        module
    }

    #[test]
    fn nested_calls_expand_inside_out() {
        let mut module = expand("k = add(add(1, 2, 3), 4, 10);").unwrap();
        module.clear_spans();
        assert_eq!(module, normalized("k = 1 + 2 + 3 + 4 + 10;"));
    }

    #[test]
    fn block_results_are_spliced() {
        let mut module = expand("x = 0;\nassign(j, 1);\ny = 2;").unwrap();
        assert_eq!(module.body.len(), 3);
        module.clear_spans();
        assert_eq!(module, normalized("x = 0; j = 1; y = 2;"));
    }

    #[test]
    fn with_body_is_expanded_and_spliced() {
        let mut module = expand("with do_while(False) { k = add(5, 5, 5); }").unwrap();
        module.clear_spans();
        let expected = normalized(
            "while True { if True { k = 5 + 5 + 5; } if not False { break; } }",
        );
        assert_eq!(module, expected);
    }

    #[test]
    fn shape_mismatches_are_call_errors() {
        for source in [
            "k = assign(j, 1);",
            "with assign(j, 1) { pass; }",
            "with add(1, 2, 3) { pass; }",
            "do_while(1);",
            "k = do_while(1);",
            "add(1, 2);",
            "add(1, 2, k=3);",
            "add(1, 2, *rest);",
            "with do_while(x) as t { pass; }",
        ] {
            let err = expand(source).unwrap_err();
            assert_eq!(err.error_type(), ErrorType::MacroCall, "{source}");
        }
    }

    #[test]
    fn messages_name_the_misuse() {
        assert!(expand("do_while(1);")
            .unwrap_err()
            .message()
            .starts_with("macro requires a body"));
        assert!(expand("with assign(j, 1) { pass; }")
            .unwrap_err()
            .message()
            .starts_with("macro accepts no body"));
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let mut expander = expander().with_options(ExpanderOptions {
            max_depth: 8,
            record_trace: false,
        });
        let err = expander
            .expand_module(parse_str("forever(1);").unwrap())
            .unwrap_err();
        assert!(err.message().starts_with("macro recursion limit exceeded"));
        assert_eq!(expander.expansions(), 8);
    }

    #[test]
    fn unregistered_names_are_left_alone() {
        let mut module = expand("def add3(a) { return a; }\nk = other(1);").unwrap();
        module.clear_spans();
        assert_eq!(module, normalized("def add3(a) { return a; }\nk = other(1);"));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let mut expander = expander();
        let once = expander
            .expand_module(parse_str("k = add(1, 2, 3);\nassign(j, k);").unwrap())
            .unwrap();
        let count = expander.expansions();
        let twice = expander.expand_module(once.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(expander.expansions(), count);
    }

    #[test]
    fn trace_records_each_call_site() {
        let mut expander = expander();
        expander
            .expand_module(parse_str("k = add(add(1, 2, 3), 4, 10);").unwrap())
            .unwrap();
        let trace = expander.trace();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].input, "add(1, 2, 3)");
        assert_eq!(trace[1].input, "add(1 + 2 + 3, 4, 10)");
        assert_eq!(trace[1].output, "1 + 2 + 3 + 4 + 10");
    }

    #[test]
    fn macro_imports_need_a_registry() {
        let err = expand("from demo.__macros__ import add;").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::MacroResolution);
    }
}
