//! Template instantiation.
//!
//! Turns a stored [`MacroDefinition`] plus already-expanded arguments (and,
//! for block macros, an already-expanded body) into a fresh subtree.
//!
//! The stored template is never touched: it is cloned once per
//! instantiation, and every substitution site gets its own copy of the
//! bound argument. Sites in a binding position get the copy retagged with
//! the site's role, so two write-sites never share a node.
//!
//! Nodes that come from the template take the call-site span; substituted
//! arguments and the spliced body keep their own.

use std::collections::HashMap;

use crate::ast::role::with_role;
use crate::ast::{Expr, ExprNode, Role, Span, Stmt, StmtNode, WithSpan};
use crate::diagnostics::SpliceError;
use crate::macros::error::arity_error;
use crate::macros::{MacroDefinition, BODY_PLACEHOLDER};

/// Result of instantiating one macro call.
#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    Expr(ExprNode),
    Block(Vec<StmtNode>),
}

/// Instantiates `definition` with positional `args` at `call_span`.
///
/// The argument count is checked before anything is copied. `body` replaces
/// every `__body__` statement of a block template, wrapped in `if True { }`
/// so it stays a single statement wherever the placeholder sits.
pub fn instantiate(
    definition: &MacroDefinition,
    args: Vec<ExprNode>,
    body: Option<Vec<StmtNode>>,
    call_span: Span,
) -> Result<Instance, SpliceError> {
    if args.len() != definition.arity() {
        return Err(arity_error(
            definition.name(),
            definition.arity(),
            args.len(),
            call_span,
        ));
    }

    let bindings: HashMap<&str, ExprNode> = definition
        .params()
        .iter()
        .map(String::as_str)
        .zip(args)
        .collect();
    let substitution = Substitution {
        bindings,
        body,
        call_span,
    };

    match definition {
        MacroDefinition::Expression { template, .. } => {
            let mut expr = template.clone();
            substitution.expr(&mut expr);
            Ok(Instance::Expr(expr))
        }
        MacroDefinition::Block { template, .. } => {
            Ok(Instance::Block(substitution.block(template.clone())))
        }
    }
}

struct Substitution<'d> {
    bindings: HashMap<&'d str, ExprNode>,
    body: Option<Vec<StmtNode>>,
    call_span: Span,
}

impl Substitution<'_> {
    fn block(&self, block: Vec<StmtNode>) -> Vec<StmtNode> {
        block.into_iter().map(|stmt| self.stmt(stmt)).collect()
    }

    fn stmt(&self, mut stmt: StmtNode) -> StmtNode {
        stmt.span = self.call_span;
        if let Some(body) = &self.body {
            if stmt.value.is_bare_name(BODY_PLACEHOLDER) {
                tracing::trace!(statements = body.len(), "body spliced");
                let guard = WithSpan::new(Expr::Bool(true), self.call_span);
                return WithSpan::new(
                    Stmt::If {
                        test: guard,
                        body: body.clone(),
                        orelse: Vec::new(),
                    },
                    self.call_span,
                );
            }
        }

        for expr in stmt.value.exprs_mut() {
            self.expr(expr);
        }
        for block in stmt.value.blocks_mut() {
            let nested = std::mem::take(block);
            *block = self.block(nested);
        }
        stmt
    }

    fn expr(&self, node: &mut ExprNode) {
        if let Expr::Name { id, role } = &node.value {
            if let Some(arg) = self.bindings.get(id.as_str()) {
                tracing::trace!(param = %id, ?role, "argument substituted");
                *node = match role {
                    Role::Read => arg.clone(),
                    role => with_role(arg, *role),
                };
                return;
            }
        }
        node.span = self.call_span;
        for child in node.value.children_mut() {
            self.expr(child);
        }
    }
}
