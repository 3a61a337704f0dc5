//! Structural validation of expanded modules.
//!
//! Macro substitution moves argument subtrees between read and binding
//! positions. This pass checks that every name-like node ended up with the
//! role its position demands, so a bad substitution is reported as a
//! validation error instead of surfacing later as a confusing runtime
//! failure.

use crate::ast::{Expr, ExprNode, Module, Role, Stmt, StmtNode};
use crate::diagnostics::SpliceError;

/// Checks the role invariant over the whole module.
///
/// - assignment and augmented-assignment targets are `Write`
/// - `del` targets are `Delete`
/// - a `with ... as` target is `Write`
/// - everything else, including attribute and subscript bases, is `Read`
pub fn check_roles(module: &Module) -> Result<(), SpliceError> {
    RoleValidator.block(&module.body)
}

struct RoleValidator;

impl RoleValidator {
    fn block(&self, block: &[StmtNode]) -> Result<(), SpliceError> {
        block.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&self, stmt: &StmtNode) -> Result<(), SpliceError> {
        match &stmt.value {
            Stmt::Assign { targets, value } => {
                for target in targets {
                    self.target(target, Role::Write)?;
                }
                self.read(value)
            }
            Stmt::AugAssign { target, value, .. } => {
                if matches!(target.value, Expr::List { .. } | Expr::Tuple { .. }) {
                    return Err(SpliceError::validation(
                        format!("cannot augment-assign to {}", target.value.describe()),
                        target.span,
                    ));
                }
                self.target(target, Role::Write)?;
                self.read(value)
            }
            Stmt::Delete { targets } => targets
                .iter()
                .try_for_each(|target| self.target(target, Role::Delete)),
            Stmt::With {
                context,
                target,
                body,
            } => {
                self.read(context)?;
                if let Some(target) = target {
                    self.target(target, Role::Write)?;
                }
                self.block(body)
            }
            other => {
                for expr in other.exprs() {
                    self.read(expr)?;
                }
                for block in other.blocks() {
                    self.block(block)?;
                }
                Ok(())
            }
        }
    }

    fn target(&self, node: &ExprNode, role: Role) -> Result<(), SpliceError> {
        let Some(actual) = node.value.role() else {
            return Err(SpliceError::validation(
                format!("cannot bind to {}", node.value.describe()),
                node.span,
            ));
        };
        if actual != role {
            return Err(mismatch(node, role, actual));
        }
        match &node.value {
            Expr::List { elts, .. } | Expr::Tuple { elts, .. } => {
                elts.iter().try_for_each(|elt| self.target(elt, role))
            }
            Expr::Attribute { value, .. } => self.read(value),
            Expr::Subscript { value, index, .. } => {
                self.read(value)?;
                self.read(index)
            }
            _ => Ok(()),
        }
    }

    fn read(&self, node: &ExprNode) -> Result<(), SpliceError> {
        if let Some(actual) = node.value.role() {
            if actual != Role::Read {
                return Err(mismatch(node, Role::Read, actual));
            }
        }
        node.value
            .children()
            .into_iter()
            .try_for_each(|child| self.read(child))
    }
}

fn mismatch(node: &ExprNode, expected: Role, actual: Role) -> SpliceError {
    let what = match &node.value {
        Expr::Name { id, .. } => format!("name {id}"),
        other => other.describe().to_string(),
    };
    SpliceError::validation(
        format!("{what} carries {actual:?} role where {expected:?} is required"),
        node.span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::role::set_role;
    use crate::diagnostics::ErrorType;
    use crate::syntax::parse_str;

    #[test]
    fn parsed_modules_are_consistent() {
        let module = parse_str(
            "a = b = [1, 2];\n[x, y] = a;\no.attr = x[0];\ndel o.attr, x;\nwith f() as t { t += 1; }",
        )
        .unwrap();
        check_roles(&module).unwrap();
    }

    #[test]
    fn read_target_is_rejected() {
        let mut module = parse_str("j = 1;").unwrap();
        let Stmt::Assign { targets, .. } = &mut module.body[0].value else {
            panic!("expected assignment");
        };
        set_role(&mut targets[0], Role::Read);
        let err = check_roles(&module).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        assert!(err.message().contains("name j carries Read role"));
    }

    #[test]
    fn write_in_read_position_is_rejected() {
        let mut module = parse_str("print(k);").unwrap();
        let Stmt::Expr(call) = &mut module.body[0].value else {
            panic!("expected expression");
        };
        let Expr::Call { args, .. } = &mut call.value else {
            panic!("expected call");
        };
        set_role(args[0].value_mut(), Role::Write);
        assert!(check_roles(&module).is_err());
    }
}
