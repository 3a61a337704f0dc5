//! Role rewriting.
//!
//! A macro argument always arrives at the call site as a `Read` reference.
//! When the template position that consumes it is a binding target, the
//! substituted copy must carry the target's role instead.
//!
//! Rewriting stops at shapes that cannot be targets: a call, operator or
//! literal keeps its subtree untouched. The base of an attribute or
//! subscript is evaluated, not bound, so it stays `Read`.

use super::{Expr, ExprNode, Role};

/// Forces `role` onto `node` and every target-like node it is made of.
pub fn set_role(node: &mut ExprNode, role: Role) {
    match &mut node.value {
        Expr::Name { role: slot, .. }
        | Expr::Attribute { role: slot, .. }
        | Expr::Subscript { role: slot, .. } => *slot = role,
        Expr::List { elts, role: slot } | Expr::Tuple { elts, role: slot } => {
            *slot = role;
            for elt in elts {
                set_role(elt, role);
            }
        }
        _ => {}
    }
    tracing::trace!(?role, kind = node.value.describe(), "role rewritten");
}

/// Deep copy of `node` carrying `role`.
pub fn with_role(node: &ExprNode, role: Role) -> ExprNode {
    let mut copy = node.clone();
    set_role(&mut copy, role);
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Arg, Span, WithSpan};

    fn node(expr: Expr) -> ExprNode {
        WithSpan::new(expr, Span::default())
    }

    #[test]
    fn list_elements_follow_the_container() {
        let mut list = node(Expr::List {
            elts: vec![node(Expr::name("j")), node(Expr::name("k"))],
            role: Role::Read,
        });
        set_role(&mut list, Role::Write);
        let Expr::List { elts, role } = &list.value else {
            panic!("expected list");
        };
        assert_eq!(*role, Role::Write);
        assert!(elts.iter().all(|e| e.value.role() == Some(Role::Write)));
    }

    #[test]
    fn attribute_base_stays_read() {
        let mut attr = node(Expr::Attribute {
            value: Box::new(node(Expr::name("o"))),
            attr: "x".into(),
            role: Role::Read,
        });
        set_role(&mut attr, Role::Write);
        let Expr::Attribute { value, role, .. } = &attr.value else {
            panic!("expected attribute");
        };
        assert_eq!(*role, Role::Write);
        assert_eq!(value.value.role(), Some(Role::Read));
    }

    #[test]
    fn calls_are_left_alone() {
        let call = node(Expr::Call {
            func: Box::new(node(Expr::name("f"))),
            args: vec![Arg::Positional(node(Expr::name("a")))],
        });
        let rewritten = with_role(&call, Role::Delete);
        assert_eq!(rewritten, call);
    }

    #[test]
    fn copy_leaves_input_untouched() {
        let input = node(Expr::name("j"));
        let copy = with_role(&input, Role::Write);
        assert_eq!(input.value.role(), Some(Role::Read));
        assert_eq!(copy.value.role(), Some(Role::Write));
    }
}
