//! AST module for splice source units
//!
//! This module provides the syntax tree that the parser produces, the macro
//! engine rewrites and the runtime executes. The tree is a closed set of
//! statement and expression variants; every traversal in the crate is an
//! exhaustive `match` over them.
//!
//! ## Roles
//!
//! Every name-like node (name, attribute, subscript, list, tuple) carries a
//! [`Role`] describing the position it occupies: `Read` for ordinary
//! references, `Write` for assignment targets and `Delete` for `del`
//! targets. Macro substitution moves subtrees between positions, so roles
//! are mutable and are rewritten by [`role::set_role`].
//!
//! ## Ownership
//!
//! Nodes own their children through `Box`/`Vec`, so `Clone` is a deep copy.
//! Macro templates rely on this: instantiating a template clones it and
//! mutates the clone, never the stored definition.

// ============================================================================
// IMPORTS
// ============================================================================

use serde::{Deserialize, Serialize};

pub mod pretty;
pub mod role;

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// Represents a span in the source code.
///
/// `start`/`end` are byte offsets into the source text, `line` is 1-based.
/// Nodes synthesized by the engine reuse the span of the call site that
/// produced them.
///
/// # Examples
///
/// ```rust
/// use splice::ast::Span;
/// let span = Span::new(0, 5, 1);
/// assert_eq!(span.len(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize) -> Self {
        Self { start, end, line }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wrapper for carrying source span information with any value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithSpan<T> {
    pub value: T,
    pub span: Span,
}

impl<T> WithSpan<T> {
    pub fn new(value: T, span: Span) -> Self {
        Self { value, span }
    }
}

/// Expression node with its source span.
pub type ExprNode = WithSpan<Expr>;

/// Statement node with its source span.
pub type StmtNode = WithSpan<Stmt>;

/// Position a name-like node occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    #[default]
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Name {
        id: String,
        role: Role,
    },
    Attribute {
        value: Box<ExprNode>,
        attr: String,
        role: Role,
    },
    Subscript {
        value: Box<ExprNode>,
        index: Box<ExprNode>,
        role: Role,
    },
    List {
        elts: Vec<ExprNode>,
        role: Role,
    },
    Tuple {
        elts: Vec<ExprNode>,
        role: Role,
    },
    Call {
        func: Box<ExprNode>,
        args: Vec<Arg>,
    },
    Int(i64),
    Str(String),
    Bool(bool),
    NoneLit,
    BinOp {
        left: Box<ExprNode>,
        op: BinOp,
        right: Box<ExprNode>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<ExprNode>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<ExprNode>,
    },
    Compare {
        left: Box<ExprNode>,
        ops: Vec<CmpOp>,
        comparators: Vec<ExprNode>,
    },
}

/// A single call argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Positional(ExprNode),
    Keyword { name: String, value: ExprNode },
    /// `*value`
    Star(ExprNode),
    /// `**value`
    DoubleStar(ExprNode),
}

/// Function parameter with optional default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<ExprNode>,
    pub span: Span,
}

/// Parameter list for function definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Params {
    pub args: Vec<Param>,
    pub vararg: Option<String>,
    pub kwarg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Params,
    pub decorators: Vec<ExprNode>,
    pub body: Vec<StmtNode>,
}

/// One entry of a `from m import ...` list. `*` is stored as the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportName {
    pub const WILDCARD: &'static str = "*";

    pub fn new(name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            name: name.into(),
            alias,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == Self::WILDCARD
    }

    /// Name the import binds in the importing unit.
    pub fn bound_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(ExprNode),
    Assign {
        targets: Vec<ExprNode>,
        value: ExprNode,
    },
    AugAssign {
        target: ExprNode,
        op: BinOp,
        value: ExprNode,
    },
    Delete {
        targets: Vec<ExprNode>,
    },
    If {
        test: ExprNode,
        body: Vec<StmtNode>,
        orelse: Vec<StmtNode>,
    },
    While {
        test: ExprNode,
        body: Vec<StmtNode>,
    },
    /// Scoped block: `with context (as target)? { body }`.
    With {
        context: ExprNode,
        target: Option<ExprNode>,
        body: Vec<StmtNode>,
    },
    FunctionDef(FunctionDef),
    Return(Option<ExprNode>),
    ImportFrom {
        module: String,
        names: Vec<ImportName>,
    },
    Pass,
    Break,
    Continue,
}

/// A parsed source unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Module {
    pub body: Vec<StmtNode>,
}

// ============================================================================
// PUBLIC API IMPLEMENTATION
// ============================================================================

impl Expr {
    pub fn name(id: impl Into<String>) -> Self {
        Expr::Name {
            id: id.into(),
            role: Role::Read,
        }
    }

    /// Role of a name-like node, `None` for every other shape.
    pub fn role(&self) -> Option<Role> {
        match self {
            Expr::Name { role, .. }
            | Expr::Attribute { role, .. }
            | Expr::Subscript { role, .. }
            | Expr::List { role, .. }
            | Expr::Tuple { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Identifier of a plain name node.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name { id, .. } => Some(id),
            _ => None,
        }
    }

    /// `name(args...)` where the callee is a plain name.
    pub fn as_named_call(&self) -> Option<(&str, &[Arg])> {
        match self {
            Expr::Call { func, args } => func.value.as_name().map(|name| (name, args.as_slice())),
            _ => None,
        }
    }

    /// True for shapes that may appear as a binding target.
    pub fn is_target_shape(&self) -> bool {
        match self {
            Expr::Name { .. } | Expr::Attribute { .. } | Expr::Subscript { .. } => true,
            Expr::List { elts, .. } | Expr::Tuple { elts, .. } => {
                elts.iter().all(|e| e.value.is_target_shape())
            }
            _ => false,
        }
    }

    /// Human-readable kind, used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            Expr::Name { .. } => "name",
            Expr::Attribute { .. } => "attribute",
            Expr::Subscript { .. } => "subscript",
            Expr::List { .. } => "list",
            Expr::Tuple { .. } => "tuple",
            Expr::Call { .. } => "function call",
            Expr::Int(_) | Expr::Str(_) | Expr::Bool(_) | Expr::NoneLit => "literal",
            Expr::BinOp { .. } | Expr::UnaryOp { .. } => "operator",
            Expr::BoolOp { .. } => "boolean operation",
            Expr::Compare { .. } => "comparison",
        }
    }

    /// Direct expression children, in source order.
    pub fn children(&self) -> Vec<&ExprNode> {
        match self {
            Expr::Name { .. } | Expr::Int(_) | Expr::Str(_) | Expr::Bool(_) | Expr::NoneLit => {
                Vec::new()
            }
            Expr::Attribute { value, .. } => vec![value.as_ref()],
            Expr::Subscript { value, index, .. } => vec![value.as_ref(), index.as_ref()],
            Expr::List { elts, .. } | Expr::Tuple { elts, .. } => elts.iter().collect(),
            Expr::Call { func, args } => {
                let mut out = vec![func.as_ref()];
                out.extend(args.iter().map(Arg::value));
                out
            }
            Expr::BinOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::UnaryOp { operand, .. } => vec![operand.as_ref()],
            Expr::BoolOp { values, .. } => values.iter().collect(),
            Expr::Compare {
                left, comparators, ..
            } => {
                let mut out = vec![left.as_ref()];
                out.extend(comparators.iter());
                out
            }
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut ExprNode> {
        match self {
            Expr::Name { .. } | Expr::Int(_) | Expr::Str(_) | Expr::Bool(_) | Expr::NoneLit => {
                Vec::new()
            }
            Expr::Attribute { value, .. } => vec![value.as_mut()],
            Expr::Subscript { value, index, .. } => vec![value.as_mut(), index.as_mut()],
            Expr::List { elts, .. } | Expr::Tuple { elts, .. } => elts.iter_mut().collect(),
            Expr::Call { func, args } => {
                let mut out = vec![func.as_mut()];
                out.extend(args.iter_mut().map(Arg::value_mut));
                out
            }
            Expr::BinOp { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expr::UnaryOp { operand, .. } => vec![operand.as_mut()],
            Expr::BoolOp { values, .. } => values.iter_mut().collect(),
            Expr::Compare {
                left, comparators, ..
            } => {
                let mut out = vec![left.as_mut()];
                out.extend(comparators.iter_mut());
                out
            }
        }
    }
}

impl Arg {
    pub fn value(&self) -> &ExprNode {
        match self {
            Arg::Positional(value)
            | Arg::Keyword { value, .. }
            | Arg::Star(value)
            | Arg::DoubleStar(value) => value,
        }
    }

    pub fn value_mut(&mut self) -> &mut ExprNode {
        match self {
            Arg::Positional(value)
            | Arg::Keyword { value, .. }
            | Arg::Star(value)
            | Arg::DoubleStar(value) => value,
        }
    }
}

impl Params {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|p| p.name.as_str())
    }

    /// True if the list is purely positional and required.
    pub fn is_fixed(&self) -> bool {
        self.vararg.is_none() && self.kwarg.is_none() && self.args.iter().all(|p| p.default.is_none())
    }
}

impl Stmt {
    /// Direct expression children (not those of nested blocks).
    pub fn exprs(&self) -> Vec<&ExprNode> {
        match self {
            Stmt::Expr(value) => vec![value],
            Stmt::Assign { targets, value } => {
                let mut out: Vec<&ExprNode> = targets.iter().collect();
                out.push(value);
                out
            }
            Stmt::AugAssign { target, value, .. } => vec![target, value],
            Stmt::Delete { targets } => targets.iter().collect(),
            Stmt::If { test, .. } | Stmt::While { test, .. } => vec![test],
            Stmt::With {
                context, target, ..
            } => {
                let mut out = vec![context];
                out.extend(target.iter());
                out
            }
            Stmt::FunctionDef(def) => {
                let mut out: Vec<&ExprNode> = def.decorators.iter().collect();
                out.extend(def.params.args.iter().filter_map(|p| p.default.as_ref()));
                out
            }
            Stmt::Return(value) => value.iter().collect(),
            Stmt::ImportFrom { .. } | Stmt::Pass | Stmt::Break | Stmt::Continue => Vec::new(),
        }
    }

    pub fn exprs_mut(&mut self) -> Vec<&mut ExprNode> {
        match self {
            Stmt::Expr(value) => vec![value],
            Stmt::Assign { targets, value } => {
                let mut out: Vec<&mut ExprNode> = targets.iter_mut().collect();
                out.push(value);
                out
            }
            Stmt::AugAssign { target, value, .. } => vec![target, value],
            Stmt::Delete { targets } => targets.iter_mut().collect(),
            Stmt::If { test, .. } | Stmt::While { test, .. } => vec![test],
            Stmt::With {
                context, target, ..
            } => {
                let mut out = vec![context];
                out.extend(target.iter_mut());
                out
            }
            Stmt::FunctionDef(def) => {
                let mut out: Vec<&mut ExprNode> = def.decorators.iter_mut().collect();
                out.extend(def.params.args.iter_mut().filter_map(|p| p.default.as_mut()));
                out
            }
            Stmt::Return(value) => value.iter_mut().collect(),
            Stmt::ImportFrom { .. } | Stmt::Pass | Stmt::Break | Stmt::Continue => Vec::new(),
        }
    }

    /// Nested statement blocks.
    pub fn blocks(&self) -> Vec<&Vec<StmtNode>> {
        match self {
            Stmt::If { body, orelse, .. } => vec![body, orelse],
            Stmt::While { body, .. } | Stmt::With { body, .. } => vec![body],
            Stmt::FunctionDef(def) => vec![&def.body],
            _ => Vec::new(),
        }
    }

    pub fn blocks_mut(&mut self) -> Vec<&mut Vec<StmtNode>> {
        match self {
            Stmt::If { body, orelse, .. } => vec![body, orelse],
            Stmt::While { body, .. } | Stmt::With { body, .. } => vec![body],
            Stmt::FunctionDef(def) => vec![&mut def.body],
            _ => Vec::new(),
        }
    }

    /// True for an expression statement consisting of the bare name `id`.
    pub fn is_bare_name(&self, id: &str) -> bool {
        matches!(self, Stmt::Expr(value) if value.value.as_name() == Some(id))
    }
}

impl Module {
    pub fn new(body: Vec<StmtNode>) -> Self {
        Self { body }
    }

    /// Resets every span in the tree to `Span::default()`.
    ///
    /// Structural comparisons in tests use this to ignore positions.
    pub fn clear_spans(&mut self) {
        clear_block_spans(&mut self.body);
    }
}

/// True if any statement in `block` (at any depth) satisfies `pred`.
pub fn any_stmt(block: &[StmtNode], pred: &dyn Fn(&Stmt) -> bool) -> bool {
    block
        .iter()
        .any(|stmt| pred(&stmt.value) || stmt.value.blocks().into_iter().any(|b| any_stmt(b, pred)))
}

/// True if any expression in `block` (at any depth) satisfies `pred`.
pub fn any_expr(block: &[StmtNode], pred: &dyn Fn(&Expr) -> bool) -> bool {
    fn walk(node: &ExprNode, pred: &dyn Fn(&Expr) -> bool) -> bool {
        pred(&node.value) || node.value.children().into_iter().any(|c| walk(c, pred))
    }
    block.iter().any(|stmt| {
        stmt.value.exprs().into_iter().any(|e| walk(e, pred))
            || stmt.value.blocks().into_iter().any(|b| any_expr(b, pred))
    })
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn clear_block_spans(block: &mut [StmtNode]) {
    for stmt in block {
        stmt.span = Span::default();
        if let Stmt::FunctionDef(def) = &mut stmt.value {
            for param in &mut def.params.args {
                param.span = Span::default();
            }
        }
        for expr in stmt.value.exprs_mut() {
            clear_expr_spans(expr);
        }
        for block in stmt.value.blocks_mut() {
            clear_block_spans(block);
        }
    }
}

fn clear_expr_spans(node: &mut ExprNode) {
    node.span = Span::default();
    for child in node.value.children_mut() {
        clear_expr_spans(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(id: &str) -> ExprNode {
        WithSpan::new(Expr::name(id), Span::new(0, id.len(), 1))
    }

    #[test]
    fn target_shapes() {
        let list = Expr::List {
            elts: vec![name("a"), name("b")],
            role: Role::Read,
        };
        assert!(list.is_target_shape());
        let call = Expr::Call {
            func: Box::new(name("f")),
            args: vec![],
        };
        assert!(!call.is_target_shape());
        let nested = Expr::Tuple {
            elts: vec![name("a"), WithSpan::new(call, Span::default())],
            role: Role::Read,
        };
        assert!(!nested.is_target_shape());
    }

    #[test]
    fn named_call_exposes_arguments() {
        let call = Expr::Call {
            func: Box::new(name("add")),
            args: vec![Arg::Positional(name("x"))],
        };
        let (callee, args) = call.as_named_call().unwrap();
        assert_eq!(callee, "add");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn clear_spans_reaches_nested_blocks() {
        let inner = WithSpan::new(Stmt::Expr(name("x")), Span::new(3, 4, 2));
        let mut module = Module::new(vec![WithSpan::new(
            Stmt::While {
                test: name("c"),
                body: vec![inner],
            },
            Span::new(0, 10, 1),
        )]);
        module.clear_spans();
        let Stmt::While { test, body } = &module.body[0].value else {
            panic!("expected while");
        };
        assert_eq!(test.span, Span::default());
        assert_eq!(body[0].span, Span::default());
    }
}
