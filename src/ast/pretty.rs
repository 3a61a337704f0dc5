//! Rendering of syntax trees back to source text.
//!
//! The output parses back to a structurally equal tree: parentheses are
//! emitted exactly where operator precedence requires them.

use std::fmt::{self, Write as _};

use super::{Arg, BinOp, BoolOp, CmpOp, Expr, ExprNode, Module, Params, Stmt, StmtNode, UnaryOp};

const INDENT: &str = "    ";

// Binding strength, loosest first.
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_CMP: u8 = 4;
const PREC_ADD: u8 = 5;
const PREC_MUL: u8 = 6;
const PREC_NEG: u8 = 7;
const PREC_ATOM: u8 = 8;

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_block(&self.body, 0))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_expr(&mut out, self);
        f.write_str(&out)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_stmt(&mut out, self, 0);
        f.write_str(out.trim_end())
    }
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::Add | BinOp::Sub => PREC_ADD,
            BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => PREC_MUL,
        }
    }
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}

/// Renders a statement sequence at the given indentation depth.
pub fn render_block(block: &[StmtNode], depth: usize) -> String {
    let mut out = String::new();
    for stmt in block {
        write_stmt(&mut out, &stmt.value, depth);
    }
    out
}

/// Renders a single expression node.
pub fn render_expr(node: &ExprNode) -> String {
    node.value.to_string()
}

// ============================================================================
// STATEMENTS
// ============================================================================

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    let pad = INDENT.repeat(depth);
    match stmt {
        Stmt::Expr(value) => {
            let _ = writeln!(out, "{pad}{};", value.value);
        }
        Stmt::Assign { targets, value } => {
            out.push_str(&pad);
            for target in targets {
                let _ = write!(out, "{} = ", target.value);
            }
            let _ = writeln!(out, "{};", value.value);
        }
        Stmt::AugAssign { target, op, value } => {
            let _ = writeln!(out, "{pad}{} {}= {};", target.value, op.symbol(), value.value);
        }
        Stmt::Delete { targets } => {
            let _ = writeln!(out, "{pad}del {};", join_exprs(targets));
        }
        Stmt::If { test, body, orelse } => {
            let _ = writeln!(out, "{pad}if {} {{", test.value);
            out.push_str(&render_block(body, depth + 1));
            write_orelse(out, orelse, depth);
        }
        Stmt::While { test, body } => {
            let _ = writeln!(out, "{pad}while {} {{", test.value);
            out.push_str(&render_block(body, depth + 1));
            let _ = writeln!(out, "{pad}}}");
        }
        Stmt::With {
            context,
            target,
            body,
        } => {
            let _ = write!(out, "{pad}with {}", context.value);
            if let Some(target) = target {
                let _ = write!(out, " as {}", target.value);
            }
            out.push_str(" {\n");
            out.push_str(&render_block(body, depth + 1));
            let _ = writeln!(out, "{pad}}}");
        }
        Stmt::FunctionDef(def) => {
            for decorator in &def.decorators {
                let _ = writeln!(out, "{pad}@{}", decorator.value);
            }
            let _ = writeln!(out, "{pad}def {}({}) {{", def.name, render_params(&def.params));
            out.push_str(&render_block(&def.body, depth + 1));
            let _ = writeln!(out, "{pad}}}");
        }
        Stmt::Return(Some(value)) => {
            let _ = writeln!(out, "{pad}return {};", value.value);
        }
        Stmt::Return(None) => {
            let _ = writeln!(out, "{pad}return;");
        }
        Stmt::ImportFrom { module, names } => {
            let names: Vec<String> = names
                .iter()
                .map(|n| match &n.alias {
                    Some(alias) => format!("{} as {}", n.name, alias),
                    None => n.name.clone(),
                })
                .collect();
            let _ = writeln!(out, "{pad}from {} import {};", module, names.join(", "));
        }
        Stmt::Pass => {
            let _ = writeln!(out, "{pad}pass;");
        }
        Stmt::Break => {
            let _ = writeln!(out, "{pad}break;");
        }
        Stmt::Continue => {
            let _ = writeln!(out, "{pad}continue;");
        }
    }
}

fn write_orelse(out: &mut String, orelse: &[StmtNode], depth: usize) {
    let pad = INDENT.repeat(depth);
    match orelse {
        [] => {
            let _ = writeln!(out, "{pad}}}");
        }
        [single] => match &single.value {
            Stmt::If { test, body, orelse } => {
                let _ = writeln!(out, "{pad}}} elif {} {{", test.value);
                out.push_str(&render_block(body, depth + 1));
                write_orelse(out, orelse, depth);
            }
            _ => write_else(out, orelse, depth),
        },
        _ => write_else(out, orelse, depth),
    }
}

fn write_else(out: &mut String, orelse: &[StmtNode], depth: usize) {
    let pad = INDENT.repeat(depth);
    let _ = writeln!(out, "{pad}}} else {{");
    out.push_str(&render_block(orelse, depth + 1));
    let _ = writeln!(out, "{pad}}}");
}

fn render_params(params: &Params) -> String {
    let mut parts: Vec<String> = params
        .args
        .iter()
        .map(|p| match &p.default {
            Some(default) => format!("{}={}", p.name, default.value),
            None => p.name.clone(),
        })
        .collect();
    if let Some(rest) = &params.vararg {
        parts.push(format!("*{rest}"));
    }
    if let Some(kw) = &params.kwarg {
        parts.push(format!("**{kw}"));
    }
    parts.join(", ")
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::BoolOp { op: BoolOp::Or, .. } => PREC_OR,
        Expr::BoolOp { op: BoolOp::And, .. } => PREC_AND,
        Expr::UnaryOp { op: UnaryOp::Not, .. } => PREC_NOT,
        Expr::Compare { .. } => PREC_CMP,
        Expr::BinOp { op, .. } => op.precedence(),
        Expr::UnaryOp { op: UnaryOp::Neg, .. } => PREC_NEG,
        _ => PREC_ATOM,
    }
}

fn write_operand(out: &mut String, expr: &Expr, min: u8) {
    if precedence(expr) < min {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Name { id, .. } => out.push_str(id),
        Expr::Attribute { value, attr, .. } => {
            write_operand(out, &value.value, PREC_ATOM);
            out.push('.');
            out.push_str(attr);
        }
        Expr::Subscript { value, index, .. } => {
            write_operand(out, &value.value, PREC_ATOM);
            out.push('[');
            write_expr(out, &index.value);
            out.push(']');
        }
        Expr::List { elts, .. } => {
            let _ = write!(out, "[{}]", join_exprs(elts));
        }
        Expr::Tuple { elts, .. } => match elts.as_slice() {
            [single] => {
                let _ = write!(out, "({},)", single.value);
            }
            _ => {
                let _ = write!(out, "({})", join_exprs(elts));
            }
        },
        Expr::Call { func, args } => {
            write_operand(out, &func.value, PREC_ATOM);
            let args: Vec<String> = args.iter().map(render_arg).collect();
            let _ = write!(out, "({})", args.join(", "));
        }
        Expr::Int(n) => {
            let _ = write!(out, "{n}");
        }
        Expr::Str(s) => write_string(out, s),
        Expr::Bool(true) => out.push_str("True"),
        Expr::Bool(false) => out.push_str("False"),
        Expr::NoneLit => out.push_str("None"),
        Expr::BinOp { left, op, right } => {
            let prec = op.precedence();
            write_operand(out, &left.value, prec);
            let _ = write!(out, " {} ", op.symbol());
            write_operand(out, &right.value, prec + 1);
        }
        Expr::UnaryOp {
            op: UnaryOp::Neg,
            operand,
        } => {
            out.push('-');
            write_operand(out, &operand.value, PREC_NEG);
        }
        Expr::UnaryOp {
            op: UnaryOp::Not,
            operand,
        } => {
            out.push_str("not ");
            write_operand(out, &operand.value, PREC_NOT);
        }
        Expr::BoolOp { op, values } => {
            let (word, prec) = match op {
                BoolOp::Or => (" or ", PREC_OR),
                BoolOp::And => (" and ", PREC_AND),
            };
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(word);
                }
                write_operand(out, &value.value, prec + 1);
            }
        }
        Expr::Compare {
            left,
            ops,
            comparators,
        } => {
            write_operand(out, &left.value, PREC_ADD);
            for (op, right) in ops.iter().zip(comparators) {
                let _ = write!(out, " {} ", op.symbol());
                write_operand(out, &right.value, PREC_ADD);
            }
        }
    }
}

fn render_arg(arg: &Arg) -> String {
    match arg {
        Arg::Positional(value) => value.value.to_string(),
        Arg::Keyword { name, value } => format!("{}={}", name, value.value),
        Arg::Star(value) => format!("*{}", value.value),
        Arg::DoubleStar(value) => format!("**{}", value.value),
    }
}

fn join_exprs(exprs: &[ExprNode]) -> String {
    exprs
        .iter()
        .map(|e| e.value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
}
