//! Splice parser.
//!
//! Converts source text into a [`Module`] with source location tracking.
//! Besides building the tree, the parser checks binding targets and tags
//! them with their role, so every tree it returns is role-consistent.

use pest::{error::LineColLocation, iterators::Pair, Parser};
use pest_derive::Parser;

use crate::ast::role::set_role;
use crate::ast::{
    Arg, BinOp, BoolOp, CmpOp, Expr, ExprNode, FunctionDef, ImportName, Module, Param, Params,
    Role, Span, Stmt, StmtNode, UnaryOp, WithSpan,
};
use crate::diagnostics::{SourceContext, SpliceError};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct SpliceParser;

type ParseResult<T> = Result<T, SpliceError>;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parse a source unit into a module.
pub fn parse(source: &SourceContext) -> ParseResult<Module> {
    let mut pairs =
        SpliceParser::parse(Rule::program, &source.content).map_err(convert_parse_error)?;
    let Some(program) = pairs.next() else {
        return Ok(Module::default());
    };

    let body = program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build_stmt)
        .collect::<ParseResult<Vec<_>>>()?;
    tracing::debug!(unit = %source.name, statements = body.len(), "parsed");
    Ok(Module::new(body))
}

/// Parse an anonymous snippet.
pub fn parse_str(text: &str) -> ParseResult<Module> {
    parse(&SourceContext::snippet(text))
}

// ============================================================================
// STATEMENT BUILDERS
// ============================================================================

fn build_stmt(pair: Pair<Rule>) -> ParseResult<StmtNode> {
    let span = span_of(&pair);
    let rule = pair.as_rule();
    let stmt = match rule {
        Rule::pass_stmt => Stmt::Pass,
        Rule::break_stmt => Stmt::Break,
        Rule::continue_stmt => Stmt::Continue,
        Rule::return_stmt => Stmt::Return(inner(pair).next().map(build_expr).transpose()?),
        Rule::expr_stmt => Stmt::Expr(build_expr(first(pair)?)?),
        Rule::del_stmt => {
            let targets = inner(pair)
                .map(|p| build_target(p, Role::Delete))
                .collect::<ParseResult<Vec<_>>>()?;
            Stmt::Delete { targets }
        }
        Rule::assign_stmt => {
            let mut exprs = inner(pair).collect::<Vec<_>>();
            let value = exprs.pop().ok_or_else(|| missing("assigned value", span))?;
            let targets = exprs
                .into_iter()
                .map(|p| build_target(p, Role::Write))
                .collect::<ParseResult<Vec<_>>>()?;
            Stmt::Assign {
                targets,
                value: build_expr(value)?,
            }
        }
        Rule::aug_assign_stmt => build_aug_assign(pair, span)?,
        Rule::import_from => build_import(pair, span)?,
        Rule::func_def => Stmt::FunctionDef(build_function(pair, span)?),
        Rule::if_stmt => build_if(pair, span)?,
        Rule::while_stmt => {
            let mut parts = inner(pair);
            let test = build_expr(next(&mut parts, "loop condition", span)?)?;
            let body = build_block(next(&mut parts, "loop body", span)?)?;
            Stmt::While { test, body }
        }
        Rule::with_stmt => build_with(pair, span)?,
        other => return Err(unexpected(other, span)),
    };
    Ok(WithSpan::new(stmt, span))
}

fn build_block(pair: Pair<Rule>) -> ParseResult<Vec<StmtNode>> {
    inner(pair).map(build_stmt).collect()
}

fn build_aug_assign(pair: Pair<Rule>, span: Span) -> ParseResult<Stmt> {
    let mut parts = inner(pair);
    let target_pair = next(&mut parts, "augmented assignment target", span)?;
    let op_pair = next(&mut parts, "augmented operator", span)?;
    let value = build_expr(next(&mut parts, "augmented assignment value", span)?)?;

    let target = build_target(target_pair, Role::Write)?;
    if matches!(target.value, Expr::List { .. } | Expr::Tuple { .. }) {
        return Err(SpliceError::parse(
            format!(
                "illegal expression for augmented assignment: {}",
                target.value.describe()
            ),
            target.span,
        ));
    }
    let op = match op_pair.as_str() {
        "+=" => BinOp::Add,
        "-=" => BinOp::Sub,
        "*=" => BinOp::Mul,
        "/=" => BinOp::Div,
        "//=" => BinOp::FloorDiv,
        "%=" => BinOp::Mod,
        text => {
            return Err(SpliceError::parse(
                format!("unknown operator {text}"),
                span_of(&op_pair),
            ))
        }
    };
    Ok(Stmt::AugAssign { target, op, value })
}

fn build_import(pair: Pair<Rule>, span: Span) -> ParseResult<Stmt> {
    let mut parts = inner(pair);
    let module = next(&mut parts, "module name", span)?.as_str().to_string();
    let list = next(&mut parts, "import list", span)?;

    let mut names = Vec::new();
    for item in inner(list) {
        match item.as_rule() {
            Rule::wildcard => names.push(ImportName::new(ImportName::WILDCARD, None)),
            Rule::import_item => {
                let item_span = span_of(&item);
                let mut idents = inner(item);
                let name = next(&mut idents, "imported name", item_span)?.as_str();
                let alias = idents.next().map(|p| p.as_str().to_string());
                names.push(ImportName::new(name, alias));
            }
            other => return Err(unexpected(other, span_of(&item))),
        }
    }
    Ok(Stmt::ImportFrom { module, names })
}

fn build_function(pair: Pair<Rule>, span: Span) -> ParseResult<FunctionDef> {
    let mut decorators = Vec::new();
    let mut name = None;
    let mut params = Params::default();
    let mut body = None;

    for part in inner(pair) {
        match part.as_rule() {
            Rule::decorator => decorators.push(build_expr(first(part)?)?),
            Rule::ident => name = Some(part.as_str().to_string()),
            Rule::params => params = build_params(part)?,
            Rule::block => body = Some(build_block(part)?),
            other => return Err(unexpected(other, span_of(&part))),
        }
    }

    Ok(FunctionDef {
        name: name.ok_or_else(|| missing("function name", span))?,
        params,
        decorators,
        body: body.ok_or_else(|| missing("function body", span))?,
    })
}

fn build_params(pair: Pair<Rule>) -> ParseResult<Params> {
    let mut params = Params::default();
    let mut seen_default = false;

    for part in inner(pair) {
        let span = span_of(&part);
        if params.kwarg.is_some() {
            return Err(SpliceError::parse("parameter follows **kwargs", span));
        }
        let rule = part.as_rule();
        let mut pieces = inner(part);
        let name = next(&mut pieces, "parameter name", span)?.as_str().to_string();

        let declared = params
            .names()
            .chain(params.vararg.as_deref())
            .any(|existing| existing == name);
        if declared {
            return Err(SpliceError::parse(
                format!("duplicate argument '{name}' in function definition"),
                span,
            ));
        }

        match rule {
            Rule::plain_param | Rule::default_param if params.vararg.is_some() => {
                return Err(SpliceError::parse("parameter follows *args", span));
            }
            Rule::plain_param => {
                if seen_default {
                    return Err(SpliceError::parse(
                        "non-default argument follows default argument",
                        span,
                    ));
                }
                params.args.push(Param {
                    name,
                    default: None,
                    span,
                });
            }
            Rule::default_param => {
                seen_default = true;
                let default = build_expr(next(&mut pieces, "default value", span)?)?;
                params.args.push(Param {
                    name,
                    default: Some(default),
                    span,
                });
            }
            Rule::vararg_param => params.vararg = Some(name),
            Rule::kwarg_param => params.kwarg = Some(name),
            other => return Err(unexpected(other, span)),
        }
    }
    Ok(params)
}

fn build_if(pair: Pair<Rule>, span: Span) -> ParseResult<Stmt> {
    let mut parts = inner(pair);
    let test = build_expr(next(&mut parts, "condition", span)?)?;
    let body = build_block(next(&mut parts, "if body", span)?)?;

    let mut elifs = Vec::new();
    let mut orelse = Vec::new();
    for clause in parts {
        let clause_span = span_of(&clause);
        match clause.as_rule() {
            Rule::elif_clause => {
                let mut pieces = inner(clause);
                let test = build_expr(next(&mut pieces, "condition", clause_span)?)?;
                let body = build_block(next(&mut pieces, "elif body", clause_span)?)?;
                elifs.push((test, body, clause_span));
            }
            Rule::else_clause => orelse = build_block(first(clause)?)?,
            other => return Err(unexpected(other, clause_span)),
        }
    }

    // elif chains nest into the else branch, innermost last.
    for (test, body, clause_span) in elifs.into_iter().rev() {
        let nested = Stmt::If { test, body, orelse };
        orelse = vec![WithSpan::new(nested, clause_span)];
    }
    Ok(Stmt::If { test, body, orelse })
}

fn build_with(pair: Pair<Rule>, span: Span) -> ParseResult<Stmt> {
    let mut context = None;
    let mut target = None;
    let mut body = None;

    for part in inner(pair) {
        match part.as_rule() {
            Rule::expr => context = Some(build_expr(part)?),
            Rule::with_target => target = Some(build_target(first(part)?, Role::Write)?),
            Rule::block => body = Some(build_block(part)?),
            other => return Err(unexpected(other, span_of(&part))),
        }
    }

    Ok(Stmt::With {
        context: context.ok_or_else(|| missing("context expression", span))?,
        target,
        body: body.ok_or_else(|| missing("with body", span))?,
    })
}

/// Builds an expression in a binding position and tags it with `role`.
fn build_target(pair: Pair<Rule>, role: Role) -> ParseResult<ExprNode> {
    let mut node = build_expr(pair)?;
    if !node.value.is_target_shape() {
        let verb = if role == Role::Delete {
            "delete"
        } else {
            "assign to"
        };
        return Err(SpliceError::parse(
            format!("cannot {verb} {}", node.value.describe()),
            node.span,
        ));
    }
    set_role(&mut node, role);
    Ok(node)
}

// ============================================================================
// EXPRESSION BUILDERS
// ============================================================================

fn build_expr(pair: Pair<Rule>) -> ParseResult<ExprNode> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::expr | Rule::not_expr | Rule::factor | Rule::paren => build_expr(first(pair)?),
        Rule::or_expr => build_bool_op(pair, BoolOp::Or),
        Rule::and_expr => build_bool_op(pair, BoolOp::And),
        Rule::not_op => {
            let operand = build_expr(first(pair)?)?;
            Ok(unary(UnaryOp::Not, operand, span))
        }
        Rule::neg_op => {
            let operand = build_expr(first(pair)?)?;
            Ok(unary(UnaryOp::Neg, operand, span))
        }
        Rule::comparison => build_comparison(pair),
        Rule::arith | Rule::term => build_binary_chain(pair),
        Rule::postfix => build_postfix(pair),
        Rule::integer => {
            let text = pair.as_str();
            let value = text.parse::<i64>().map_err(|_| {
                SpliceError::parse(format!("integer literal {text} is too large"), span)
            })?;
            Ok(WithSpan::new(Expr::Int(value), span))
        }
        Rule::string => {
            let body = first(pair)?;
            Ok(WithSpan::new(Expr::Str(unescape(body.as_str())), span))
        }
        Rule::kw_true => Ok(WithSpan::new(Expr::Bool(true), span)),
        Rule::kw_false => Ok(WithSpan::new(Expr::Bool(false), span)),
        Rule::kw_none => Ok(WithSpan::new(Expr::NoneLit, span)),
        Rule::list_lit => Ok(WithSpan::new(
            Expr::List {
                elts: build_exprs(pair)?,
                role: Role::Read,
            },
            span,
        )),
        Rule::tuple_lit => Ok(WithSpan::new(
            Expr::Tuple {
                elts: build_exprs(pair)?,
                role: Role::Read,
            },
            span,
        )),
        Rule::name => Ok(WithSpan::new(Expr::name(first(pair)?.as_str()), span)),
        other => Err(unexpected(other, span)),
    }
}

fn build_exprs(pair: Pair<Rule>) -> ParseResult<Vec<ExprNode>> {
    inner(pair).map(build_expr).collect()
}

fn build_bool_op(pair: Pair<Rule>, op: BoolOp) -> ParseResult<ExprNode> {
    let span = span_of(&pair);
    let mut values = build_exprs(pair)?;
    if values.len() == 1 {
        return values.pop().ok_or_else(|| missing("operand", span));
    }
    Ok(WithSpan::new(Expr::BoolOp { op, values }, span))
}

fn build_comparison(pair: Pair<Rule>) -> ParseResult<ExprNode> {
    let span = span_of(&pair);
    let mut parts = inner(pair);
    let left = build_expr(next(&mut parts, "comparison operand", span)?)?;

    let mut ops = Vec::new();
    let mut comparators = Vec::new();
    while let Some(op_pair) = parts.next() {
        ops.push(comparison_op(&op_pair)?);
        comparators.push(build_expr(next(&mut parts, "comparison operand", span)?)?);
    }
    if ops.is_empty() {
        return Ok(left);
    }
    Ok(WithSpan::new(
        Expr::Compare {
            left: Box::new(left),
            ops,
            comparators,
        },
        span,
    ))
}

fn comparison_op(pair: &Pair<Rule>) -> ParseResult<CmpOp> {
    if let Some(word) = pair.clone().into_inner().next() {
        return match word.as_rule() {
            Rule::not_in => Ok(CmpOp::NotIn),
            Rule::kw_in => Ok(CmpOp::In),
            other => Err(unexpected(other, span_of(&word))),
        };
    }
    match pair.as_str() {
        "==" => Ok(CmpOp::Eq),
        "!=" => Ok(CmpOp::NotEq),
        "<" => Ok(CmpOp::Lt),
        "<=" => Ok(CmpOp::LtE),
        ">" => Ok(CmpOp::Gt),
        ">=" => Ok(CmpOp::GtE),
        text => Err(SpliceError::parse(
            format!("unknown comparison {text}"),
            span_of(pair),
        )),
    }
}

/// Left-associative `operand (op operand)*` chains.
fn build_binary_chain(pair: Pair<Rule>) -> ParseResult<ExprNode> {
    let span = span_of(&pair);
    let mut parts = inner(pair);
    let mut left = build_expr(next(&mut parts, "operand", span)?)?;

    while let Some(op_pair) = parts.next() {
        let op = match op_pair.as_str() {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "//" => BinOp::FloorDiv,
            "%" => BinOp::Mod,
            text => {
                return Err(SpliceError::parse(
                    format!("unknown operator {text}"),
                    span_of(&op_pair),
                ))
            }
        };
        let right = build_expr(next(&mut parts, "operand", span)?)?;
        let joined = Span::new(left.span.start, right.span.end, left.span.line);
        left = WithSpan::new(
            Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            joined,
        );
    }
    Ok(left)
}

fn build_postfix(pair: Pair<Rule>) -> ParseResult<ExprNode> {
    let span = span_of(&pair);
    let mut parts = inner(pair);
    let mut node = build_expr(next(&mut parts, "expression", span)?)?;

    for trailer in parts {
        let end = trailer.as_span().end();
        let joined = Span::new(node.span.start, end, node.span.line);
        let expr = match trailer.as_rule() {
            Rule::call_args => Expr::Call {
                func: Box::new(node),
                args: inner(trailer).map(build_arg).collect::<ParseResult<_>>()?,
            },
            Rule::attr_access => Expr::Attribute {
                value: Box::new(node),
                attr: first(trailer)?.as_str().to_string(),
                role: Role::Read,
            },
            Rule::subscript_access => Expr::Subscript {
                value: Box::new(node),
                index: Box::new(build_expr(first(trailer)?)?),
                role: Role::Read,
            },
            other => return Err(unexpected(other, span_of(&trailer))),
        };
        node = WithSpan::new(expr, joined);
    }
    Ok(node)
}

fn build_arg(pair: Pair<Rule>) -> ParseResult<Arg> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::positional_arg => Ok(Arg::Positional(build_expr(first(pair)?)?)),
        Rule::star_arg => Ok(Arg::Star(build_expr(first(pair)?)?)),
        Rule::double_star_arg => Ok(Arg::DoubleStar(build_expr(first(pair)?)?)),
        Rule::keyword_arg => {
            let mut parts = inner(pair);
            let name = next(&mut parts, "keyword name", span)?.as_str().to_string();
            let value = build_expr(next(&mut parts, "keyword value", span)?)?;
            Ok(Arg::Keyword { name, value })
        }
        other => Err(unexpected(other, span)),
    }
}

fn unary(op: UnaryOp, operand: ExprNode, span: Span) -> ExprNode {
    WithSpan::new(
        Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        },
        span,
    )
}

// ============================================================================
// UTILITIES
// ============================================================================

fn span_of(pair: &Pair<Rule>) -> Span {
    let span = pair.as_span();
    Span::new(span.start(), span.end(), span.start_pos().line_col().0)
}

/// Children of `pair` minus the keyword tokens that only mark structure.
fn inner(pair: Pair<Rule>) -> impl Iterator<Item = Pair<Rule>> {
    pair.into_inner().filter(|p| !is_structural_keyword(p.as_rule()))
}

fn is_structural_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_def
            | Rule::kw_if
            | Rule::kw_elif
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_with
            | Rule::kw_as
            | Rule::kw_from
            | Rule::kw_import
            | Rule::kw_pass
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_return
            | Rule::kw_del
            | Rule::kw_and
            | Rule::kw_or
            | Rule::kw_not
    )
}

fn first(pair: Pair<Rule>) -> ParseResult<Pair<Rule>> {
    let span = span_of(&pair);
    let rule = pair.as_rule();
    inner(pair)
        .next()
        .ok_or_else(|| missing(&format!("{rule:?} contents"), span))
}

fn next<'i>(
    parts: &mut impl Iterator<Item = Pair<'i, Rule>>,
    what: &str,
    span: Span,
) -> ParseResult<Pair<'i, Rule>> {
    parts.next().ok_or_else(|| missing(what, span))
}

fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

fn missing(what: &str, span: Span) -> SpliceError {
    SpliceError::parse(format!("missing {what}"), span)
}

fn unexpected(rule: Rule, span: Span) -> SpliceError {
    SpliceError::parse(format!("unexpected {rule:?}"), span)
}

fn convert_parse_error(error: pest::error::Error<Rule>) -> SpliceError {
    let (start, end) = match error.location {
        pest::error::InputLocation::Pos(pos) => (pos, pos),
        pest::error::InputLocation::Span((start, end)) => (start, end),
    };
    let line = match error.line_col {
        LineColLocation::Pos((line, _)) | LineColLocation::Span((line, _), _) => line,
    };
    let message = format!("syntax error: {}", error.variant.message());
    SpliceError::parse(message, Span::new(start, end, line))
}
