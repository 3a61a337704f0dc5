//! Builtin functions.
//!
//! Builtins receive evaluated positional arguments; keyword arguments are
//! rejected by the caller before dispatch.

use std::fmt;

use crate::ast::Span;
use crate::diagnostics::SpliceError;
use crate::runtime::eval::Interpreter;
use crate::runtime::{MacroStub, Value};

pub type BuiltinFn = fn(&mut Interpreter, Vec<Value>, Span) -> Result<Value, SpliceError>;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

pub const BUILTINS: &[Builtin] = &[
    Builtin { name: "print", func: builtin_print },
    Builtin { name: "len", func: builtin_len },
    Builtin { name: "range", func: builtin_range },
    Builtin { name: "str", func: builtin_str },
    Builtin { name: "int", func: builtin_int },
    Builtin { name: "object", func: builtin_object },
    Builtin { name: "setattr", func: builtin_setattr },
    Builtin { name: "getattr", func: builtin_getattr },
    Builtin { name: "hasattr", func: builtin_hasattr },
    Builtin { name: "macro", func: builtin_macro },
];

pub fn lookup(name: &str) -> Option<Builtin> {
    BUILTINS.iter().find(|b| b.name == name).copied()
}

// ============================================================================
// I/O AND CONVERSIONS
// ============================================================================

fn builtin_print(interp: &mut Interpreter, args: Vec<Value>, _span: Span) -> Result<Value, SpliceError> {
    let line = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
    interp.emit(line);
    Ok(Value::None)
}

fn builtin_len(_: &mut Interpreter, args: Vec<Value>, span: Span) -> Result<Value, SpliceError> {
    let [value] = exactly::<1>("len", args, span)?;
    let len = match &value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        other => {
            return Err(SpliceError::runtime(
                format!("object of type '{}' has no len()", other.type_name()),
                span,
            ))
        }
    };
    Ok(Value::Int(len as i64))
}

fn builtin_range(_: &mut Interpreter, args: Vec<Value>, span: Span) -> Result<Value, SpliceError> {
    let ints = args
        .iter()
        .map(|arg| {
            arg.as_int().ok_or_else(|| {
                SpliceError::runtime(
                    format!("range() expects int arguments, got {}", arg.type_name()),
                    span,
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(SpliceError::runtime(
                format!("range() takes 1 to 3 arguments ({} given)", ints.len()),
                span,
            ))
        }
    };
    if step == 0 {
        return Err(SpliceError::runtime("range() step must not be zero", span));
    }

    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        items.push(Value::Int(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::list(items))
}

fn builtin_str(_: &mut Interpreter, args: Vec<Value>, span: Span) -> Result<Value, SpliceError> {
    match args.as_slice() {
        [] => Ok(Value::str("")),
        [value] => Ok(Value::Str(value.to_string())),
        _ => Err(arity("str", 1, args.len(), span)),
    }
}

fn builtin_int(_: &mut Interpreter, args: Vec<Value>, span: Span) -> Result<Value, SpliceError> {
    let [value] = exactly::<1>("int", args, span)?;
    match &value {
        Value::Int(_) | Value::Bool(_) => Ok(Value::Int(value.as_int().unwrap_or_default())),
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            SpliceError::runtime(format!("invalid literal for int(): {}", value.repr()), span)
        }),
        other => Err(SpliceError::runtime(
            format!("int() argument must be a string or a number, not '{}'", other.type_name()),
            span,
        )),
    }
}

// ============================================================================
// ATTRIBUTES
// ============================================================================

fn builtin_object(_: &mut Interpreter, args: Vec<Value>, span: Span) -> Result<Value, SpliceError> {
    let [] = exactly::<0>("object", args, span)?;
    Ok(Value::object())
}

fn builtin_setattr(_: &mut Interpreter, args: Vec<Value>, span: Span) -> Result<Value, SpliceError> {
    let [target, name, value] = exactly::<3>("setattr", args, span)?;
    let name = attr_name(&name, span)?;
    if !target.set_attr(&name, value) {
        return Err(no_attributes(&target, span));
    }
    Ok(Value::None)
}

fn builtin_getattr(_: &mut Interpreter, args: Vec<Value>, span: Span) -> Result<Value, SpliceError> {
    let count = args.len();
    let mut args = args.into_iter();
    let (Some(target), Some(name)) = (args.next(), args.next()) else {
        return Err(arity("getattr", 2, count, span));
    };
    let default = args.next();
    if args.next().is_some() {
        return Err(arity("getattr", 3, count, span));
    }

    let name = attr_name(&name, span)?;
    match (target.get_attr(&name), default) {
        (Some(value), _) => Ok(value),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(SpliceError::runtime(
            format!("'{}' object has no attribute '{name}'", target.type_name()),
            span,
        )),
    }
}

fn builtin_hasattr(_: &mut Interpreter, args: Vec<Value>, span: Span) -> Result<Value, SpliceError> {
    let [target, name] = exactly::<2>("hasattr", args, span)?;
    let name = attr_name(&name, span)?;
    Ok(Value::Bool(target.get_attr(&name).is_some()))
}

// ============================================================================
// MACROS
// ============================================================================

/// `@macro` at runtime: the function is replaced by a stub that refuses to
/// be called. Macro definitions only matter to the expander.
fn builtin_macro(_: &mut Interpreter, args: Vec<Value>, span: Span) -> Result<Value, SpliceError> {
    let [value] = exactly::<1>("macro", args, span)?;
    let Value::Function(func) = &value else {
        return Err(SpliceError::runtime(
            format!("macro() expects a function, got {}", value.type_name()),
            span,
        ));
    };
    Ok(Value::MacroStub(std::rc::Rc::new(MacroStub {
        module: func.module.clone(),
        name: func.name.clone(),
    })))
}

// ============================================================================
// HELPERS
// ============================================================================

fn exactly<const N: usize>(
    name: &str,
    args: Vec<Value>,
    span: Span,
) -> Result<[Value; N], SpliceError> {
    let count = args.len();
    args.try_into().map_err(|_| arity(name, N, count, span))
}

fn arity(name: &str, expected: usize, given: usize, span: Span) -> SpliceError {
    SpliceError::runtime(
        format!("{name}() takes {expected} argument(s) ({given} given)"),
        span,
    )
}

fn attr_name(value: &Value, span: Span) -> Result<String, SpliceError> {
    match value {
        Value::Str(name) => Ok(name.clone()),
        other => Err(SpliceError::runtime(
            format!("attribute name must be string, not '{}'", other.type_name()),
            span,
        )),
    }
}

fn no_attributes(target: &Value, span: Span) -> SpliceError {
    SpliceError::runtime(
        format!("'{}' object attributes cannot be assigned", target.type_name()),
        span,
    )
}
