//! Runtime module for splice programs
//!
//! This module provides the runtime value types for the splice executor.
//! Expanded modules are executed by the tree-walking [`Interpreter`] in
//! [`eval`]; builtin functions live in [`builtins`].
//!
//! Lists and objects are shared and mutable, like their counterparts in the
//! languages splice borrows its expression syntax from. Everything else is
//! immutable.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::{Params, StmtNode};

pub mod builtins;
pub mod eval;

pub use builtins::{Builtin, BuiltinFn};
pub use eval::{EvalOptions, ImportHook, Interpreter};

/// Global bindings of a module.
pub type Namespace = im::HashMap<String, Value>;

/// Module globals shared between the executing module and the functions it
/// defines.
pub type SharedNamespace = Rc<RefCell<Namespace>>;

/// Canonical runtime value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    /// Attribute bag created by `object()`.
    Object(Rc<RefCell<BTreeMap<String, Value>>>),
    Function(Rc<Function>),
    Builtin(Builtin),
    Module(Rc<ModuleValue>),
    /// What `@macro` leaves behind at runtime.
    MacroStub(Rc<MacroStub>),
}

/// User-defined function.
pub struct Function {
    pub name: String,
    /// Module the function was defined in.
    pub module: String,
    pub params: Params,
    /// Default values, evaluated at definition time, aligned with
    /// `params.args`.
    pub defaults: Vec<Option<Value>>,
    pub body: Vec<StmtNode>,
    pub globals: SharedNamespace,
}

/// An imported module.
pub struct ModuleValue {
    pub name: String,
    pub globals: SharedNamespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroStub {
    pub module: String,
    pub name: String,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    pub fn object() -> Self {
        Value::Object(Rc::new(RefCell::new(BTreeMap::new())))
    }

    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    /// Returns the type name of the value, as shown in runtime errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function",
            Value::Module(_) => "module",
            Value::MacroStub(_) => "macro",
        }
    }

    /// `None`, `False`, `0`, `""` and empty sequences are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Elements of a sequence value, for spreading and membership tests.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.borrow().clone()),
            Value::Tuple(items) => Some(items.as_ref().clone()),
            Value::Str(s) => Some(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            _ => None,
        }
    }

    /// Attribute lookup on objects and modules.
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(attrs) => attrs.borrow().get(name).cloned(),
            Value::Module(module) => module.globals.borrow().get(name).cloned(),
            _ => None,
        }
    }

    /// Sets an attribute; returns false if the value has no attribute bag.
    pub fn set_attr(&self, name: &str, value: Value) -> bool {
        match self {
            Value::Object(attrs) => {
                attrs.borrow_mut().insert(name.to_string(), value);
                true
            }
            Value::Module(module) => {
                module.globals.borrow_mut().insert(name.to_string(), value);
                true
            }
            _ => false,
        }
    }

    /// Quoted rendering, used inside containers.
    pub fn repr(&self) -> String {
        let Value::Str(s) = self else {
            return self.to_string();
        };
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        for c in s.chars() {
            match c {
                '\'' => out.push_str("\\'"),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                c => out.push(c),
            }
        }
        out.push('\'');
        out
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::MacroStub(a), Value::MacroStub(b)) => a == b,
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                let items = items.borrow();
                write!(f, "[{}]", join_repr(&items))
            }
            Value::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0].repr()),
            Value::Tuple(items) => write!(f, "({})", join_repr(items)),
            Value::Object(attrs) => {
                let attrs = attrs.borrow();
                let fields: Vec<String> = attrs
                    .iter()
                    .map(|(name, value)| format!("{name}={}", value.repr()))
                    .collect();
                write!(f, "object({})", fields.join(", "))
            }
            Value::Function(func) => write!(f, "<function {}.{}>", func.module, func.name),
            Value::Builtin(builtin) => write!(f, "<built-in function {}>", builtin.name),
            Value::Module(module) => write!(f, "<module {}>", module.name),
            Value::MacroStub(stub) => write!(f, "<macro {}.{}>", stub.module, stub.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::object().is_truthy());
    }

    #[test]
    fn rendering() {
        let list = Value::list(vec![Value::Int(1), Value::str("a"), Value::None]);
        assert_eq!(list.to_string(), "[1, 'a', None]");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).to_string(), "(1,)");
        assert_eq!(Value::str("a").to_string(), "a");
    }

    #[test]
    fn lists_compare_by_content() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = Value::list(vec![Value::Int(1)]);
        assert_eq!(a, b);
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::object(), Value::object());
    }
}
