//! Tree-walking executor for expanded modules.
//!
//! ## Scoping
//!
//! Module code reads and writes the module globals. Function bodies write
//! to their own locals and read locals, then the defining module's globals,
//! then builtins.
//!
//! ## Imports
//!
//! `from m import n` loads `m` at most once per interpreter. An installed
//! [`ImportHook`] gets the first chance to produce the module; without one,
//! or when the hook declines, the module is located through the configured
//! [`ModuleLocator`], parsed and executed as is. Any failure while loading
//! surfaces as a runtime error `cannot import <m>: <cause>`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{
    Arg, BinOp, BoolOp, CmpOp, Expr, ExprNode, FunctionDef, ImportName, Module, Span, Stmt,
    StmtNode, UnaryOp,
};
use crate::diagnostics::{SourceContext, SpliceError};
use crate::macros::{macro_source_module, ModuleLocator};
use crate::runtime::{builtins, Function, ModuleValue, Namespace, SharedNamespace, Value};
use crate::syntax::parse;

/// Call depth limit of [`EvalOptions::default`].
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Name of the entry module executed by [`Interpreter::run`].
pub const MAIN_MODULE: &str = "__main__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOptions {
    pub max_depth: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Intercepts module loading.
///
/// Returning `None` declines the module and lets the interpreter fall back
/// to its default load path.
pub trait ImportHook {
    fn load(
        &self,
        interp: &mut Interpreter,
        module: &str,
    ) -> Option<Result<Rc<ModuleValue>, SpliceError>>;
}

type EvalResult<T = Value> = Result<T, SpliceError>;

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Frame {
    module: String,
    globals: SharedNamespace,
    locals: Option<HashMap<String, Value>>,
}

impl Frame {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.locals.as_ref().and_then(|locals| locals.get(name)) {
            return Some(value.clone());
        }
        if let Some(value) = self.globals.borrow().get(name) {
            return Some(value.clone());
        }
        builtins::lookup(name).map(Value::Builtin)
    }

    fn store(&mut self, name: &str, value: Value) {
        match &mut self.locals {
            Some(locals) => {
                locals.insert(name.to_string(), value);
            }
            None => {
                self.globals.borrow_mut().insert(name.to_string(), value);
            }
        }
    }

    fn remove(&mut self, name: &str) -> bool {
        match &mut self.locals {
            Some(locals) => locals.remove(name).is_some(),
            None => self.globals.borrow_mut().remove(name).is_some(),
        }
    }
}

#[derive(Default)]
pub struct Interpreter {
    options: EvalOptions,
    output: Vec<String>,
    hook: Option<Rc<dyn ImportHook>>,
    locator: Option<Rc<dyn ModuleLocator>>,
    modules: HashMap<String, Rc<ModuleValue>>,
    loading: Vec<String>,
    depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the locator used by the default import path.
    pub fn with_locator(mut self, locator: Rc<dyn ModuleLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn locator(&self) -> Option<&Rc<dyn ModuleLocator>> {
        self.locator.as_ref()
    }

    /// Installs `hook`, returning the one it replaces.
    pub fn install_hook(&mut self, hook: Box<dyn ImportHook>) -> Option<Rc<dyn ImportHook>> {
        self.hook.replace(Rc::from(hook))
    }

    pub fn remove_hook(&mut self) -> Option<Rc<dyn ImportHook>> {
        self.hook.take()
    }

    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// Lines printed so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub(crate) fn emit(&mut self, line: String) {
        self.output.push(line);
    }

    /// Modules loaded so far, by name.
    pub fn loaded_module(&self, name: &str) -> Option<Rc<ModuleValue>> {
        self.modules.get(name).cloned()
    }

    /// Executes `module` as the entry module and returns its globals.
    pub fn run(&mut self, module: &Module, source: &SourceContext) -> EvalResult<Namespace> {
        let executed = self.exec_module(module, MAIN_MODULE, source)?;
        let globals = executed.globals.borrow().clone();
        Ok(globals)
    }

    /// Executes `module` in a fresh namespace named `name`.
    ///
    /// Errors carry the identity of `source` unless they already name a
    /// file.
    pub fn exec_module(
        &mut self,
        module: &Module,
        name: &str,
        source: &SourceContext,
    ) -> EvalResult<Rc<ModuleValue>> {
        tracing::debug!(module = name, file = %source.name, "executing module");
        let globals: SharedNamespace = Rc::new(RefCell::new(Namespace::new()));
        globals
            .borrow_mut()
            .insert("__name__".to_string(), Value::str(name));
        let mut frame = Frame {
            module: name.to_string(),
            globals: Rc::clone(&globals),
            locals: None,
        };
        self.exec_block(&mut frame, &module.body)
            .map_err(|err| err.with_file(&source.name))?;
        Ok(Rc::new(ModuleValue {
            name: name.to_string(),
            globals,
        }))
    }

    /// Loads `name`, using the module cache, the hook and then the default
    /// path, in that order.
    pub fn import_module(&mut self, name: &str, span: Span) -> EvalResult<Rc<ModuleValue>> {
        if let Some(module) = self.modules.get(name) {
            return Ok(Rc::clone(module));
        }
        if self.loading.iter().any(|loading| loading == name) {
            return Err(SpliceError::runtime(
                format!("cannot import {name}: circular import"),
                span,
            ));
        }

        self.loading.push(name.to_string());
        let loaded = self.load_uncached(name);
        self.loading.pop();

        let module = loaded.map_err(|err| {
            // Located causes render with their file; the rest have no useful line.
            let cause = match err.file() {
                Some(_) => err.to_string(),
                None => err.message(),
            };
            SpliceError::runtime(format!("cannot import {name}: {cause}"), span)
        })?;
        self.modules.insert(name.to_string(), Rc::clone(&module));
        Ok(module)
    }

    fn load_uncached(&mut self, name: &str) -> EvalResult<Rc<ModuleValue>> {
        if let Some(hook) = self.hook.clone() {
            if let Some(result) = hook.load(self, name) {
                return result;
            }
        }

        let Some(locator) = self.locator.clone() else {
            return Err(SpliceError::runtime(
                format!("no module named {name}"),
                Span::default(),
            ));
        };
        let source = locator
            .locate(name)
            .map_err(|err| SpliceError::runtime(err.to_string(), Span::default()))?;
        let context = source.to_context();
        let module = parse(&context).map_err(|err| err.with_file(&source.path))?;
        self.exec_module(&module, name, &context)
    }

    // ========================================================================
    // STATEMENTS
    // ========================================================================

    fn exec_block(&mut self, frame: &mut Frame, block: &[StmtNode]) -> EvalResult<Flow> {
        for stmt in block {
            match self.exec_stmt(frame, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, frame: &mut Frame, stmt: &StmtNode) -> EvalResult<Flow> {
        match &stmt.value {
            Stmt::Expr(value) => {
                self.eval(frame, value)?;
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval(frame, value)?;
                for target in targets {
                    self.assign(frame, target, value.clone())?;
                }
            }
            Stmt::AugAssign { target, op, value } => self.aug_assign(frame, target, *op, value)?,
            Stmt::Delete { targets } => {
                for target in targets {
                    self.delete(frame, target)?;
                }
            }
            Stmt::If { test, body, orelse } => {
                let branch = if self.eval(frame, test)?.is_truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(frame, branch);
            }
            Stmt::While { test, body } => {
                while self.eval(frame, test)?.is_truthy() {
                    match self.exec_block(frame, body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            Stmt::With {
                context,
                target,
                body,
            } => {
                let value = self.eval(frame, context)?;
                if let Some(target) = target {
                    self.assign(frame, target, value)?;
                }
                return self.exec_block(frame, body);
            }
            Stmt::FunctionDef(def) => self.define_function(frame, def, stmt.span)?,
            Stmt::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(frame, value)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::ImportFrom { module, names } => self.import_from(frame, module, names, stmt.span)?,
            Stmt::Pass => {}
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn define_function(&mut self, frame: &mut Frame, def: &FunctionDef, span: Span) -> EvalResult<()> {
        let defaults = def
            .params
            .args
            .iter()
            .map(|param| param.default.as_ref().map(|d| self.eval(frame, d)).transpose())
            .collect::<EvalResult<Vec<_>>>()?;

        let mut value = Value::Function(Rc::new(Function {
            name: def.name.clone(),
            module: frame.module.clone(),
            params: def.params.clone(),
            defaults,
            body: def.body.clone(),
            globals: Rc::clone(&frame.globals),
        }));
        for decorator in def.decorators.iter().rev() {
            let decorator_value = self.eval(frame, decorator)?;
            value = self.call_value(decorator_value, vec![value], Vec::new(), span)?;
        }
        frame.store(&def.name, value);
        Ok(())
    }

    /// `from m import ...`. A macro import names the module the macros are
    /// defined in; what it binds there are the macro stubs.
    fn import_from(
        &mut self,
        frame: &mut Frame,
        module: &str,
        names: &[ImportName],
        span: Span,
    ) -> EvalResult<()> {
        let source_module = macro_source_module(module).unwrap_or(module);
        let loaded = self.import_module(source_module, span)?;
        let globals = loaded.globals.borrow().clone();

        for import in names {
            if import.is_wildcard() {
                for (name, value) in globals.iter().filter(|(name, _)| !name.starts_with('_')) {
                    frame.store(name, value.clone());
                }
                continue;
            }
            let value = globals.get(&import.name).cloned().ok_or_else(|| {
                SpliceError::runtime(
                    format!("cannot import name {} from {source_module}", import.name),
                    span,
                )
            })?;
            frame.store(import.bound_name(), value);
        }
        Ok(())
    }

    fn assign(&mut self, frame: &mut Frame, target: &ExprNode, value: Value) -> EvalResult<()> {
        match &target.value {
            Expr::Name { id, .. } => {
                frame.store(id, value);
                Ok(())
            }
            Expr::Attribute { value: base, attr, .. } => {
                let base = self.eval(frame, base)?;
                if base.set_attr(attr, value) {
                    Ok(())
                } else {
                    Err(SpliceError::runtime(
                        format!("'{}' object attributes cannot be assigned", base.type_name()),
                        target.span,
                    ))
                }
            }
            Expr::Subscript { value: base, index, .. } => {
                let base = self.eval(frame, base)?;
                let index = self.eval(frame, index)?;
                set_item(&base, &index, value, target.span)
            }
            Expr::List { elts, .. } | Expr::Tuple { elts, .. } => {
                let Some(items) = value.elements() else {
                    return Err(SpliceError::runtime(
                        format!("cannot unpack non-sequence {}", value.type_name()),
                        target.span,
                    ));
                };
                if items.len() != elts.len() {
                    return Err(SpliceError::runtime(
                        format!(
                            "cannot unpack: expected {} values, got {}",
                            elts.len(),
                            items.len()
                        ),
                        target.span,
                    ));
                }
                for (elt, item) in elts.iter().zip(items) {
                    self.assign(frame, elt, item)?;
                }
                Ok(())
            }
            other => Err(SpliceError::runtime(
                format!("cannot assign to {}", other.describe()),
                target.span,
            )),
        }
    }

    /// Evaluates the target's base and index once.
    fn aug_assign(
        &mut self,
        frame: &mut Frame,
        target: &ExprNode,
        op: BinOp,
        value: &ExprNode,
    ) -> EvalResult<()> {
        let span = target.span;
        match &target.value {
            Expr::Name { id, .. } => {
                let current = frame.lookup(id).ok_or_else(|| undefined(id, span))?;
                let rhs = self.eval(frame, value)?;
                frame.store(id, binary(op, &current, &rhs, span)?);
                Ok(())
            }
            Expr::Attribute { value: base, attr, .. } => {
                let base = self.eval(frame, base)?;
                let current = base
                    .get_attr(attr)
                    .ok_or_else(|| missing_attribute(&base, attr, span))?;
                let rhs = self.eval(frame, value)?;
                base.set_attr(attr, binary(op, &current, &rhs, span)?);
                Ok(())
            }
            Expr::Subscript { value: base, index, .. } => {
                let base = self.eval(frame, base)?;
                let index = self.eval(frame, index)?;
                let current = get_item(&base, &index, span)?;
                let rhs = self.eval(frame, value)?;
                set_item(&base, &index, binary(op, &current, &rhs, span)?, span)
            }
            other => Err(SpliceError::runtime(
                format!("cannot augment-assign to {}", other.describe()),
                span,
            )),
        }
    }

    fn delete(&mut self, frame: &mut Frame, target: &ExprNode) -> EvalResult<()> {
        let span = target.span;
        match &target.value {
            Expr::Name { id, .. } => {
                if frame.remove(id) {
                    Ok(())
                } else {
                    Err(undefined(id, span))
                }
            }
            Expr::Attribute { value: base, attr, .. } => {
                let base = self.eval(frame, base)?;
                let removed = match &base {
                    Value::Object(attrs) => attrs.borrow_mut().remove(attr).is_some(),
                    _ => false,
                };
                if removed {
                    Ok(())
                } else {
                    Err(missing_attribute(&base, attr, span))
                }
            }
            Expr::Subscript { value: base, index, .. } => {
                let base = self.eval(frame, base)?;
                let index = self.eval(frame, index)?;
                let Value::List(items) = &base else {
                    return Err(SpliceError::runtime(
                        format!("'{}' object does not support item deletion", base.type_name()),
                        span,
                    ));
                };
                let len = items.borrow().len();
                let position = normalize_index(&index, len, span)?;
                items.borrow_mut().remove(position);
                Ok(())
            }
            Expr::List { elts, .. } | Expr::Tuple { elts, .. } => {
                elts.iter().try_for_each(|elt| self.delete(frame, elt))
            }
            other => Err(SpliceError::runtime(
                format!("cannot delete {}", other.describe()),
                span,
            )),
        }
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    fn eval(&mut self, frame: &mut Frame, node: &ExprNode) -> EvalResult {
        let span = node.span;
        match &node.value {
            Expr::Name { id, .. } => frame.lookup(id).ok_or_else(|| undefined(id, span)),
            Expr::Attribute { value, attr, .. } => {
                let base = self.eval(frame, value)?;
                base.get_attr(attr)
                    .ok_or_else(|| missing_attribute(&base, attr, span))
            }
            Expr::Subscript { value, index, .. } => {
                let base = self.eval(frame, value)?;
                let index = self.eval(frame, index)?;
                get_item(&base, &index, span)
            }
            Expr::List { elts, .. } => Ok(Value::list(self.eval_all(frame, elts)?)),
            Expr::Tuple { elts, .. } => Ok(Value::tuple(self.eval_all(frame, elts)?)),
            Expr::Call { func, args } => {
                let callee = self.eval(frame, func)?;
                let (positional, keywords) = self.eval_args(frame, args)?;
                self.call_value(callee, positional, keywords, span)
            }
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Str(s) => Ok(Value::str(s.as_str())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::NoneLit => Ok(Value::None),
            Expr::BinOp { left, op, right } => {
                let left = self.eval(frame, left)?;
                let right = self.eval(frame, right)?;
                binary(*op, &left, &right, span)
            }
            Expr::UnaryOp { op, operand } => {
                let operand = self.eval(frame, operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
                    UnaryOp::Neg => operand
                        .as_int()
                        .and_then(i64::checked_neg)
                        .map(Value::Int)
                        .ok_or_else(|| {
                            SpliceError::runtime(
                                format!("bad operand type for unary -: '{}'", operand.type_name()),
                                span,
                            )
                        }),
                }
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for value in values {
                    last = self.eval(frame, value)?;
                    let done = match op {
                        BoolOp::And => !last.is_truthy(),
                        BoolOp::Or => last.is_truthy(),
                    };
                    if done {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                let mut current = self.eval(frame, left)?;
                for (op, comparator) in ops.iter().zip(comparators) {
                    let next = self.eval(frame, comparator)?;
                    if !compare(*op, &current, &next, span)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Ok(Value::Bool(true))
            }
        }
    }

    fn eval_all(&mut self, frame: &mut Frame, nodes: &[ExprNode]) -> EvalResult<Vec<Value>> {
        nodes.iter().map(|node| self.eval(frame, node)).collect()
    }

    fn eval_args(
        &mut self,
        frame: &mut Frame,
        args: &[Arg],
    ) -> EvalResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        for arg in args {
            match arg {
                Arg::Positional(value) => positional.push(self.eval(frame, value)?),
                Arg::Keyword { name, value } => keywords.push((name.clone(), self.eval(frame, value)?)),
                Arg::Star(value) => {
                    let spread = self.eval(frame, value)?;
                    let items = spread.elements().ok_or_else(|| {
                        SpliceError::runtime(
                            format!("argument after * must be a sequence, not {}", spread.type_name()),
                            value.span,
                        )
                    })?;
                    positional.extend(items);
                }
                Arg::DoubleStar(value) => {
                    let spread = self.eval(frame, value)?;
                    let Value::Object(attrs) = &spread else {
                        return Err(SpliceError::runtime(
                            format!("argument after ** must be an object, not {}", spread.type_name()),
                            value.span,
                        ));
                    };
                    keywords.extend(attrs.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }
        Ok((positional, keywords))
    }

    // ========================================================================
    // CALLS
    // ========================================================================

    pub fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        keywords: Vec<(String, Value)>,
        span: Span,
    ) -> EvalResult {
        match callee {
            Value::Builtin(builtin) => {
                if !keywords.is_empty() {
                    return Err(SpliceError::runtime(
                        format!("{}() takes no keyword arguments", builtin.name),
                        span,
                    ));
                }
                (builtin.func)(self, args, span)
            }
            Value::Function(func) => self.call_function(&func, args, keywords, span),
            Value::MacroStub(stub) => Err(SpliceError::runtime(
                format!(
                    "{}.{}() is a macro; it cannot be called directly",
                    stub.module, stub.name
                ),
                span,
            )),
            other => Err(SpliceError::runtime(
                format!("'{}' object is not callable", other.type_name()),
                span,
            )),
        }
    }

    fn call_function(
        &mut self,
        func: &Rc<Function>,
        args: Vec<Value>,
        keywords: Vec<(String, Value)>,
        span: Span,
    ) -> EvalResult {
        if self.depth >= self.options.max_depth {
            return Err(SpliceError::runtime("maximum recursion depth exceeded", span));
        }
        let locals = bind_arguments(func, args, keywords, span)?;
        let mut frame = Frame {
            module: func.module.clone(),
            globals: Rc::clone(&func.globals),
            locals: Some(locals),
        };

        self.depth += 1;
        let result = self.exec_block(&mut frame, &func.body);
        self.depth -= 1;

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::None),
        }
    }
}

fn bind_arguments(
    func: &Function,
    args: Vec<Value>,
    keywords: Vec<(String, Value)>,
    span: Span,
) -> EvalResult<HashMap<String, Value>> {
    let params = &func.params;
    let mut slots: Vec<Option<Value>> = vec![None; params.args.len()];
    let mut extra = Vec::new();

    for (i, value) in args.into_iter().enumerate() {
        match slots.get_mut(i) {
            Some(slot) => *slot = Some(value),
            None => extra.push(value),
        }
    }
    if !extra.is_empty() && params.vararg.is_none() {
        return Err(SpliceError::runtime(
            format!(
                "{}() takes {} positional arguments but {} were given",
                func.name,
                params.args.len(),
                params.args.len() + extra.len()
            ),
            span,
        ));
    }

    let kwargs = Value::object();
    for (name, value) in keywords {
        match params.args.iter().position(|p| p.name == name) {
            Some(i) if slots[i].is_some() => {
                return Err(SpliceError::runtime(
                    format!("{}() got multiple values for argument '{name}'", func.name),
                    span,
                ))
            }
            Some(i) => slots[i] = Some(value),
            None if params.kwarg.is_some() => {
                kwargs.set_attr(&name, value);
            }
            None => {
                return Err(SpliceError::runtime(
                    format!("{}() got an unexpected keyword argument '{name}'", func.name),
                    span,
                ))
            }
        }
    }

    let mut locals = HashMap::new();
    for ((param, slot), default) in params.args.iter().zip(slots).zip(&func.defaults) {
        let value = slot.or_else(|| default.clone()).ok_or_else(|| {
            SpliceError::runtime(
                format!("{}() missing required argument '{}'", func.name, param.name),
                span,
            )
        })?;
        locals.insert(param.name.clone(), value);
    }
    if let Some(vararg) = &params.vararg {
        locals.insert(vararg.clone(), Value::tuple(extra));
    }
    if let Some(kwarg) = &params.kwarg {
        locals.insert(kwarg.clone(), kwargs);
    }
    Ok(locals)
}

// ============================================================================
// OPERATORS
// ============================================================================

fn binary(op: BinOp, left: &Value, right: &Value, span: Span) -> EvalResult {
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{a}{b}"))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            return Ok(Value::list(items));
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            let items = a.iter().chain(b.iter()).cloned().collect();
            return Ok(Value::tuple(items));
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            return Ok(Value::Str(s.repeat(usize::try_from(*n).unwrap_or(0))));
        }
        (BinOp::Mul, Value::List(items), Value::Int(n)) => {
            let items = items.borrow();
            let count = usize::try_from(*n).unwrap_or(0);
            let repeated = (0..count).flat_map(|_| items.iter().cloned()).collect();
            return Ok(Value::list(repeated));
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (left.as_int(), right.as_int()) else {
        return Err(SpliceError::runtime(
            format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ),
            span,
        ));
    };
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0 => {
            return Err(SpliceError::runtime("division by zero", span))
        }
        BinOp::Div | BinOp::FloorDiv => floor_div(a, b),
        BinOp::Mod => floor_mod(a, b),
    };
    result
        .map(Value::Int)
        .ok_or_else(|| SpliceError::runtime("integer overflow", span))
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value, span: Span) -> EvalResult<bool> {
    use std::cmp::Ordering;

    let ordering = |left: &Value, right: &Value| -> EvalResult<Ordering> {
        match (left, right) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => match (left.as_int(), right.as_int()) {
                (Some(a), Some(b)) => Ok(a.cmp(&b)),
                _ => Err(SpliceError::runtime(
                    format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op.symbol(),
                        left.type_name(),
                        right.type_name()
                    ),
                    span,
                )),
            },
        }
    };

    Ok(match op {
        CmpOp::Eq => left == right,
        CmpOp::NotEq => left != right,
        CmpOp::Lt => ordering(left, right)? == Ordering::Less,
        CmpOp::LtE => ordering(left, right)? != Ordering::Greater,
        CmpOp::Gt => ordering(left, right)? == Ordering::Greater,
        CmpOp::GtE => ordering(left, right)? != Ordering::Less,
        CmpOp::In => contains(right, left, span)?,
        CmpOp::NotIn => !contains(right, left, span)?,
    })
}

fn contains(container: &Value, item: &Value, span: Span) -> EvalResult<bool> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::List(items), _) => Ok(items.borrow().iter().any(|v| v == item)),
        (Value::Tuple(items), _) => Ok(items.iter().any(|v| v == item)),
        (Value::Object(attrs), Value::Str(name)) => Ok(attrs.borrow().contains_key(name)),
        _ => Err(SpliceError::runtime(
            format!("argument of type '{}' is not iterable", container.type_name()),
            span,
        )),
    }
}

// ============================================================================
// ITEMS
// ============================================================================

fn normalize_index(index: &Value, len: usize, span: Span) -> EvalResult<usize> {
    let Value::Int(raw) = index else {
        return Err(SpliceError::runtime(
            format!("indices must be integers, not {}", index.type_name()),
            span,
        ));
    };
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let position = if *raw < 0 { raw + len_i } else { *raw };
    if (0..len_i).contains(&position) {
        Ok(position as usize)
    } else {
        Err(SpliceError::runtime("index out of range", span))
    }
}

fn get_item(base: &Value, index: &Value, span: Span) -> EvalResult {
    match base {
        Value::List(items) => {
            let items = items.borrow();
            Ok(items[normalize_index(index, items.len(), span)?].clone())
        }
        Value::Tuple(items) => Ok(items[normalize_index(index, items.len(), span)?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let position = normalize_index(index, chars.len(), span)?;
            Ok(Value::Str(chars[position].to_string()))
        }
        Value::Object(attrs) => {
            let Value::Str(key) = index else {
                return Err(SpliceError::runtime("object keys must be strings", span));
            };
            attrs
                .borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| SpliceError::runtime(format!("key {} not found", index.repr()), span))
        }
        other => Err(SpliceError::runtime(
            format!("'{}' object is not subscriptable", other.type_name()),
            span,
        )),
    }
}

fn set_item(base: &Value, index: &Value, value: Value, span: Span) -> EvalResult<()> {
    match base {
        Value::List(items) => {
            let len = items.borrow().len();
            let position = normalize_index(index, len, span)?;
            items.borrow_mut()[position] = value;
            Ok(())
        }
        Value::Object(attrs) => {
            let Value::Str(key) = index else {
                return Err(SpliceError::runtime("object keys must be strings", span));
            };
            attrs.borrow_mut().insert(key.clone(), value);
            Ok(())
        }
        other => Err(SpliceError::runtime(
            format!("'{}' object does not support item assignment", other.type_name()),
            span,
        )),
    }
}

fn undefined(name: &str, span: Span) -> SpliceError {
    SpliceError::runtime(format!("name '{name}' is not defined"), span)
}

fn missing_attribute(base: &Value, attr: &str, span: Span) -> SpliceError {
    SpliceError::runtime(
        format!("'{}' object has no attribute '{attr}'", base.type_name()),
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;
    use crate::macros::MemoryLocator;
    use crate::syntax::parse_str;

    fn run(text: &str) -> EvalResult<(Namespace, Vec<String>)> {
        let module = parse_str(text)?;
        let mut interp = Interpreter::new();
        let globals = interp.run(&module, &SourceContext::snippet(text))?;
        Ok((globals, interp.take_output()))
    }

    #[test]
    fn arithmetic_follows_floor_semantics() {
        let (globals, _) = run("a = -7 // 2;\nb = -7 % 2;\nc = 7 / 2;\nd = 2 + 3 * 4;").unwrap();
        assert_eq!(globals["a"], Value::Int(-4));
        assert_eq!(globals["b"], Value::Int(1));
        assert_eq!(globals["c"], Value::Int(3));
        assert_eq!(globals["d"], Value::Int(14));
    }

    #[test]
    fn functions_bind_defaults_and_keywords() {
        let text = "def f(a, b = 10, *rest, **kw) { return [a, b, rest, kw.x]; }\nr = f(1, x = 5);\ns = f(1, 2, 3, x = 0);";
        let (globals, _) = run(text).unwrap();
        assert_eq!(globals["r"].to_string(), "[1, 10, (), 5]");
        assert_eq!(globals["s"].to_string(), "[1, 2, (3,), 0]");
    }

    #[test]
    fn loops_and_flow() {
        let text = "i = 0;\nt = 0;\nwhile True { i += 1; if i % 2 == 0 { continue; } if i > 7 { break; } t += i; }";
        let (globals, _) = run(text).unwrap();
        assert_eq!(globals["t"], Value::Int(1 + 3 + 5 + 7));
    }

    #[test]
    fn print_is_captured() {
        let (_, output) = run("print('a', 1, [True, None]);").unwrap();
        assert_eq!(output, vec!["a 1 [True, None]".to_string()]);
    }

    #[test]
    fn runtime_errors_carry_position() {
        let err = run("x = 1;\ny = x + z;").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Runtime);
        assert_eq!(err.line(), Some(2));
        assert_eq!(err.to_string(), "<input>:2: name 'z' is not defined");
    }

    #[test]
    fn recursion_is_bounded() {
        let module = parse_str("def f(n) { return f(n + 1); }\nf(0);").unwrap();
        let mut interp = Interpreter::new().with_options(EvalOptions { max_depth: 16 });
        let err = interp.run(&module, &SourceContext::snippet("")).unwrap_err();
        assert!(err.message().contains("maximum recursion depth exceeded"));
    }

    #[test]
    fn default_import_path_uses_locator() {
        let locator = MemoryLocator::new().with_module("util", "def twice(x) { return x * 2; }");
        let module = parse_str("from util import twice;\nr = twice(21);").unwrap();
        let mut interp = Interpreter::new().with_locator(Rc::new(locator));
        let globals = interp.run(&module, &SourceContext::snippet("")).unwrap();
        assert_eq!(globals["r"], Value::Int(42));
        assert!(interp.loaded_module("util").is_some());
    }

    #[test]
    fn missing_modules_and_names_fail_to_import() {
        let locator = MemoryLocator::new().with_module("util", "x = 1;");
        let mut interp = Interpreter::new().with_locator(Rc::new(locator));

        let module = parse_str("from nowhere import x;").unwrap();
        let err = interp.run(&module, &SourceContext::snippet("")).unwrap_err();
        assert!(err.message().starts_with("cannot import nowhere"));

        let module = parse_str("from util import y;").unwrap();
        let err = interp.run(&module, &SourceContext::snippet("")).unwrap_err();
        assert_eq!(err.message(), "cannot import name y from util");
    }

    #[test]
    fn macro_stub_refuses_calls() {
        let locator = MemoryLocator::new().with_module("m", "@macro\ndef add(a, b) { a + b; }");
        let module = parse_str("from m.__macros__ import add;\nadd(1, 2);").unwrap();
        let mut interp = Interpreter::new().with_locator(Rc::new(locator));
        let err = interp.run(&module, &SourceContext::snippet("")).unwrap_err();
        assert_eq!(err.message(), "m.add() is a macro; it cannot be called directly");
    }

    struct Fixed;

    impl ImportHook for Fixed {
        fn load(
            &self,
            interp: &mut Interpreter,
            module: &str,
        ) -> Option<Result<Rc<ModuleValue>, SpliceError>> {
            (module == "fixed").then(|| {
                let body = parse_str("answer = 42;")?;
                interp.exec_module(&body, module, &SourceContext::from_file("fixed.spl", ""))
            })
        }
    }

    #[test]
    fn hook_is_consulted_first_and_can_be_removed() {
        let module = parse_str("from fixed import answer;").unwrap();

        let mut interp = Interpreter::new();
        assert!(interp.install_hook(Box::new(Fixed)).is_none());
        let globals = interp.run(&module, &SourceContext::snippet("")).unwrap();
        assert_eq!(globals["answer"], Value::Int(42));

        let mut interp = Interpreter::new();
        interp.install_hook(Box::new(Fixed));
        assert!(interp.remove_hook().is_some());
        assert!(interp.run(&module, &SourceContext::snippet("")).is_err());
    }
}
