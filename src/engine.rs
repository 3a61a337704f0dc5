//! The load pipeline.
//!
//! [`Engine`] ties the stages together: parse → expand → validate →
//! execute. Source-to-source users stop after expansion
//! ([`Engine::expand_source`], [`Engine::expand_to_string`]); everything
//! else runs the full pipeline.
//!
//! Modules imported at runtime go through the same pipeline via the
//! [`MacroImporter`] hook, which the engine installs on every interpreter it
//! creates.

use std::rc::Rc;

use serde::Serialize;

use crate::ast::{Module, Span};
use crate::diagnostics::{SourceContext, SpliceError};
use crate::macros::{
    Expander, ExpanderOptions, ExpansionStep, LocateError, MacroRegistry, ModuleLocator,
    ModuleSource,
};
use crate::runtime::{EvalOptions, ImportHook, Interpreter, ModuleValue, Namespace};
use crate::syntax::parse;
use crate::validation::check_roles;

// ============================================================================
// RESULTS
// ============================================================================

/// An expanded module together with the steps that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Expansion {
    pub module: Module,
    pub trace: Vec<ExpansionStep>,
}

impl Expansion {
    /// The trace as pretty-printed JSON.
    pub fn trace_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.trace)
    }
}

/// Globals and captured output of an executed module.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub globals: Namespace,
    pub output: Vec<String>,
}

/// Per-module result of [`Engine::expand_all`].
#[derive(Debug)]
pub struct ModuleExpansion {
    pub module: String,
    pub result: Result<Module, SpliceError>,
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Engine {
    registry: Rc<MacroRegistry>,
    expander_options: ExpanderOptions,
    eval_options: EvalOptions,
}

impl Engine {
    pub fn new(locator: Rc<dyn ModuleLocator>) -> Self {
        Self::with_registry(MacroRegistry::new(locator))
    }

    pub fn with_registry(registry: MacroRegistry) -> Self {
        Self {
            registry: Rc::new(registry),
            expander_options: ExpanderOptions::default(),
            eval_options: EvalOptions::default(),
        }
    }

    pub fn with_expander_options(mut self, options: ExpanderOptions) -> Self {
        self.expander_options = options;
        self
    }

    pub fn with_eval_options(mut self, options: EvalOptions) -> Self {
        self.eval_options = options;
        self
    }

    pub fn registry(&self) -> &MacroRegistry {
        &self.registry
    }

    /// Parses and expands `source`.
    pub fn expand_source(&self, source: &SourceContext) -> Result<Module, SpliceError> {
        self.expand_traced(source).map(|expansion| expansion.module)
    }

    /// Like [`Engine::expand_source`], keeping the expansion trace.
    pub fn expand_traced(&self, source: &SourceContext) -> Result<Expansion, SpliceError> {
        let module = parse(source).map_err(|err| err.with_file(&source.name))?;
        let mut expander = Expander::new(&self.registry).with_options(self.expander_options);
        let module = expander
            .expand_module(module)
            .map_err(|err| err.with_file(&source.name))?;
        tracing::debug!(
            file = %source.name,
            expansions = expander.expansions(),
            "source expanded"
        );
        Ok(Expansion {
            module,
            trace: expander.take_trace(),
        })
    }

    /// Expands `source` and renders the result back to source text.
    pub fn expand_to_string(&self, source: &SourceContext) -> Result<String, SpliceError> {
        Ok(self.expand_source(source)?.to_string())
    }

    /// An interpreter that loads imported modules through this engine.
    pub fn interpreter(&self) -> Interpreter {
        let mut interp = Interpreter::new()
            .with_options(self.eval_options)
            .with_locator(Rc::clone(self.registry.locator()));
        interp.install_hook(Box::new(self.importer()));
        interp
    }

    pub fn importer(&self) -> MacroImporter {
        MacroImporter::new(Rc::clone(&self.registry), self.expander_options)
    }

    /// Runs `source` as the entry module.
    pub fn run_source(&self, source: &SourceContext) -> Result<RunOutcome, SpliceError> {
        let module = self.compile(source)?;
        let mut interp = self.interpreter();
        let globals = interp.run(&module, source)?;
        Ok(RunOutcome {
            globals,
            output: interp.take_output(),
        })
    }

    /// Locates `name` and runs it under its own module name.
    pub fn load_module(&self, name: &str) -> Result<RunOutcome, SpliceError> {
        let source = self
            .registry
            .locator()
            .locate(name)
            .map_err(|err| locate_error(err, name))?;
        let context = source.to_context();
        let module = self.compile(&context)?;
        let mut interp = self.interpreter();
        let executed = interp.exec_module(&module, name, &context)?;
        let globals = executed.globals.borrow().clone();
        Ok(RunOutcome {
            globals,
            output: interp.take_output(),
        })
    }

    /// Expands every module the locator can discover.
    ///
    /// Discovery failures abort; failures of individual modules are
    /// reported in their entry.
    pub fn expand_all(&self) -> Result<Vec<ModuleExpansion>, SpliceError> {
        let locator = self.registry.locator();
        let modules = locator
            .discover_modules()
            .map_err(|err| locate_error(err, "<discovery>"))?;

        Ok(modules
            .into_iter()
            .map(|module| {
                let result = locator
                    .locate(&module)
                    .map_err(|err| locate_error(err, &module))
                    .and_then(|source| self.expand_source(&source.to_context()));
                ModuleExpansion { module, result }
            })
            .collect())
    }

    /// Parse → expand → validate.
    fn compile(&self, source: &SourceContext) -> Result<Module, SpliceError> {
        let module = self.expand_source(source)?;
        check_roles(&module).map_err(|err| err.with_file(&source.name))?;
        Ok(module)
    }
}

// ============================================================================
// IMPORT HOOK
// ============================================================================

/// Routes every module the interpreter imports through parse → expand →
/// validate → execute.
///
/// Modules the locator does not know are declined, so the interpreter's
/// default path reports them.
#[derive(Debug, Clone)]
pub struct MacroImporter {
    registry: Rc<MacroRegistry>,
    options: ExpanderOptions,
}

impl MacroImporter {
    pub fn new(registry: Rc<MacroRegistry>, options: ExpanderOptions) -> Self {
        Self { registry, options }
    }

    fn compile(&self, source: &ModuleSource) -> Result<Module, SpliceError> {
        let context = source.to_context();
        let module = parse(&context)?;
        let module = Expander::new(&self.registry)
            .with_options(self.options)
            .expand_module(module)?;
        check_roles(&module)?;
        Ok(module)
    }
}

impl ImportHook for MacroImporter {
    fn load(
        &self,
        interp: &mut Interpreter,
        module: &str,
    ) -> Option<Result<Rc<ModuleValue>, SpliceError>> {
        let source = match self.registry.locator().locate(module) {
            Ok(source) => source,
            Err(LocateError::NotFound(_)) => return None,
            Err(err) => return Some(Err(locate_error(err, module))),
        };
        tracing::debug!(module, path = %source.path, "loading module through macro importer");

        let loaded = self
            .compile(&source)
            .map_err(|err| err.with_file(&source.path))
            .and_then(|compiled| interp.exec_module(&compiled, module, &source.to_context()));
        Some(loaded)
    }
}

fn locate_error(err: LocateError, module: &str) -> SpliceError {
    match err {
        LocateError::Io { path, source } => SpliceError::io(path.display().to_string(), source),
        other => SpliceError::runtime(
            format!("cannot load {module}: {other}"),
            Span::default(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;
    use crate::macros::MemoryLocator;
    use crate::runtime::Value;

    const MACROS: &str = "@macro\ndef add(i, j, k) { i + j + k; }\n";

    fn engine() -> Engine {
        Engine::new(Rc::new(
            MemoryLocator::new()
                .with_module("mac", MACROS)
                .with_module("user", "from mac.__macros__ import add;\nk = add(1, 2, 3);")
                .with_module("broken", "from mac.__macros__ import add;\nk = add(1);"),
        ))
    }

    #[test]
    fn expand_to_string_renders_source() {
        let source = SourceContext::snippet("from mac.__macros__ import add;\nx = add(a, b, c);");
        let text = engine().expand_to_string(&source).unwrap();
        assert_eq!(text.trim(), "x = a + b + c;");
    }

    #[test]
    fn run_source_executes_expanded_code() {
        let outcome = engine()
            .run_source(&SourceContext::snippet("from user import k;\nprint(k);"))
            .unwrap();
        assert_eq!(outcome.globals["k"], Value::Int(6));
        assert_eq!(outcome.output, vec!["6".to_string()]);
    }

    #[test]
    fn hook_failures_name_the_module_and_file() {
        let err = engine()
            .run_source(&SourceContext::from_file("main.spl", "from broken import k;"))
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Runtime);
        assert_eq!(err.file(), Some("main.spl"));
        assert!(err.message().starts_with("cannot import broken: broken.spl:2: "));
        assert!(err.message().contains("invalid number of arguments"));
    }

    #[test]
    fn expand_all_reports_each_module() {
        let results = engine().expand_all().unwrap();
        let names: Vec<_> = results.iter().map(|r| r.module.as_str()).collect();
        assert_eq!(names, ["broken", "mac", "user"]);
        assert!(results[0].result.is_err());
        assert!(results[1].result.is_ok());
        assert!(results[2].result.is_ok());
    }

    #[test]
    fn load_module_runs_under_its_name() {
        let outcome = engine().load_module("user").unwrap();
        assert_eq!(outcome.globals["__name__"], Value::str("user"));
        assert_eq!(outcome.globals["k"], Value::Int(6));
    }
}
