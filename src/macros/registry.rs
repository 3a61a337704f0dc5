//! Macro registry: resolution of imported macros.
//!
//! Given `from pkg.__macros__ import a, b as c;`, the registry locates
//! `pkg`, parses it, extracts its macros and returns the requested subset
//! keyed by the name each one is bound to in the importing unit.
//!
//! # Caching
//!
//! By default every resolution re-reads and re-parses the macro module, so
//! edits are always picked up. [`MacroRegistry::memoized`] keeps one
//! extracted table per module name for the lifetime of the registry.
//!
//! # Thread Safety
//! Not thread-safe; the memo table uses a `RefCell`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{ImportName, Span};
use crate::diagnostics::SpliceError;
use crate::macros::error::{module_not_found_error, resolution_error};
use crate::macros::{extract_macros, MacroTable, ModuleLocator};
use crate::syntax::parse;

#[derive(Debug)]
pub struct MacroRegistry {
    locator: Rc<dyn ModuleLocator>,
    memo: Option<RefCell<HashMap<String, MacroTable>>>,
}

impl MacroRegistry {
    /// Registry that re-reads macro modules on every resolution.
    pub fn new(locator: Rc<dyn ModuleLocator>) -> Self {
        Self {
            locator,
            memo: None,
        }
    }

    /// Registry that extracts each macro module at most once.
    pub fn memoized(locator: Rc<dyn ModuleLocator>) -> Self {
        Self {
            locator,
            memo: Some(RefCell::new(HashMap::new())),
        }
    }

    pub fn locator(&self) -> &Rc<dyn ModuleLocator> {
        &self.locator
    }

    /// Resolves an import of `names` from macro module `module`.
    ///
    /// A wildcard takes every macro the module defines and never fails for
    /// individual names. A named request fails with a resolution error if
    /// the module does not define it.
    pub fn resolve(
        &self,
        module: &str,
        names: &[ImportName],
        span: Span,
    ) -> Result<MacroTable, SpliceError> {
        let available = self.table(module, span)?;

        if names.iter().any(ImportName::is_wildcard) {
            tracing::debug!(module, count = available.len(), wildcard = true, "macros imported");
            return Ok(available);
        }

        let mut selected = MacroTable::new();
        for import in names {
            let definition = available
                .get(&import.name)
                .ok_or_else(|| resolution_error(&import.name, module, span))?;
            selected.insert(import.bound_name().to_string(), Rc::clone(definition));
        }
        tracing::debug!(module, count = selected.len(), wildcard = false, "macros imported");
        Ok(selected)
    }

    /// Every macro defined in `module`, keyed by its defined name.
    pub fn table(&self, module: &str, span: Span) -> Result<MacroTable, SpliceError> {
        if let Some(memo) = &self.memo {
            if let Some(table) = memo.borrow().get(module) {
                return Ok(table.clone());
            }
        }

        let table = self.extract(module, span)?;
        if let Some(memo) = &self.memo {
            memo.borrow_mut().insert(module.to_string(), table.clone());
        }
        Ok(table)
    }

    fn extract(&self, module: &str, span: Span) -> Result<MacroTable, SpliceError> {
        let source = self
            .locator
            .locate(module)
            .map_err(|err| module_not_found_error(module, err, span))?;
        let parsed = parse(&source.to_context()).map_err(|e| e.with_file(&source.path))?;
        extract_macros(&parsed).map_err(|e| e.with_file(&source.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;
    use crate::macros::MemoryLocator;

    fn registry() -> MacroRegistry {
        let locator = MemoryLocator::new().with_module(
            "demo",
            "@macro\ndef add(a, b) { a + b; }\n@macro\ndef neg(a) { -a; }\ndef plain() { pass; }",
        );
        MacroRegistry::new(Rc::new(locator))
    }

    #[test]
    fn aliases_rename_entries() {
        let names = [ImportName::new("add", Some("plus".into()))];
        let table = registry().resolve("demo", &names, Span::default()).unwrap();
        assert!(table.contains_key("plus"));
        assert!(!table.contains_key("add"));
        assert_eq!(table["plus"].name(), "add");
    }

    #[test]
    fn wildcard_takes_everything() {
        let names = [ImportName::new(ImportName::WILDCARD, None)];
        let table = registry().resolve("demo", &names, Span::default()).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn unknown_names_and_modules_fail() {
        let names = [ImportName::new("plain", None)];
        let err = registry().resolve("demo", &names, Span::default()).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::MacroResolution);
        assert!(err.message().contains("macro plain not found in module demo"));

        let err = registry().resolve("missing", &names, Span::default()).unwrap_err();
        assert!(err.message().starts_with("macro module missing not found"));
    }

    #[test]
    fn memoized_registry_reuses_tables() {
        let registry = MacroRegistry::memoized(Rc::new(
            MemoryLocator::new().with_module("demo", "@macro\ndef id(x) { x; }"),
        ));
        let first = registry.table("demo", Span::default()).unwrap();
        let second = registry.table("demo", Span::default()).unwrap();
        assert!(Rc::ptr_eq(&first["id"], &second["id"]));
    }
}
