//! Module locators.
//!
//! A locator turns a dotted module name into source text plus the path that
//! identifies it in diagnostics. The macro registry uses one to read macro
//! sources; the load pipeline uses the same one to find importable units.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use walkdir::WalkDir;

use crate::diagnostics::SourceContext;

/// Default source file extension.
pub const SOURCE_EXTENSION: &str = "spl";

/// File stem that makes a directory importable as a package.
pub const PACKAGE_INIT: &str = "__init__";

static MODULE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("module name pattern is a valid regex")
});

/// Returns true if `module` is a well-formed dotted name.
pub fn is_valid_module_name(module: &str) -> bool {
    MODULE_NAME.is_match(module)
}

// =============================
// Located sources
// =============================

/// Source text of a located module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub module: String,
    /// Identity used in diagnostics (a file path for file-system sources).
    pub path: String,
    pub text: String,
}

impl ModuleSource {
    pub fn to_context(&self) -> SourceContext {
        SourceContext::from_file(self.path.clone(), self.text.clone())
    }
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("no module named {0}")]
    NotFound(String),

    #[error("invalid module name {0:?}")]
    InvalidName(String),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Finds source units by dotted module name.
pub trait ModuleLocator: fmt::Debug {
    fn locate(&self, module: &str) -> Result<ModuleSource, LocateError>;

    /// Every module this locator can serve, sorted.
    fn discover_modules(&self) -> Result<Vec<String>, LocateError>;
}

fn check_name(module: &str) -> Result<(), LocateError> {
    if is_valid_module_name(module) {
        Ok(())
    } else {
        Err(LocateError::InvalidName(module.to_string()))
    }
}

// =============================
// File system
// =============================

/// Resolves `a.b.c` to `<root>/a/b/c.<ext>` or `<root>/a/b/c/__init__.<ext>`.
/// Roots are searched in order; the first hit wins.
#[derive(Debug, Clone)]
pub struct FileSystemLocator {
    pub roots: Vec<PathBuf>,
    pub extension: String,
}

impl Default for FileSystemLocator {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
            extension: SOURCE_EXTENSION.to_string(),
        }
    }
}

impl FileSystemLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
            ..Self::default()
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn candidates(&self, module: &str) -> Vec<PathBuf> {
        let relative: PathBuf = module.split('.').collect();
        self.roots
            .iter()
            .flat_map(|root| {
                let base = root.join(&relative);
                [
                    base.with_extension(&self.extension),
                    base.join(PACKAGE_INIT).with_extension(&self.extension),
                ]
            })
            .collect()
    }

    /// Dotted module name for a file under `root`, if it is a source unit.
    fn module_name(&self, root: &Path, path: &Path) -> Option<String> {
        if path.extension()? != self.extension.as_str() {
            return None;
        }
        let relative = path.strip_prefix(root).ok()?.with_extension("");
        let mut parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        if parts.last() == Some(&PACKAGE_INIT) {
            parts.pop();
        }
        let name = parts.join(".");
        is_valid_module_name(&name).then_some(name)
    }
}

impl ModuleLocator for FileSystemLocator {
    fn locate(&self, module: &str) -> Result<ModuleSource, LocateError> {
        check_name(module)?;
        let Some(path) = self.candidates(module).into_iter().find(|p| p.is_file()) else {
            return Err(LocateError::NotFound(module.to_string()));
        };
        let text = fs::read_to_string(&path).map_err(|source| LocateError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(module, path = %path.display(), "module located");
        Ok(ModuleSource {
            module: module.to_string(),
            path: path.display().to_string(),
            text,
        })
    }

    fn discover_modules(&self) -> Result<Vec<String>, LocateError> {
        let mut modules = Vec::new();
        for root in &self.roots {
            for entry in WalkDir::new(root) {
                let entry = entry.map_err(|err| LocateError::Io {
                    path: err.path().unwrap_or(root.as_path()).to_path_buf(),
                    source: io::Error::from(err),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(name) = self.module_name(root, entry.path()) {
                    modules.push(name);
                }
            }
        }
        modules.sort();
        modules.dedup();
        Ok(modules)
    }
}

// =============================
// In memory
// =============================

/// Module sources held in memory, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocator {
    modules: BTreeMap<String, String>,
}

impl MemoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(module, text);
        self
    }

    pub fn insert(&mut self, module: impl Into<String>, text: impl Into<String>) {
        self.modules.insert(module.into(), text.into());
    }
}

impl ModuleLocator for MemoryLocator {
    fn locate(&self, module: &str) -> Result<ModuleSource, LocateError> {
        check_name(module)?;
        let text = self
            .modules
            .get(module)
            .ok_or_else(|| LocateError::NotFound(module.to_string()))?;
        Ok(ModuleSource {
            module: module.to_string(),
            path: format!("{}.{SOURCE_EXTENSION}", module.replace('.', "/")),
            text: text.clone(),
        })
    }

    fn discover_modules(&self) -> Result<Vec<String>, LocateError> {
        Ok(self.modules.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names() {
        assert!(is_valid_module_name("demo.macros"));
        assert!(is_valid_module_name("_private"));
        assert!(!is_valid_module_name("demo..macros"));
        assert!(!is_valid_module_name("9lives"));
        assert!(!is_valid_module_name("../etc"));
    }

    #[test]
    fn memory_locator() {
        let locator = MemoryLocator::new().with_module("a.b", "x = 1;");
        let source = locator.locate("a.b").unwrap();
        assert_eq!(source.path, "a/b.spl");
        assert!(matches!(locator.locate("a.c"), Err(LocateError::NotFound(_))));
        assert!(matches!(locator.locate("a/b"), Err(LocateError::InvalidName(_))));
    }

    #[test]
    fn file_candidates_cover_packages() {
        let locator = FileSystemLocator::new("root");
        let candidates = locator.candidates("a.b");
        assert_eq!(candidates[0], PathBuf::from("root/a/b.spl"));
        assert_eq!(candidates[1], PathBuf::from("root/a/b/__init__.spl"));
    }

    #[test]
    fn package_init_names_the_directory() {
        let locator = FileSystemLocator::new("root");
        let name = locator.module_name(Path::new("root"), Path::new("root/demo/__init__.spl"));
        assert_eq!(name.as_deref(), Some("demo"));
        let other = locator.module_name(Path::new("root"), Path::new("root/demo/notes.txt"));
        assert_eq!(other, None);
    }
}
