//! Shared helpers for the integration tests.
//!
//! Script cases live in `tests/cases/*.spl`. A case states its expectation
//! in leading comment lines:
//!
//! ```text
//! # expect: 6
//! # expect: done
//! ```
//!
//! one line per printed output line, or `# error: <substring>` for a case
//! that must fail. Cases run through an [`Engine`] whose locator is rooted
//! at `tests/fixtures`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::rc::Rc;

use splice::{Engine, FileSystemLocator, MemoryLocator, RunOutcome, SourceContext, SpliceError};
use walkdir::WalkDir;

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

pub fn cases_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("cases")
}

pub fn fixture_engine() -> Engine {
    Engine::new(Rc::new(FileSystemLocator::new(fixtures_dir())))
}

/// Engine over in-memory modules.
pub fn memory_engine(modules: &[(&str, &str)]) -> Engine {
    let locator = modules
        .iter()
        .fold(MemoryLocator::new(), |locator, (name, text)| locator.with_module(*name, *text));
    Engine::new(Rc::new(locator))
}

pub fn run(engine: &Engine, text: &str) -> Result<RunOutcome, SpliceError> {
    engine.run_source(&SourceContext::snippet(text))
}

pub fn expand(engine: &Engine, text: &str) -> Result<String, SpliceError> {
    engine.expand_to_string(&SourceContext::snippet(text))
}

/// What a script case must produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    Output(Vec<String>),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ScriptCase {
    pub name: String,
    pub path: PathBuf,
    pub source: String,
    pub expectation: Expectation,
}

/// Discovers every script case under `dir`, sorted by path.
pub fn load_cases(dir: &Path) -> Vec<ScriptCase> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "spl"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let source = std::fs::read_to_string(&path)
                .unwrap_or_else(|err| panic!("cannot read {}: {err}", path.display()));
            let expectation = parse_expectation(&source)
                .unwrap_or_else(|| panic!("{} states no expectation", path.display()));
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            ScriptCase {
                name,
                path,
                source,
                expectation,
            }
        })
        .collect()
}

fn parse_expectation(source: &str) -> Option<Expectation> {
    let mut output = Vec::new();
    for line in source.lines().map(str::trim).take_while(|line| line.starts_with('#')) {
        if let Some(message) = line.strip_prefix("# error:") {
            return Some(Expectation::Error(message.trim().to_string()));
        }
        if let Some(expected) = line.strip_prefix("# expect:") {
            output.push(expected.trim().to_string());
        }
    }
    (!output.is_empty()).then_some(Expectation::Output(output))
}

/// Runs `case` and returns a description of the mismatch, if any.
pub fn check_case(engine: &Engine, case: &ScriptCase) -> Option<String> {
    let source = SourceContext::from_file(case.path.display().to_string(), case.source.clone());
    match (engine.run_source(&source), &case.expectation) {
        (Ok(outcome), Expectation::Output(expected)) if &outcome.output == expected => None,
        (Ok(outcome), expected) => Some(format!(
            "{}: expected {expected:?}, got output {:?}",
            case.name, outcome.output
        )),
        (Err(err), Expectation::Error(needle)) if err.to_string().contains(needle.as_str()) => None,
        (Err(err), expected) => Some(format!("{}: expected {expected:?}, got error {err}", case.name)),
    }
}
