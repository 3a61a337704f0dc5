//! Splice error handling.
//!
//! One error type, [`SpliceError`], covers every stage of the pipeline. The
//! three macro variants form the expansion taxonomy:
//!
//! - `MacroDefinition`: an annotated definition has an unsupported signature.
//! - `MacroResolution`: an imported macro module or name cannot be found.
//! - `MacroCall`: a call site misuses a macro (arity, argument shape,
//!   body/kind mismatch, runaway recursion).
//!
//! `Parse`, `Validation`, `Runtime` and `Io` belong to the collaborators
//! around the engine.
//!
//! Every located variant renders as `<line>: <message>`, or
//! `<file>:<line>: <message>` once a load boundary has attached the file
//! identity with [`SpliceError::with_file`]. Variants also carry a miette
//! label so a caller holding the source text can render a full report with
//! [`SpliceError::into_report`].

use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;

use crate::ast::Span;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// Source text paired with the identity it was loaded under.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    /// Create a source context from real file content
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Anonymous source, for snippets that never came from a file.
    pub fn snippet(content: impl Into<String>) -> Self {
        Self::from_file("<input>", content)
    }

    /// Convert to NamedSource for use with miette error reporting
    pub fn to_named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.name.clone(), self.content.clone())
    }
}

// ============================================================================
// ERROR TYPE
// ============================================================================

/// Type-safe error classification, for callers and tests that branch on
/// the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Parse,
    MacroDefinition,
    MacroResolution,
    MacroCall,
    Validation,
    Runtime,
    Io,
}

/// Unified error type for all splice failure modes.
#[derive(Debug, Error, Diagnostic)]
pub enum SpliceError {
    #[error("{}", located(.file, .line, .message))]
    #[diagnostic(code(splice::parse))]
    Parse {
        message: String,
        line: usize,
        #[label("syntax error")]
        span: SourceSpan,
        file: Option<String>,
    },

    #[error("{}", located(.file, .line, .message))]
    #[diagnostic(
        code(splice::macro_definition),
        help("macro parameters must be plain, required and positional")
    )]
    MacroDefinition {
        message: String,
        line: usize,
        #[label("unsupported macro definition")]
        span: SourceSpan,
        file: Option<String>,
    },

    #[error("{}", located(.file, .line, .message))]
    #[diagnostic(code(splice::macro_resolution))]
    MacroResolution {
        message: String,
        line: usize,
        #[label("imported here")]
        span: SourceSpan,
        file: Option<String>,
    },

    #[error("{}", located(.file, .line, .message))]
    #[diagnostic(code(splice::macro_call))]
    MacroCall {
        message: String,
        line: usize,
        #[label("invalid macro call")]
        span: SourceSpan,
        file: Option<String>,
    },

    #[error("{}", located(.file, .line, .message))]
    #[diagnostic(code(splice::validation))]
    Validation {
        message: String,
        line: usize,
        #[label("inconsistent role")]
        span: SourceSpan,
        file: Option<String>,
    },

    #[error("{}", located(.file, .line, .message))]
    #[diagnostic(code(splice::runtime))]
    Runtime {
        message: String,
        line: usize,
        #[label("raised here")]
        span: SourceSpan,
        file: Option<String>,
    },

    #[error("cannot read {path}: {source}")]
    #[diagnostic(code(splice::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SpliceError {
    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        SpliceError::Parse {
            message: message.into(),
            line: span.line,
            span: to_source_span(span),
            file: None,
        }
    }

    pub fn macro_definition(message: impl Into<String>, span: Span) -> Self {
        SpliceError::MacroDefinition {
            message: message.into(),
            line: span.line,
            span: to_source_span(span),
            file: None,
        }
    }

    pub fn macro_resolution(message: impl Into<String>, span: Span) -> Self {
        SpliceError::MacroResolution {
            message: message.into(),
            line: span.line,
            span: to_source_span(span),
            file: None,
        }
    }

    pub fn macro_call(message: impl Into<String>, span: Span) -> Self {
        SpliceError::MacroCall {
            message: message.into(),
            line: span.line,
            span: to_source_span(span),
            file: None,
        }
    }

    pub fn validation(message: impl Into<String>, span: Span) -> Self {
        SpliceError::Validation {
            message: message.into(),
            line: span.line,
            span: to_source_span(span),
            file: None,
        }
    }

    pub fn runtime(message: impl Into<String>, span: Span) -> Self {
        SpliceError::Runtime {
            message: message.into(),
            line: span.line,
            span: to_source_span(span),
            file: None,
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        SpliceError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            SpliceError::Parse { .. } => ErrorType::Parse,
            SpliceError::MacroDefinition { .. } => ErrorType::MacroDefinition,
            SpliceError::MacroResolution { .. } => ErrorType::MacroResolution,
            SpliceError::MacroCall { .. } => ErrorType::MacroCall,
            SpliceError::Validation { .. } => ErrorType::Validation,
            SpliceError::Runtime { .. } => ErrorType::Runtime,
            SpliceError::Io { .. } => ErrorType::Io,
        }
    }

    /// True for the three macro-expansion failures.
    pub fn is_macro_error(&self) -> bool {
        matches!(
            self.error_type(),
            ErrorType::MacroDefinition | ErrorType::MacroResolution | ErrorType::MacroCall
        )
    }

    /// The bare message, without location prefix.
    pub fn message(&self) -> String {
        match self {
            SpliceError::Parse { message, .. }
            | SpliceError::MacroDefinition { message, .. }
            | SpliceError::MacroResolution { message, .. }
            | SpliceError::MacroCall { message, .. }
            | SpliceError::Validation { message, .. }
            | SpliceError::Runtime { message, .. } => message.clone(),
            SpliceError::Io { source, .. } => source.to_string(),
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            SpliceError::Parse { line, .. }
            | SpliceError::MacroDefinition { line, .. }
            | SpliceError::MacroResolution { line, .. }
            | SpliceError::MacroCall { line, .. }
            | SpliceError::Validation { line, .. }
            | SpliceError::Runtime { line, .. } => Some(*line),
            SpliceError::Io { .. } => None,
        }
    }

    pub fn file(&self) -> Option<&str> {
        match self {
            SpliceError::Parse { file, .. }
            | SpliceError::MacroDefinition { file, .. }
            | SpliceError::MacroResolution { file, .. }
            | SpliceError::MacroCall { file, .. }
            | SpliceError::Validation { file, .. }
            | SpliceError::Runtime { file, .. } => file.as_deref(),
            SpliceError::Io { path, .. } => Some(path),
        }
    }

    /// Attaches the identity of the file the error was raised in.
    ///
    /// The innermost load boundary wins: an error that already names a file
    /// keeps it when it crosses an outer boundary.
    pub fn with_file(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            SpliceError::Parse { file, .. }
            | SpliceError::MacroDefinition { file, .. }
            | SpliceError::MacroResolution { file, .. }
            | SpliceError::MacroCall { file, .. }
            | SpliceError::Validation { file, .. }
            | SpliceError::Runtime { file, .. } => {
                if file.is_none() {
                    *file = Some(name.into());
                }
            }
            SpliceError::Io { .. } => {}
        }
        self
    }

    /// Wraps the error in a miette report that can render `source`.
    pub fn into_report(self, source: &SourceContext) -> Report {
        Report::new(self).with_source_code(source.to_named_source())
    }
}

pub fn to_source_span(span: Span) -> SourceSpan {
    SourceSpan::from(span.start..span.end)
}

fn located(file: &Option<String>, line: &usize, message: &str) -> String {
    match file {
        Some(file) => format!("{file}:{line}: {message}"),
        None => format!("{line}: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_errors_carry_the_line() {
        let err = SpliceError::macro_call("invalid number of arguments", Span::new(4, 9, 3));
        assert_eq!(err.to_string(), "3: invalid number of arguments");
        assert_eq!(err.error_type(), ErrorType::MacroCall);
    }

    #[test]
    fn innermost_file_wins() {
        let err = SpliceError::macro_call("macro requires a body", Span::new(0, 1, 7))
            .with_file("inner.spl")
            .with_file("outer.spl");
        assert_eq!(err.to_string(), "inner.spl:7: macro requires a body");
    }

    #[test]
    fn report_renders_with_source() {
        let source = SourceContext::from_file("demo.spl", "x = add(1);\n");
        let err = SpliceError::macro_call("invalid number of arguments", Span::new(4, 10, 1));
        let report = err.into_report(&source);
        assert!(report.to_string().contains("invalid number of arguments"));
    }
}
