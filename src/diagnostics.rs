use std::fmt;

use thiserror::Error;

/// Location of a token or node: a byte span plus the 1-based line it starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize, line: usize) -> Self {
        Self { start, end, line }
    }

    /// Span covering `self` through `other`, keeping the starting line.
    pub fn to(self, other: SourceSpan) -> Self {
        Self {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
        }
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    /// Missing entry class or entry method.
    Startup,
    UndefinedName,
    Type,
    Arity,
    Arithmetic,
    /// Call depth exceeded. Not part of the language-level taxonomy.
    StackExhaustion,
}

impl DiagnosticKind {
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Lexer => "lex error",
            DiagnosticKind::Parser => "parse error",
            DiagnosticKind::Startup => "startup error",
            DiagnosticKind::UndefinedName => "undefined name",
            DiagnosticKind::Type => "type error",
            DiagnosticKind::Arity => "arity error",
            DiagnosticKind::Arithmetic => "arithmetic error",
            DiagnosticKind::StackExhaustion => "stack exhaustion",
        }
    }

    pub fn is_compile_time(self) -> bool {
        matches!(self, DiagnosticKind::Lexer | DiagnosticKind::Parser)
    }

    pub fn is_language_error(self) -> bool {
        !matches!(self, DiagnosticKind::StackExhaustion)
    }
}

/// Rich diagnostic information surfaced to end users.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn line(&self) -> Option<usize> {
        self.span.map(|span| span.line)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)?;
        if let Some(span) = self.span {
            write!(f, " (line {})", span.line)?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the jlite toolchain.
#[derive(Debug, Error)]
pub enum JliteError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("program rejected with {} diagnostic(s)", .0.len())]
    Rejected(Vec<Diagnostic>),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JliteError {
    /// The diagnostic that stopped a run, if the failure came from the program.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            JliteError::Diagnostic(diag) => Some(diag),
            JliteError::Rejected(diags) => diags.first(),
            JliteError::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, JliteError>;

pub(crate) fn error(kind: DiagnosticKind, message: impl Into<String>, span: SourceSpan) -> JliteError {
    JliteError::from(Diagnostic::new(kind, message).with_span(span))
}
