//! Core library for jlite, a small class-based language with C-family
//! syntax. Source text flows through [`scan`], [`parse`] and [`run`]:
//! tokens, a declaration tree, then tree-walking evaluation starting at
//! `Main.main`.

pub mod ast;
pub mod builtins;
pub mod class;
pub mod diagnostics;
pub mod environment;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod printer;
pub mod runtime;
mod stack;
pub mod value;

pub use ast::Declaration;
pub use diagnostics::{Diagnostic, DiagnosticKind, JliteError, Result, SourceSpan};
pub use lexer::{Token, TokenKind, Tokens};
pub use parser::Parsed;
pub use runtime::{ExecutionContext, Interpreter, DEFAULT_MAX_CALL_DEPTH};
pub use value::Value;

/// Tokenizes `source`. The token list always ends with `Eof`; problems are
/// collected in [`Tokens::diagnostics`] rather than stopping the scan.
pub fn scan(source: &str) -> Tokens {
    lexer::Lexer::new(source).tokenize()
}

pub fn parse(tokens: Vec<Token>) -> Parsed {
    parser::parse(tokens)
}

/// Runs already-parsed declarations with the default context, printing to
/// stdout.
pub fn run(declarations: &[Declaration]) -> Result<()> {
    Interpreter::new(ExecutionContext::default()).run(declarations)
}

pub fn run_source(source: &str, context: ExecutionContext) -> Result<()> {
    Interpreter::new(context).run_source(source)
}
