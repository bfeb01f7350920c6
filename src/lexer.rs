use std::str::CharIndices;

use tracing::debug;

use crate::{
    ast::Literal,
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Class,
    If,
    Else,
    While,
    For,
    Return,
    New,
    This,
    Int,
    Double,
    Boolean,
    Void,
    True,
    False,
    Null,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Class => "class",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::For => "for",
            Keyword::Return => "return",
            Keyword::New => "new",
            Keyword::This => "this",
            Keyword::Int => "int",
            Keyword::Double => "double",
            Keyword::Boolean => "boolean",
            Keyword::Void => "void",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Null => "null",
        }
    }

    /// Keywords that name a primitive type in a declaration.
    pub fn is_type(self) -> bool {
        matches!(
            self,
            Keyword::Int | Keyword::Double | Keyword::Boolean | Keyword::Void
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semicolon,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    DoubleAmpersand,
    DoublePipe,
    Bang,
    BangEqual,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub span: SourceSpan,
}

impl Token {
    pub fn line(&self) -> usize {
        self.span.line
    }
}

/// Result of a scan: the token stream (always EOF-terminated) and whatever
/// the lexer complained about along the way.
#[derive(Debug, Clone, Default)]
pub struct Tokens {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Tokens {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn kinds(&self) -> Vec<TokenKind> {
        self.tokens.iter().map(|token| token.kind).collect()
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: CharIndices<'a>,
    current: usize,
    line: usize,
    peeked: Option<(usize, char)>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices(),
            current: 0,
            line: 1,
            peeked: None,
            diagnostics: Vec::new(),
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = match self.peeked.take() {
            Some(pair) => Some(pair),
            None => self.chars.next(),
        };
        let (idx, ch) = next?;
        self.current = idx + ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some((idx, ch))
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn peek_char(&mut self) -> Option<char> {
        self.peek().map(|(_, ch)| ch)
    }

    /// The character after the peeked one.
    fn peek_second(&mut self) -> Option<char> {
        self.peek()?;
        self.chars.clone().next().map(|(_, ch)| ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn report(&mut self, message: impl Into<String>, span: SourceSpan) {
        self.diagnostics
            .push(Diagnostic::new(DiagnosticKind::Lexer, message).with_span(span));
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match (self.peek_char(), self.peek_second()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.peek_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    self.bump();
                    self.bump();
                    // Block comments do not nest; an unterminated one runs to the end.
                    while let Some((_, ch)) = self.bump() {
                        if ch == '*' && self.match_next('/') {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn identifier_or_keyword(&mut self, start: usize, line: usize) -> Token {
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let lexeme = &self.source[start..self.current];
        let (kind, literal) = match keyword_for(lexeme) {
            Some(Keyword::True) => (TokenKind::Keyword(Keyword::True), Some(Literal::Bool(true))),
            Some(Keyword::False) => (
                TokenKind::Keyword(Keyword::False),
                Some(Literal::Bool(false)),
            ),
            Some(Keyword::Null) => (TokenKind::Keyword(Keyword::Null), Some(Literal::Null)),
            Some(keyword) => (TokenKind::Keyword(keyword), None),
            None => (TokenKind::Identifier, None),
        };
        self.token(kind, start, line, literal)
    }

    fn number_literal(&mut self, start: usize, line: usize) -> Option<Token> {
        while matches!(self.peek_char(), Some('0'..='9')) {
            self.bump();
        }
        let is_double =
            self.peek_char() == Some('.') && matches!(self.peek_second(), Some('0'..='9'));
        if is_double {
            self.bump();
            while matches!(self.peek_char(), Some('0'..='9')) {
                self.bump();
            }
        }
        let lexeme = &self.source[start..self.current];
        let literal = if is_double {
            lexeme.parse::<f64>().ok().map(Literal::Double)
        } else {
            lexeme.parse::<i64>().ok().map(Literal::Int)
        };
        match literal {
            Some(literal) => Some(self.token(TokenKind::Number, start, line, Some(literal))),
            None => {
                let message = format!("integer literal `{lexeme}` does not fit in 64 bits");
                self.report(message, SourceSpan::new(start, self.current, line));
                None
            }
        }
    }

    fn string_literal(&mut self, start: usize, line: usize) -> Option<Token> {
        // No escape sequences: everything up to the next quote is content.
        while let Some((idx, ch)) = self.bump() {
            if ch == '"' {
                let value = self.source[start + 1..idx].to_string();
                return Some(self.token(TokenKind::String, start, line, Some(Literal::String(value))));
            }
        }
        let diagnostic = Diagnostic::new(DiagnosticKind::Lexer, "unterminated string literal")
            .with_span(SourceSpan::new(start, self.current, self.line))
            .with_note(format!("string starts on line {line}"));
        self.diagnostics.push(diagnostic);
        None
    }

    fn token(
        &self,
        kind: TokenKind,
        start: usize,
        line: usize,
        literal: Option<Literal>,
    ) -> Token {
        Token {
            kind,
            lexeme: self.source[start..self.current].to_string(),
            literal,
            span: SourceSpan::new(start, self.current, line),
        }
    }

    fn simple_token(&self, start: usize, line: usize, kind: TokenKind) -> Token {
        self.token(kind, start, line, None)
    }

    fn either(
        &mut self,
        expected: char,
        start: usize,
        line: usize,
        matched: TokenKind,
        otherwise: TokenKind,
    ) -> Token {
        let kind = if self.match_next(expected) {
            matched
        } else {
            otherwise
        };
        self.simple_token(start, line, kind)
    }

    pub fn tokenize(mut self) -> Tokens {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let line = self.line;
            let (start, ch) = match self.bump() {
                Some(pair) => pair,
                None => {
                    tokens.push(Token {
                        kind: TokenKind::Eof,
                        lexeme: String::new(),
                        literal: None,
                        span: SourceSpan::new(self.current, self.current, self.line),
                    });
                    break;
                }
            };

            let token = match ch {
                'a'..='z' | 'A'..='Z' | '_' => Some(self.identifier_or_keyword(start, line)),
                '0'..='9' => self.number_literal(start, line),
                '"' => self.string_literal(start, line),
                '(' => Some(self.simple_token(start, line, TokenKind::LParen)),
                ')' => Some(self.simple_token(start, line, TokenKind::RParen)),
                '{' => Some(self.simple_token(start, line, TokenKind::LBrace)),
                '}' => Some(self.simple_token(start, line, TokenKind::RBrace)),
                ',' => Some(self.simple_token(start, line, TokenKind::Comma)),
                '.' => Some(self.simple_token(start, line, TokenKind::Dot)),
                ';' => Some(self.simple_token(start, line, TokenKind::Semicolon)),
                '+' => Some(self.simple_token(start, line, TokenKind::Plus)),
                '-' => Some(self.simple_token(start, line, TokenKind::Minus)),
                '*' => Some(self.simple_token(start, line, TokenKind::Star)),
                '/' => Some(self.simple_token(start, line, TokenKind::Slash)),
                '%' => Some(self.simple_token(start, line, TokenKind::Percent)),
                '=' => Some(self.either('=', start, line, TokenKind::EqualEqual, TokenKind::Assign)),
                '!' => Some(self.either('=', start, line, TokenKind::BangEqual, TokenKind::Bang)),
                '<' => Some(self.either('=', start, line, TokenKind::LessEqual, TokenKind::Less)),
                '>' => Some(self.either(
                    '=',
                    start,
                    line,
                    TokenKind::GreaterEqual,
                    TokenKind::Greater,
                )),
                '&' if self.match_next('&') => {
                    Some(self.simple_token(start, line, TokenKind::DoubleAmpersand))
                }
                '|' if self.match_next('|') => {
                    Some(self.simple_token(start, line, TokenKind::DoublePipe))
                }
                other => {
                    self.report(
                        format!("unexpected character `{other}`"),
                        SourceSpan::new(start, self.current, line),
                    );
                    None
                }
            };
            tokens.extend(token);
        }
        debug!(
            tokens = tokens.len(),
            errors = self.diagnostics.len(),
            "scanned source"
        );
        Tokens {
            tokens,
            diagnostics: self.diagnostics,
        }
    }
}

fn keyword_for(ident: &str) -> Option<Keyword> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "class" => Kw::Class,
        "if" => Kw::If,
        "else" => Kw::Else,
        "while" => Kw::While,
        "for" => Kw::For,
        "return" => Kw::Return,
        "new" => Kw::New,
        "this" => Kw::This,
        "int" => Kw::Int,
        "double" => Kw::Double,
        "boolean" => Kw::Boolean,
        "void" => Kw::Void,
        "true" => Kw::True,
        "false" => Kw::False,
        "null" => Kw::Null,
        _ => return None,
    };
    Some(keyword)
}
