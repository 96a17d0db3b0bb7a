//! Parser for expected-tree annotations.
//!
//! Grammar:
//!
//! ```text
//! tree  := '(' head ')'
//! head  := 'ERROR' span? child*
//!        | 'MISSING' (ident | string)? span?
//!        | ident span? child*
//! child := (ident ':')? tree
//! span  := '[' int ',' int ']' '-' '[' int ',' int ']'
//! ```
//!
//! `;` starts a comment running to the end of the line.

use std::fmt;

use crate::syntax::Point;
use crate::tree::{Child, Span, Tree, MAX_DEPTH};

/// An annotation that could not be parsed, with a 1-based position
/// relative to the start of the annotation text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for AnnotationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for AnnotationError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dash,
    Colon,
    Ident(String),
    Int(usize),
    Str(String),
    Eof,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    line: usize,
    column: usize,
}

fn lex(src: &str) -> Result<Vec<Spanned>, AnnotationError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    let mut line = 1usize;
    let mut column = 1usize;

    while pos < chars.len() {
        let c = chars[pos];
        let (start_line, start_col) = (line, column);

        if c == '\n' {
            pos += 1;
            line += 1;
            column = 1;
            continue;
        }
        if c.is_whitespace() {
            pos += 1;
            column += 1;
            continue;
        }
        if c == ';' {
            while pos < chars.len() && chars[pos] != '\n' {
                pos += 1;
            }
            continue;
        }

        let single = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            '-' => Some(Token::Dash),
            ':' => Some(Token::Colon),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(Spanned {
                token,
                line: start_line,
                column: start_col,
            });
            pos += 1;
            column += 1;
            continue;
        }

        if c == '"' {
            pos += 1;
            column += 1;
            let mut text = String::new();
            loop {
                let Some(&ch) = chars.get(pos) else {
                    return Err(AnnotationError {
                        line: start_line,
                        column: start_col,
                        message: "unterminated string".to_string(),
                    });
                };
                pos += 1;
                column += 1;
                match ch {
                    '"' => break,
                    '\\' => {
                        let escaped = chars.get(pos).copied().unwrap_or('\\');
                        pos += 1;
                        column += 1;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                    '\n' => {
                        return Err(AnnotationError {
                            line: start_line,
                            column: start_col,
                            message: "unterminated string".to_string(),
                        });
                    }
                    other => text.push(other),
                }
            }
            tokens.push(Spanned {
                token: Token::Str(text),
                line: start_line,
                column: start_col,
            });
            continue;
        }

        if c.is_ascii_alphanumeric() || c == '_' {
            let mut word = String::new();
            while pos < chars.len() && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_') {
                word.push(chars[pos]);
                pos += 1;
                column += 1;
            }
            let token = if word.chars().all(|ch| ch.is_ascii_digit()) {
                match word.parse::<usize>() {
                    Ok(n) => Token::Int(n),
                    Err(_) => {
                        return Err(AnnotationError {
                            line: start_line,
                            column: start_col,
                            message: format!("number out of range: {}", word),
                        })
                    }
                }
            } else {
                Token::Ident(word)
            };
            tokens.push(Spanned {
                token,
                line: start_line,
                column: start_col,
            });
            continue;
        }

        return Err(AnnotationError {
            line: start_line,
            column: start_col,
            message: format!("unexpected character '{}'", c),
        });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
        column,
    });
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned]) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].token
    }

    fn advance(&mut self) -> Token {
        let t = self.cur().token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> AnnotationError {
        let cur = self.cur();
        AnnotationError {
            line: cur.line,
            column: cur.column,
            message: msg.into(),
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), AnnotationError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {}, got {}", what, describe(self.peek()))))
        }
    }

    fn take_int(&mut self) -> Result<usize, AnnotationError> {
        match self.peek() {
            Token::Int(n) => {
                let n = *n;
                self.advance();
                Ok(n)
            }
            other => Err(self.err(format!("expected number, got {}", describe(other)))),
        }
    }

    fn parse_document(&mut self) -> Result<Tree, AnnotationError> {
        if *self.peek() == Token::Eof {
            return Err(self.err("empty expected tree"));
        }
        let tree = self.parse_tree()?;
        if *self.peek() != Token::Eof {
            return Err(self.err(format!(
                "unexpected {} after expected tree",
                describe(self.peek())
            )));
        }
        Ok(tree)
    }

    fn parse_tree(&mut self) -> Result<Tree, AnnotationError> {
        if self.depth == MAX_DEPTH {
            return Err(self.err(format!("expected tree nests deeper than {} levels", MAX_DEPTH)));
        }
        self.depth += 1;
        let tree = self.parse_node();
        self.depth -= 1;
        tree
    }

    fn parse_node(&mut self) -> Result<Tree, AnnotationError> {
        self.expect(Token::LParen, "'('")?;
        let kind = match self.peek() {
            Token::Ident(k) => k.clone(),
            other => return Err(self.err(format!("expected node kind, got {}", describe(other)))),
        };
        self.advance();

        let tree = match kind.as_str() {
            "MISSING" => {
                let missing_kind = match self.peek().clone() {
                    Token::Ident(k) | Token::Str(k) => {
                        self.advance();
                        Some(k)
                    }
                    _ => None,
                };
                let span = self.parse_span()?;
                Tree::Missing {
                    kind: missing_kind,
                    span,
                }
            }
            "ERROR" => {
                let span = self.parse_span()?;
                let children = self.parse_children()?;
                Tree::Error { span, children }
            }
            _ => {
                let span = self.parse_span()?;
                let children = self.parse_children()?;
                Tree::Node {
                    kind,
                    span,
                    children,
                }
            }
        };

        self.expect(Token::RParen, "')'")?;
        Ok(tree)
    }

    fn parse_children(&mut self) -> Result<Vec<Child>, AnnotationError> {
        let mut children = Vec::new();
        loop {
            match self.peek().clone() {
                Token::LParen => children.push(Child::new(self.parse_tree()?)),
                Token::Ident(field) if *self.peek_next() == Token::Colon => {
                    self.advance();
                    self.advance();
                    children.push(Child::field(field, self.parse_tree()?));
                }
                Token::RParen => return Ok(children),
                other => {
                    return Err(self.err(format!(
                        "expected child node or ')', got {}",
                        describe(&other)
                    )))
                }
            }
        }
    }

    fn parse_span(&mut self) -> Result<Option<Span>, AnnotationError> {
        if *self.peek() != Token::LBracket {
            return Ok(None);
        }
        let start = self.parse_point()?;
        self.expect(Token::Dash, "'-' between span points")?;
        let end = self.parse_point()?;
        Ok(Some(Span { start, end }))
    }

    fn parse_point(&mut self) -> Result<Point, AnnotationError> {
        self.expect(Token::LBracket, "'['")?;
        let row = self.take_int()?;
        self.expect(Token::Comma, "','")?;
        let column = self.take_int()?;
        self.expect(Token::RBracket, "']'")?;
        Ok(Point { row, column })
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::LBracket => "'['".to_string(),
        Token::RBracket => "']'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Dash => "'-'".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Ident(w) => format!("'{}'", w),
        Token::Int(n) => format!("number {}", n),
        Token::Str(s) => format!("string {:?}", s),
        Token::Eof => "end of input".to_string(),
    }
}

/// Parse one expected-tree annotation.
pub fn parse_annotation(src: &str) -> Result<Tree, AnnotationError> {
    let tokens = lex(src)?;
    Parser::new(&tokens).parse_document()
}
