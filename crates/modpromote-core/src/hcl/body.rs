//! Structural HCL parser: blocks and attributes with raw expression text.
//!
//! Expressions are captured verbatim (comments stripped, surrounding
//! whitespace trimmed) and interpreted later by the literal parser, so
//! this layer accepts any expression syntax the module language allows.

use crate::hcl::error::HclError;

/// `name = <expr>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub expr: String,
    pub line: usize,
}

/// `kind "label" ... { body }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: String,
    pub labels: Vec<String>,
    pub body: Body,
    pub line: usize,
}

impl Block {
    /// First label, or empty.
    pub fn label(&self) -> &str {
        self.labels.first().map(|l| l.as_str()).unwrap_or("")
    }
}

/// Attributes and blocks, each in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<Block>,
}

impl Body {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn blocks_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }
}

/// Parse a whole file into its top-level body.
pub fn parse_body(src: &str) -> Result<Body, HclError> {
    Parser::new(src).body(false)
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn line(&self) -> usize {
        1 + self.chars[..self.pos.min(self.chars.len())]
            .iter()
            .filter(|c| **c == '\n')
            .count()
    }

    fn error(&self, message: impl Into<String>) -> HclError {
        HclError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn body(&mut self, nested: bool) -> Result<Body, HclError> {
        let mut body = Body::default();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None if nested => return Err(self.error("unexpected end of input, expected '}'")),
                None => return Ok(body),
                Some('}') if nested => {
                    self.pos += 1;
                    return Ok(body);
                }
                Some(c) if is_ident_start(c) => {
                    let line = self.line();
                    let name = self.ident();
                    self.skip_inline();
                    if self.peek() == Some('=') && self.peek_at(1) != Some('=') {
                        self.pos += 1;
                        let expr = self.expression()?;
                        body.attributes.push(Attribute { name, expr, line });
                    } else {
                        let labels = self.labels(&name)?;
                        let inner = self.body(true)?;
                        body.blocks.push(Block {
                            kind: name,
                            labels,
                            body: inner,
                            line,
                        });
                    }
                }
                Some(c) => return Err(self.error(format!("unexpected character '{}'", c))),
            }
        }
    }

    /// Labels up to and including the opening brace.
    fn labels(&mut self, kind: &str) -> Result<Vec<String>, HclError> {
        let mut labels = Vec::new();
        loop {
            self.skip_inline();
            match self.peek() {
                Some('"') => {
                    let raw = self.raw_string()?;
                    labels.push(raw[1..raw.len() - 1].to_string());
                }
                Some('{') => {
                    self.pos += 1;
                    return Ok(labels);
                }
                Some(c) if is_ident_start(c) => labels.push(self.ident()),
                _ => {
                    return Err(self.error(format!(
                        "expected '=' or a block body after '{}'",
                        kind
                    )))
                }
            }
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.peek().map(is_ident_char).unwrap_or(false) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn skip_inline(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.pos += 1;
        }
    }

    fn skip_trivia(&mut self) -> Result<(), HclError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => self.pos += 1,
                (Some('#'), _) | (Some('/'), Some('/')) => self.skip_line_comment(),
                (Some('/'), Some('*')) => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while !matches!(self.peek(), None | Some('\n')) {
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), HclError> {
        self.pos += 2;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some('*'), Some('/')) => {
                    self.pos += 2;
                    return Ok(());
                }
                (Some(_), _) => self.pos += 1,
                (None, _) => return Err(self.error("unterminated block comment")),
            }
        }
    }

    /// Raw expression text after `=`, up to the end of the line at bracket
    /// depth zero or a closing brace of the enclosing block.
    fn expression(&mut self) -> Result<String, HclError> {
        self.skip_inline();
        let mut out = String::new();
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '\n' if depth == 0 => break,
                '}' | ']' | ')' if depth == 0 => break,
                '(' | '[' | '{' => {
                    depth += 1;
                    out.push(c);
                    self.pos += 1;
                }
                ')' | ']' | '}' => {
                    depth -= 1;
                    out.push(c);
                    self.pos += 1;
                }
                '"' => {
                    let raw = self.raw_string()?;
                    out.push_str(&raw);
                }
                '#' => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.skip_block_comment()?,
                '<' if self.heredoc_ahead() => {
                    let raw = self.raw_heredoc()?;
                    out.push_str(&raw);
                }
                _ => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        let expr = out.trim().to_string();
        if expr.is_empty() {
            return Err(self.error("missing expression after '='"));
        }
        Ok(expr)
    }

    /// A quoted string copied verbatim, quotes and escapes included.
    fn raw_string(&mut self) -> Result<String, HclError> {
        let mut out = String::from('"');
        self.pos += 1;
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.error("unterminated string")),
                Some('\\') => {
                    out.push('\\');
                    self.pos += 1;
                    if let Some(next) = self.peek() {
                        out.push(next);
                        self.pos += 1;
                    }
                }
                Some('"') => {
                    out.push('"');
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c @ ('$' | '%')) if self.peek_at(1) == Some('{') => {
                    out.push(c);
                    out.push('{');
                    self.pos += 2;
                    self.raw_template(&mut out)?;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    /// Copy a template interpolation body through its closing brace.
    fn raw_template(&mut self, out: &mut String) -> Result<(), HclError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => return Err(self.error("unterminated template interpolation")),
                Some('"') => {
                    let inner = self.raw_string()?;
                    out.push_str(&inner);
                    continue;
                }
                Some('{') => depth += 1,
                Some('}') => depth -= 1,
                Some(_) => {}
            }
            if let Some(c) = self.peek() {
                out.push(c);
                self.pos += 1;
            }
        }
        Ok(())
    }

    fn heredoc_ahead(&self) -> bool {
        if self.peek_at(1) != Some('<') {
            return false;
        }
        let offset = if self.peek_at(2) == Some('-') { 3 } else { 2 };
        self.peek_at(offset).map(is_ident_start).unwrap_or(false)
    }

    /// A heredoc copied verbatim through its closing marker.
    fn raw_heredoc(&mut self) -> Result<String, HclError> {
        let start = self.pos;
        self.pos += 2;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        let marker = self.ident();
        self.skip_inline();
        if self.peek() != Some('\n') {
            return Err(self.error("heredoc marker must end its line"));
        }
        self.pos += 1;
        loop {
            let line_start = self.pos;
            while !matches!(self.peek(), None | Some('\n')) {
                self.pos += 1;
            }
            let line: String = self.chars[line_start..self.pos].iter().collect();
            if line.trim() == marker {
                break;
            }
            if self.peek().is_none() {
                return Err(self.error(format!("unterminated heredoc '{}'", marker)));
            }
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}
