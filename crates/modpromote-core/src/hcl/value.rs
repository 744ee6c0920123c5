//! Literal values: parsing expression text into JSON values and rendering
//! JSON values back into HCL expression syntax.
//!
//! Rendering is canonical: object keys come out in map order (sorted),
//! attributes are `=`-aligned, strings always use quoted form. Parsing
//! additionally accepts heredocs, `:` object separators and comments.

use serde_json::{Map, Number, Value};

use crate::hcl::body::{is_ident_char, is_ident_start};
use crate::hcl::error::HclError;

const INDENT: &str = "  ";

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render a value as an expression starting at nesting level `indent`.
pub fn render_value(value: &Value, indent: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) if items.is_empty() => "[]".to_string(),
        Value::Array(items) if items.iter().all(is_scalar) => format!(
            "[{}]",
            items
                .iter()
                .map(|i| render_value(i, indent))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Value::Array(items) => {
            let pad = INDENT.repeat(indent + 1);
            let mut out = String::from("[\n");
            for item in items {
                out.push_str(&pad);
                out.push_str(&render_value(item, indent + 1));
                out.push_str(",\n");
            }
            out.push_str(&INDENT.repeat(indent));
            out.push(']');
            out
        }
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(map) => {
            let entries: Vec<(String, String)> = map
                .iter()
                .map(|(k, v)| (render_key(k), render_value(v, indent + 1)))
                .collect();
            let mut out = String::from("{\n");
            out.push_str(&render_assignments(&entries, indent + 1));
            out.push_str(&INDENT.repeat(indent));
            out.push('}');
            out
        }
    }
}

/// `key = expr` lines at nesting level `indent`, with `=` aligned.
pub fn render_assignments(entries: &[(String, String)], indent: usize) -> String {
    let width = entries
        .iter()
        .map(|(k, _)| k.chars().count())
        .max()
        .unwrap_or(0);
    let pad = INDENT.repeat(indent);
    let mut out = String::new();
    for (key, expr) in entries {
        let gap = width - key.chars().count();
        out.push_str(&pad);
        out.push_str(key);
        out.push_str(&" ".repeat(gap));
        out.push_str(" = ");
        out.push_str(expr);
        out.push('\n');
    }
    out
}

/// Bare identifier when possible, quoted otherwise.
pub fn render_key(key: &str) -> String {
    let bare = key.chars().next().map(is_ident_start).unwrap_or(false)
        && key.chars().all(is_ident_char)
        && !matches!(key, "true" | "false" | "null");
    if bare {
        key.to_string()
    } else {
        quote(key)
    }
}

/// Quoted string literal with template sequences escaped.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let chars: Vec<char> = s.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.get(i + 1) == Some(&'{') => {
                out.push(*c);
                out.push(*c);
            }
            c if (*c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", *c as u32)),
            c => out.push(*c),
        }
    }
    out.push('"');
    out
}

fn leading_blanks(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b' ' || *b == b'\t').count()
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a literal expression.
///
/// Fails with `NotLiteral` for references, function calls, operators and
/// template interpolation.
pub fn parse_value(expr: &str) -> Result<Value, HclError> {
    let mut parser = ValueParser {
        chars: expr.chars().collect(),
        pos: 0,
        expr,
    };
    parser.skip_ws();
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.not_literal());
    }
    Ok(value)
}

/// Parse a literal that must be a string.
pub fn parse_string(name: &str, expr: &str) -> Result<String, HclError> {
    match parse_value(expr)? {
        Value::String(s) => Ok(s),
        other => Err(HclError::InvalidValue {
            name: name.to_string(),
            message: format!("expected a string, found {}", other),
        }),
    }
}

/// Parse a literal that must be a bool.
pub fn parse_bool(name: &str, expr: &str) -> Result<bool, HclError> {
    match parse_value(expr)? {
        Value::Bool(b) => Ok(b),
        other => Err(HclError::InvalidValue {
            name: name.to_string(),
            message: format!("expected a bool, found {}", other),
        }),
    }
}

struct ValueParser<'a> {
    chars: Vec<char>,
    pos: usize,
    expr: &'a str,
}

impl ValueParser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn not_literal(&self) -> HclError {
        HclError::NotLiteral {
            expr: self.expr.to_string(),
        }
    }

    fn syntax(&self, message: &str) -> HclError {
        HclError::Syntax {
            line: 1 + self.chars[..self.pos.min(self.chars.len())]
                .iter()
                .filter(|c| **c == '\n')
                .count(),
            message: message.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => self.pos += 1,
                (Some('#'), _) | (Some('/'), Some('/')) => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.pos += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn value(&mut self) -> Result<Value, HclError> {
        match self.peek() {
            Some('"') => self.string().map(Value::String),
            Some('<') if self.peek_at(1) == Some('<') => self.heredoc().map(Value::String),
            Some('[') => self.list(),
            Some('{') => self.object(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => {
                let word = self.word();
                match word.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    _ => Err(self.not_literal()),
                }
            }
            Some(_) => Err(self.not_literal()),
            None => Err(self.syntax("expected a value")),
        }
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while self.peek().map(is_ident_char).unwrap_or(false) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn string(&mut self) -> Result<String, HclError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let c = self
                .peek()
                .ok_or_else(|| self.syntax("unterminated string"))?;
            self.pos += 1;
            match c {
                '"' => return Ok(out),
                '\n' => return Err(self.syntax("unterminated string")),
                '\\' => out.push(self.escape()?),
                '$' | '%' => self.template_char(c, &mut out)?,
                c => out.push(c),
            }
        }
    }

    /// `$${` and `%%{` are literal; `${` and `%{` start a template.
    fn template_char(&mut self, c: char, out: &mut String) -> Result<(), HclError> {
        match (self.peek(), self.peek_at(1)) {
            (Some(next), Some('{')) if next == c => {
                out.push(c);
                out.push('{');
                self.pos += 2;
                Ok(())
            }
            (Some('{'), _) => Err(self.not_literal()),
            _ => {
                out.push(c);
                Ok(())
            }
        }
    }

    fn escape(&mut self) -> Result<char, HclError> {
        let c = self
            .peek()
            .ok_or_else(|| self.syntax("unterminated escape"))?;
        self.pos += 1;
        match c {
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            '"' => Ok('"'),
            '\\' => Ok('\\'),
            'u' => self.unicode(4),
            'U' => self.unicode(8),
            other => Err(self.syntax(&format!("invalid escape '\\{}'", other))),
        }
    }

    fn unicode(&mut self, digits: usize) -> Result<char, HclError> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(self.syntax("truncated unicode escape"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.syntax("invalid unicode escape"))
    }

    fn heredoc(&mut self) -> Result<String, HclError> {
        self.pos += 2;
        let indented = self.peek() == Some('-');
        if indented {
            self.pos += 1;
        }
        let marker = self.word();
        if marker.is_empty() {
            return Err(self.not_literal());
        }
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.pos += 1;
        }
        if self.peek() != Some('\n') {
            return Err(self.syntax("heredoc marker must end its line"));
        }
        self.pos += 1;

        let mut lines: Vec<String> = Vec::new();
        loop {
            let start = self.pos;
            while !matches!(self.peek(), None | Some('\n')) {
                self.pos += 1;
            }
            let line: String = self.chars[start..self.pos].iter().collect();
            let line = line.trim_end_matches('\r').to_string();
            if line.trim() == marker {
                break;
            }
            if self.peek().is_none() {
                return Err(self.syntax("unterminated heredoc"));
            }
            self.pos += 1;
            lines.push(line);
        }

        if indented {
            let strip = lines
                .iter()
                .filter(|l| !l.trim().is_empty())
                .map(|l| leading_blanks(l))
                .min()
                .unwrap_or(0);
            for line in &mut lines {
                let cut = strip.min(leading_blanks(line));
                *line = line[cut..].to_string();
            }
        }

        let mut out = String::new();
        let mut body: Vec<char> = Vec::new();
        for line in &lines {
            body.extend(line.chars());
            body.push('\n');
        }
        let mut i = 0;
        while i < body.len() {
            let c = body[i];
            if (c == '$' || c == '%') && body.get(i + 1) == Some(&'{') {
                return Err(self.not_literal());
            }
            if (c == '$' || c == '%') && body.get(i + 1) == Some(&c) && body.get(i + 2) == Some(&'{')
            {
                out.push(c);
                out.push('{');
                i += 3;
                continue;
            }
            out.push(c);
            i += 1;
        }
        Ok(out)
    }

    fn number(&mut self) -> Result<Value, HclError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        let mut float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' | 'e' | 'E' => float = true,
                '+' | '-' if matches!(self.chars.get(self.pos - 1), Some('e' | 'E')) => {}
                _ => break,
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let number = if float {
            text.parse::<f64>().ok().and_then(Number::from_f64)
        } else if let Ok(n) = text.parse::<u64>() {
            Some(Number::from(n))
        } else if let Ok(n) = text.parse::<i64>() {
            Some(Number::from(n))
        } else {
            text.parse::<f64>().ok().and_then(Number::from_f64)
        };
        number
            .map(Value::Number)
            .ok_or_else(|| self.not_literal())
    }

    fn list(&mut self) -> Result<Value, HclError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {}
                Some(_) => return Err(self.not_literal()),
                None => return Err(self.syntax("unterminated list")),
            }
        }
    }

    fn object(&mut self) -> Result<Value, HclError> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            let key = match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some('"') => self.string()?,
                Some(c) if is_ident_start(c) => self.word(),
                Some(_) => return Err(self.not_literal()),
                None => return Err(self.syntax("unterminated object")),
            };
            self.skip_ws();
            match self.peek() {
                Some('=') | Some(':') => self.pos += 1,
                _ => return Err(self.not_literal()),
            }
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            if self.peek() == Some(',') {
                self.pos += 1;
            }
        }
    }
}
