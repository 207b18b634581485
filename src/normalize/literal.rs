//! Mapping literal parsing
//!
//! Handlers sometimes hand back a result mapping serialized either as JSON
//! or as a Python-style literal (`{'success': True, ...}`). Both decode to a
//! `serde_json` map through [`parse_mapping`].

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Why a literal could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    /// Input ended inside a value
    #[error("unexpected end of input")]
    UnexpectedEnd,

    /// A character that cannot start or continue the current value
    #[error("unexpected character {found:?} at offset {offset}")]
    Unexpected {
        /// Offending character
        found: char,
        /// Byte offset into the input
        offset: usize,
    },

    /// Malformed numeric literal
    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    /// Malformed escape sequence inside a string
    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),

    /// Mapping key that has no string form (list, mapping)
    #[error("unsupported mapping key at offset {0}")]
    UnsupportedKey(usize),

    /// Content after the closing brace
    #[error("trailing input at offset {0}")]
    Trailing(usize),

    /// Containers nested deeper than [`MAX_DEPTH`]
    #[error("nesting deeper than {max} levels at offset {0}", max = MAX_DEPTH)]
    TooDeep(usize),

    /// Top-level value parsed but is not a mapping
    #[error("top-level value is not a mapping")]
    NotAMapping,

    /// JSON decoder rejected the input
    #[error("invalid JSON: {0}")]
    Json(String),
}

/// Deepest container nesting accepted, matching `serde_json`'s limit
pub const MAX_DEPTH: usize = 128;

/// Which literal syntax a text uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralSyntax {
    /// Standard JSON (`{"key": true}`)
    Json,
    /// Python literal (`{'key': True}`)
    Python,
}

impl LiteralSyntax {
    /// Pick the syntax from the opening of a mapping literal
    #[must_use]
    pub fn detect(text: &str) -> Self {
        let rest = text.trim_start().strip_prefix('{').unwrap_or(text).trim_start();
        if rest.starts_with('"') {
            Self::Json
        } else {
            Self::Python
        }
    }
}

/// Decode a mapping literal in either syntax
///
/// # Errors
///
/// Returns [`LiteralError`] if the text is not a well-formed mapping
pub fn parse_mapping(text: &str) -> Result<Map<String, Value>, LiteralError> {
    let text = text.trim();
    let value = match LiteralSyntax::detect(text) {
        LiteralSyntax::Json => {
            serde_json::from_str::<Value>(text).map_err(|e| LiteralError::Json(e.to_string()))?
        }
        LiteralSyntax::Python => {
            let mut parser = Parser::new(text);
            let value = parser.value()?;
            parser.skip_whitespace();
            if parser.pos < text.len() {
                return Err(LiteralError::Trailing(parser.pos));
            }
            value
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(LiteralError::NotAMapping),
    }
}

/// Recursive-descent parser for Python literals
struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    const fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), LiteralError> {
        match self.bump() {
            Some(c) if c == wanted => Ok(()),
            Some(found) => Err(LiteralError::Unexpected {
                found,
                offset: self.pos - found.len_utf8(),
            }),
            None => Err(LiteralError::UnexpectedEnd),
        }
    }

    fn unexpected(&self) -> LiteralError {
        self.peek().map_or(LiteralError::UnexpectedEnd, |found| LiteralError::Unexpected {
            found,
            offset: self.pos,
        })
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_whitespace();
        match self.peek() {
            Some('{') => self.nested(Self::mapping),
            Some('[') => self.nested(|p| p.sequence('[', ']')),
            Some('(') => self.nested(|p| p.sequence('(', ')')),
            Some('\'' | '"') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.keyword(),
            _ => Err(self.unexpected()),
        }
    }

    /// Parse one container, bounding recursion depth
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Value, LiteralError>,
    ) -> Result<Value, LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(LiteralError::TooDeep(self.pos));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn mapping(&mut self) -> Result<Value, LiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Object(map));
            }

            let key_offset = self.pos;
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(true) => "True".to_string(),
                Value::Bool(false) => "False".to_string(),
                Value::Null => "None".to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(LiteralError::UnsupportedKey(key_offset));
                }
            };

            self.skip_whitespace();
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Value, LiteralError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(Value::Array(items));
            }

            items.push(self.value()?);

            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
        let mut out = String::new();
        loop {
            let escape_offset = self.pos;
            match self.bump().ok_or(LiteralError::UnexpectedEnd)? {
                c if c == quote => return Ok(out),
                '\\' => {
                    let escaped = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        '\n' => {}
                        'x' => out.push(self.hex_escape(2, escape_offset)?),
                        'u' => out.push(self.hex_escape(4, escape_offset)?),
                        'U' => out.push(self.hex_escape(8, escape_offset)?),
                        other => {
                            // unknown escapes are kept verbatim
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                c => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, digits: usize, offset: usize) -> Result<char, LiteralError> {
        let end = self.pos + digits;
        let hex = self
            .src
            .get(self.pos..end)
            .ok_or(LiteralError::InvalidEscape(offset))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| LiteralError::InvalidEscape(offset))?;
        self.pos = end;
        char::from_u32(code).ok_or(LiteralError::InvalidEscape(offset))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_'))
        {
            self.bump();
        }
        let raw = &self.src[start..self.pos];
        let cleaned = raw.replace('_', "");

        if let Ok(int) = cleaned.parse::<i64>() {
            return Ok(Value::Number(int.into()));
        }
        cleaned
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LiteralError::InvalidNumber(raw.to_string()))
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        match &self.src[start..self.pos] {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            _ => Err(LiteralError::Unexpected {
                found: self.src[start..].chars().next().unwrap_or('?'),
                offset: start,
            }),
        }
    }
}
