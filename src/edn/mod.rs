//! Minimal EDN reader and writer for manifest editing.
//!
//! This is not a general EDN library. It supports exactly what editing a
//! `deps.edn` file requires: maps with insertion order preserved, vectors,
//! lists, sets, strings, and raw scalar tokens. Keywords, symbols, numbers,
//! booleans and `nil` are kept as uninterpreted tokens and re-emitted
//! verbatim, so a parse/serialize round trip never changes a value. Only
//! whitespace and comments are lost on re-serialization.
//!
//! Maps are backed by `Vec<(Edn, Edn)>` rather than a hash map so that
//! rewriting a single pin re-emits every other entry in its original
//! position, keeping diffs reviewable.

use thiserror::Error;

/// A parsed EDN value.
///
/// Scalar tokens keep their source text. `Edn::Token(":git/sha")` is a
/// keyword, `Edn::Token("io.github.acme/lib-a")` a symbol, and
/// `Edn::Token("1.2")` a number; none of them are interpreted further.
#[derive(Debug, Clone, PartialEq)]
pub enum Edn {
    /// `{k v ...}` with insertion order preserved.
    Map(Vec<(Edn, Edn)>),
    /// `[...]`
    Vector(Vec<Edn>),
    /// `(...)`
    List(Vec<Edn>),
    /// `#{...}`
    Set(Vec<Edn>),
    /// `"..."` with escapes decoded.
    String(String),
    /// Any other scalar, stored as raw source text.
    Token(String),
    /// `#tag value`
    Tagged(String, Box<Edn>),
}

/// Error produced when the input is not parseable EDN.
#[derive(Error, Debug)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based source line of the failure.
    pub line: usize,
    /// Parser diagnostic.
    pub message: String,
}

impl Edn {
    /// Parse a single EDN form. Trailing whitespace and comments are
    /// allowed; trailing forms are not.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut reader = Reader::new(input);
        let value = reader.parse_form()?;
        reader.skip_trivia()?;
        if reader.peek().is_some() {
            return Err(reader.error("unexpected trailing content"));
        }
        Ok(value)
    }

    /// Look up a key in a map by its raw token text.
    ///
    /// Returns `None` if `self` is not a map or the key is absent. String
    /// keys are matched by their decoded content.
    pub fn get(&self, key: &str) -> Option<&Edn> {
        match self {
            Edn::Map(pairs) => {
                pairs.iter().find(|(k, _)| key_matches(k, key)).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Mutable variant of [`Edn::get`].
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Edn> {
        match self {
            Edn::Map(pairs) => {
                pairs.iter_mut().find(|(k, _)| key_matches(k, key)).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Walk a nested key path from this value.
    pub fn get_path(&self, path: &[String]) -> Option<&Edn> {
        let mut current = self;
        for segment in path {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Mutable variant of [`Edn::get_path`].
    pub fn get_path_mut(&mut self, path: &[String]) -> Option<&mut Edn> {
        let mut current = self;
        for segment in path {
            current = current.get_mut(segment)?;
        }
        Some(current)
    }

    /// The decoded content of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Edn::String(s) => Some(s),
            _ => None,
        }
    }

    /// The pairs of a map value.
    pub fn as_map(&self) -> Option<&[(Edn, Edn)]> {
        match self {
            Edn::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// The raw text of a token value.
    pub fn as_token(&self) -> Option<&str> {
        match self {
            Edn::Token(t) => Some(t),
            _ => None,
        }
    }

    /// Serialize back to EDN text.
    ///
    /// Maps whose values are themselves maps are printed one pair per
    /// line, aligned under the first key; everything else is printed
    /// inline. The result is always valid EDN that re-parses to an equal
    /// value.
    pub fn to_edn_string(&self) -> String {
        let mut out = String::new();
        write_pretty(self, &mut out, 0);
        out
    }
}

fn key_matches(key: &Edn, text: &str) -> bool {
    match key {
        Edn::Token(t) => t == text,
        Edn::String(s) => s == text,
        _ => false,
    }
}

/// Raw token text of a map key, for building location paths.
pub fn key_text(key: &Edn) -> Option<&str> {
    match key {
        Edn::Token(t) => Some(t),
        Edn::String(s) => Some(s),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Reader

struct Reader {
    src: Vec<char>,
    pos: usize,
    line: usize,
}

impl Reader {
    fn new(input: &str) -> Self {
        Self { src: input.chars().collect(), pos: 0, line: 1 }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError { line: self.line, message: message.to_string() }
    }

    /// Skip whitespace, commas, `;` comments and `#_` discarded forms.
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() || c == ',' => {
                    self.bump();
                }
                Some(';') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('#') if self.peek_at(1) == Some('_') => {
                    self.bump();
                    self.bump();
                    // the discarded form is parsed and dropped
                    self.parse_form()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_form(&mut self) -> Result<Edn, ParseError> {
        self.skip_trivia()?;
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('{') => {
                self.bump();
                self.parse_map()
            }
            Some('[') => {
                self.bump();
                Ok(Edn::Vector(self.parse_seq(']')?))
            }
            Some('(') => {
                self.bump();
                Ok(Edn::List(self.parse_seq(')')?))
            }
            Some('"') => {
                self.bump();
                self.parse_string()
            }
            Some('#') => {
                self.bump();
                match self.peek() {
                    Some('{') => {
                        self.bump();
                        Ok(Edn::Set(self.parse_seq('}')?))
                    }
                    Some(_) => {
                        let tag = self.parse_token_text();
                        if tag.is_empty() {
                            return Err(self.error("expected tag symbol after '#'"));
                        }
                        let value = self.parse_form()?;
                        Ok(Edn::Tagged(tag, Box::new(value)))
                    }
                    None => Err(self.error("unexpected end of input after '#'")),
                }
            }
            Some(c) if is_closing(c) => {
                Err(self.error(&format!("unexpected '{c}'")))
            }
            Some('\\') => {
                // character literal: the char after the backslash is taken
                // unconditionally, then any trailing name chars (\newline)
                let mut token = String::new();
                token.push(self.bump().unwrap_or('\\'));
                if let Some(c) = self.bump() {
                    token.push(c);
                }
                token.push_str(&self.parse_token_text());
                Ok(Edn::Token(token))
            }
            Some(_) => {
                let token = self.parse_token_text();
                Ok(Edn::Token(token))
            }
        }
    }

    fn parse_map(&mut self) -> Result<Edn, ParseError> {
        let mut pairs = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None => return Err(self.error("unterminated map")),
                Some('}') => {
                    self.bump();
                    return Ok(Edn::Map(pairs));
                }
                Some(_) => {
                    let key = self.parse_form()?;
                    self.skip_trivia()?;
                    if self.peek() == Some('}') || self.peek().is_none() {
                        return Err(self.error("map has an odd number of forms"));
                    }
                    let value = self.parse_form()?;
                    pairs.push((key, value));
                }
            }
        }
    }

    fn parse_seq(&mut self, closer: char) -> Result<Vec<Edn>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None => return Err(self.error("unterminated collection")),
                Some(c) if c == closer => {
                    self.bump();
                    return Ok(items);
                }
                Some(_) => items.push(self.parse_form()?),
            }
        }
    }

    fn parse_string(&mut self) -> Result<Edn, ParseError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(Edn::String(out)),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('u') => {
                        let mut code = String::new();
                        for _ in 0..4 {
                            match self.bump() {
                                Some(h) if h.is_ascii_hexdigit() => code.push(h),
                                _ => return Err(self.error("invalid unicode escape")),
                            }
                        }
                        let value = u32::from_str_radix(&code, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| self.error("invalid unicode escape"))?;
                        out.push(value);
                    }
                    _ => return Err(self.error("invalid string escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_token_text(&mut self) -> String {
        let mut token = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' || c == ';' || c == '"' || is_bracket(c) {
                break;
            }
            token.push(c);
            self.bump();
        }
        token
    }
}

fn is_bracket(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}')
}

fn is_closing(c: char) -> bool {
    matches!(c, ')' | ']' | '}')
}

// ---------------------------------------------------------------------------
// Writer

fn write_pretty(value: &Edn, out: &mut String, col: usize) {
    match value {
        Edn::Map(pairs) if pairs.iter().any(|(_, v)| matches!(v, Edn::Map(_))) => {
            out.push('{');
            let inner_col = col + 1;
            for (i, (key, val)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                    out.extend(std::iter::repeat(' ').take(inner_col));
                }
                let key_start = out.len();
                write_inline(key, out);
                let key_len = out.len() - key_start;
                out.push(' ');
                write_pretty(val, out, inner_col + key_len + 1);
            }
            out.push('}');
        }
        _ => write_inline(value, out),
    }
}

fn write_inline(value: &Edn, out: &mut String) {
    match value {
        Edn::Map(pairs) => {
            out.push('{');
            for (i, (key, val)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_inline(key, out);
                out.push(' ');
                write_inline(val, out);
            }
            out.push('}');
        }
        Edn::Vector(items) => write_seq(items, out, '[', ']'),
        Edn::List(items) => write_seq(items, out, '(', ')'),
        Edn::Set(items) => {
            out.push('#');
            write_seq(items, out, '{', '}');
        }
        Edn::String(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    _ => out.push(c),
                }
            }
            out.push('"');
        }
        Edn::Token(t) => out.push_str(t),
        Edn::Tagged(tag, inner) => {
            out.push('#');
            out.push_str(tag);
            out.push(' ');
            write_inline(inner, out);
        }
    }
}

fn write_seq(items: &[Edn], out: &mut String, open: char, close: char) {
    out.push(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_inline(item, out);
    }
    out.push(close);
}
