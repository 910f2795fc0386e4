//! Parser for the compact type notation produced by [`crate::render`].
//!
//! Accepts everything `render_type` emits, so rendering the result of
//! [`parse_type`] yields a normal form.  Record fields always need an
//! explicit `name: type`; a braced body without a colon is a set.

use serde_json::Value;

use crate::error::{Result, SchemaError};
use crate::types::{DeclaredType, Field, Primitive, Record};

/// Parse a notation string such as `{name: string, tags?: [string]}`.
pub fn parse_type(notation: &str) -> Result<DeclaredType> {
    let mut parser = NotationParser::new(notation);
    let ty = parser.parse_union()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(ty)
}

struct NotationParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> NotationParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: &str) -> SchemaError {
        SchemaError::Notation {
            notation: self.source.to_owned(),
            reason: format!("{reason} at offset {}", self.pos),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{c}`")))
        }
    }

    fn eat_ellipsis(&mut self) -> bool {
        self.skip_ws();
        let end = self.pos + 3;
        if end <= self.chars.len() && self.chars[self.pos..end].iter().all(|&c| c == '.') {
            self.pos = end;
            true
        } else {
            false
        }
    }

    // -- Grammar ---------------------------------------------------------------

    fn parse_union(&mut self) -> Result<DeclaredType> {
        let mut branches = vec![self.parse_postfix()?];
        while self.eat('|') {
            branches.push(self.parse_postfix()?);
        }
        if branches.len() == 1 {
            Ok(branches.remove(0))
        } else {
            Ok(DeclaredType::Union(branches))
        }
    }

    fn parse_postfix(&mut self) -> Result<DeclaredType> {
        let mut ty = self.parse_atom()?;
        while self.eat('?') {
            ty = DeclaredType::optional(ty);
        }
        Ok(ty)
    }

    fn parse_atom(&mut self) -> Result<DeclaredType> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unexpected end of notation")),
            Some('(') => {
                self.pos += 1;
                self.parse_parenthesized()
            }
            Some('[') => {
                self.pos += 1;
                let inner = self.parse_union()?;
                self.expect(']')?;
                Ok(DeclaredType::list(inner))
            }
            Some('{') => {
                self.pos += 1;
                self.parse_braced(None)
            }
            Some('"') | Some('\'') => Ok(DeclaredType::Literal(Value::String(self.parse_quoted()?))),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let ident = self.parse_ident();
                self.parse_named(ident)
            }
            Some(c) => Err(self.error(&format!("unexpected character `{c}`"))),
        }
    }

    fn parse_named(&mut self, ident: String) -> Result<DeclaredType> {
        match ident.as_str() {
            "any" => return Ok(DeclaredType::Any),
            "true" => return Ok(DeclaredType::literal(true)),
            "false" => return Ok(DeclaredType::literal(false)),
            _ => {}
        }
        if let Some(p) = Primitive::from_name(&ident) {
            return Ok(DeclaredType::Primitive(p));
        }
        if self.eat('{') {
            return self.parse_braced(Some(ident));
        }
        Err(self.error(&format!("unknown type name `{ident}`")))
    }

    /// After `(`: a tuple, a variadic tuple, or a grouping.
    fn parse_parenthesized(&mut self) -> Result<DeclaredType> {
        if self.eat(')') {
            return Ok(DeclaredType::Tuple(Vec::new()));
        }
        let first = self.parse_union()?;
        if self.eat(')') {
            return Ok(first);
        }
        self.expect(',')?;
        if self.eat(')') {
            return Ok(DeclaredType::Tuple(vec![first]));
        }
        if self.eat_ellipsis() {
            self.expect(')')?;
            return Ok(DeclaredType::variadic_tuple(first));
        }
        let mut elements = vec![first, self.parse_union()?];
        while self.eat(',') {
            if self.eat(')') {
                return Ok(DeclaredType::Tuple(elements));
            }
            elements.push(self.parse_union()?);
        }
        self.expect(')')?;
        Ok(DeclaredType::Tuple(elements))
    }

    /// After `{`: a record body or a set element.
    fn parse_braced(&mut self, name: Option<String>) -> Result<DeclaredType> {
        let mut record = Record {
            name,
            ..Record::default()
        };

        if self.eat('}') {
            return Ok(record.into());
        }

        if record.name.is_none() && !self.looks_like_field() && !self.looks_like_ellipsis() {
            let element = self.parse_union()?;
            self.expect('}')?;
            return Ok(DeclaredType::set(element));
        }

        loop {
            if self.eat_ellipsis() {
                record.extra = true;
                self.eat(',');
                self.expect('}')?;
                return Ok(record.into());
            }

            let (name, optional) = self
                .parse_field_key()?
                .ok_or_else(|| self.error("expected a field name"))?;
            self.expect(':')?;
            let ty = self.parse_union()?;
            record.fields.push(Field { name, ty, optional });

            if self.eat('}') {
                return Ok(record.into());
            }
            self.expect(',')?;
            if self.eat('}') {
                return Ok(record.into());
            }
        }
    }

    fn looks_like_ellipsis(&mut self) -> bool {
        let saved = self.pos;
        let found = self.eat_ellipsis();
        self.pos = saved;
        found
    }

    fn looks_like_field(&mut self) -> bool {
        let saved = self.pos;
        let found = matches!(self.parse_field_key(), Ok(Some(_))) && self.eat(':');
        self.pos = saved;
        found
    }

    /// `name`, `name?`, `"quoted name"` -- returns `None` without consuming
    /// anything recognisable.
    fn parse_field_key(&mut self) -> Result<Option<(String, bool)>> {
        self.skip_ws();
        let name = match self.peek() {
            Some('"') | Some('\'') => self.parse_quoted()?,
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_ident(),
            _ => return Ok(None),
        };
        let optional = self.eat('?');
        Ok(Some((name, optional)))
    }

    fn parse_ident(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_quoted(&mut self) -> Result<String> {
        let quote = self.peek().ok_or_else(|| self.error("expected a string"))?;
        self.pos += 1;
        let mut raw = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    raw.push('\\');
                    self.pos += 1;
                    if let Some(c) = self.peek() {
                        raw.push(c);
                        self.pos += 1;
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some('"') => {
                    raw.push_str("\\\"");
                    self.pos += 1;
                }
                Some(c) => {
                    raw.push(c);
                    self.pos += 1;
                }
            }
        }
        let escaped_single = raw.replace("\\'", "'");
        serde_json::from_str::<String>(&format!("\"{escaped_single}\""))
            .map_err(|e| self.error(&format!("invalid string literal: {e}")))
    }

    fn parse_number(&mut self) -> Result<DeclaredType> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        serde_json::from_str::<Value>(&token)
            .ok()
            .filter(Value::is_number)
            .map(DeclaredType::Literal)
            .ok_or_else(|| self.error(&format!("invalid number literal `{token}`")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
