//! Permissive response dialect.
//!
//! A JSON superset for text written by a language model rather than a
//! serializer:
//!
//! - unquoted scalars (`[John, Mary]`, `{name: John}`), terminated by
//!   `,`, `]`, `}` or a line break;
//! - single-quoted strings and raw line breaks inside strings;
//! - trailing commas, and commas between members are optional;
//! - `//`, `#` and `/* */` comments;
//! - case-insensitive literals: `true/yes/on`, `false/no/off`,
//!   `null/none/nil`; hexadecimal integers and `+`/`.`-prefixed numbers.
//!
//! The output is a generic [`serde_json::Value`]; shaping it into a declared
//! type is the job of [`crate::decode`].

use serde_json::{Map, Number, Value};

use crate::error::{Result, SchemaError};

/// Parse one complete value in the permissive dialect.
///
/// The whole input must be consumed (apart from whitespace and comments).
pub fn parse_dialect(text: &str) -> Result<Value> {
    let mut parser = DialectParser::new(text);
    parser.skip_trivia();
    if parser.at_end() {
        return Err(parser.error("empty response"));
    }
    let value = parser.parse_value()?;
    parser.skip_trivia();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing content"));
    }
    Ok(value)
}

/// Classify a bare token the way the dialect reads it.
pub fn scalar_from_token(token: &str) -> Value {
    match token.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => return Value::Bool(true),
        "false" | "no" | "off" => return Value::Bool(false),
        "null" | "none" | "nil" => return Value::Null,
        _ => {}
    }
    parse_number(token).unwrap_or_else(|| Value::String(token.to_owned()))
}

/// Parse a numeric token, accepting a few forms JSON rejects.
pub(crate) fn parse_number(token: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(token)
        && v.is_number()
    {
        return Some(v);
    }

    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let radix = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)]
        .iter()
        .find_map(|(prefix, radix)| digits.strip_prefix(prefix).map(|d| (d, *radix)));
    if let Some((body, radix)) = radix {
        if body.starts_with(['+', '-']) {
            return None;
        }
        let magnitude = u64::from_str_radix(body, radix).ok()?;
        let value = if negative {
            0i64.checked_sub_unsigned(magnitude)?
        } else {
            i64::try_from(magnitude).ok()?
        };
        return Some(Value::from(value));
    }

    let looks_numeric = !digits.is_empty()
        && digits
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        && digits.chars().any(|c| c.is_ascii_digit());
    if !looks_numeric {
        return None;
    }
    let parsed: f64 = token.parse().ok()?;
    Number::from_f64(parsed).map(Value::Number)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct DialectParser {
    chars: Vec<char>,
    pos: usize,
}

impl DialectParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: &str) -> SchemaError {
        let consumed = &self.chars[..self.pos.min(self.chars.len())];
        let line = consumed.iter().filter(|&&c| c == '\n').count() + 1;
        let column = consumed.iter().rev().take_while(|&&c| c != '\n').count() + 1;
        SchemaError::Syntax {
            line,
            column,
            reason: reason.to_owned(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => self.pos += 1,
                (Some('#'), _) | (Some('/'), Some('/')) => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    while !self.at_end() && !(self.peek() == Some('*') && self.peek_at(1) == Some('/')) {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.chars.len());
                }
                _ => return,
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek() {
            Some('{') => self.parse_object(),
            Some('[') => self.parse_array(),
            Some('"') | Some('\'') => self.parse_string().map(Value::String),
            Some(',') | Some(']') | Some('}') | Some(':') | None => {
                Err(self.error("expected a value"))
            }
            Some(_) => self.parse_unquoted(),
        }
    }

    fn parse_object(&mut self) -> Result<Value> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(self.error("unterminated object")),
                Some('}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(',') => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }

            let key = self.parse_key()?;
            self.skip_trivia();
            if self.peek() != Some(':') {
                return Err(self.error(&format!("expected `:` after key `{key}`")));
            }
            self.pos += 1;
            self.skip_trivia();
            let value = self.parse_value()?;
            map.insert(key, value);
        }
    }

    fn parse_array(&mut self) -> Result<Value> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(self.error("unterminated array")),
                Some(']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                Some(',') => {
                    self.pos += 1;
                    continue;
                }
                _ => items.push(self.parse_value()?),
            }
        }
    }

    fn parse_key(&mut self) -> Result<String> {
        if matches!(self.peek(), Some('"') | Some('\'')) {
            return self.parse_string();
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ':' || c == '\n' || c == '}' || c == ',' {
                break;
            }
            self.pos += 1;
        }
        let key: String = self.chars[start..self.pos].iter().collect();
        let key = key.trim();
        if key.is_empty() {
            return Err(self.error("expected an object key"));
        }
        Ok(key.to_owned())
    }

    fn parse_unquoted(&mut self) -> Result<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, ',' | ']' | '}' | '\n' | '\r') || self.comment_starts_here(start) {
                break;
            }
            self.pos += 1;
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        let token = token.trim();
        if token.is_empty() {
            return Err(self.error("expected a value"));
        }
        Ok(scalar_from_token(token))
    }

    /// A comment inside a bare token must follow whitespace, so `C#` and
    /// `http://` stay intact.
    fn comment_starts_here(&self, token_start: usize) -> bool {
        let opens = matches!(
            (self.peek(), self.peek_at(1)),
            (Some('#'), _) | (Some('/'), Some('/')) | (Some('/'), Some('*'))
        );
        opens && self.pos > token_start && self.chars[self.pos - 1].is_whitespace()
    }

    fn parse_string(&mut self) -> Result<String> {
        let quote = self.peek().ok_or_else(|| self.error("expected a string"))?;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let c = self
                .peek()
                .ok_or_else(|| self.error("unterminated string"))?;
            self.pos += 1;
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.error("unterminated escape"))?;
                    self.pos += 1;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'u' => out.push(self.parse_unicode_escape()?),
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
    }

    fn parse_unicode_escape(&mut self) -> Result<char> {
        let high = self.parse_hex4()?;
        if (0xD800..0xDC00).contains(&high)
            && self.peek() == Some('\\')
            && self.peek_at(1) == Some('u')
        {
            self.pos += 2;
            let low = self.parse_hex4()?;
            let combined = 0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
            return char::from_u32(combined).ok_or_else(|| self.error("invalid surrogate pair"));
        }
        Ok(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn parse_hex4(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        if end > self.chars.len() {
            return Err(self.error("truncated unicode escape"));
        }
        let digits: String = self.chars[self.pos..end].iter().collect();
        let code = u32::from_str_radix(&digits, 16)
            .map_err(|_| self.error(&format!("invalid unicode escape `{digits}`")))?;
        self.pos = end;
        Ok(code)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_json_is_accepted() {
        let v = parse_dialect(r#"{"a": [1, 2.5, "x", true, null]}"#).unwrap();
        assert_eq!(v, json!({"a": [1, 2.5, "x", true, null]}));
    }

    #[test]
    fn unquoted_scalars_and_keys() {
        let v = parse_dialect("{name: John Smith, age: 42, member: yes}").unwrap();
        assert_eq!(v, json!({"name": "John Smith", "age": 42, "member": true}));

        let v = parse_dialect("[John, Mary]").unwrap();
        assert_eq!(v, json!(["John", "Mary"]));
    }

    #[test]
    fn trailing_commas_and_newline_separators() {
        let v = parse_dialect("[1, 2, 3,]").unwrap();
        assert_eq!(v, json!([1, 2, 3]));

        let v = parse_dialect("{\n  a: 1\n  b: two\n}").unwrap();
        assert_eq!(v, json!({"a": 1, "b": "two"}));
    }

    #[test]
    fn comments_are_ignored() {
        let text = "// leading\n[1, # one\n 2 /* two */, 3]";
        assert_eq!(parse_dialect(text).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn literal_synonyms_are_case_insensitive() {
        assert_eq!(parse_dialect("YES").unwrap(), json!(true));
        assert_eq!(parse_dialect("Off").unwrap(), json!(false));
        assert_eq!(parse_dialect("None").unwrap(), json!(null));
        assert_eq!(parse_dialect("TRUE").unwrap(), json!(true));
    }

    #[test]
    fn numeric_forms() {
        assert_eq!(parse_dialect("0x1f").unwrap(), json!(31));
        assert_eq!(parse_dialect("-0b101").unwrap(), json!(-5));
        assert_eq!(parse_dialect("+1.5").unwrap(), json!(1.5));
        assert_eq!(parse_dialect(".5").unwrap(), json!(0.5));
        assert_eq!(parse_dialect("inf").unwrap(), json!("inf"));
    }

    #[test]
    fn prefixed_integers_stay_in_range() {
        assert_eq!(
            parse_dialect("-0x8000000000000000").unwrap(),
            json!(i64::MIN)
        );
        assert_eq!(
            parse_dialect("0x8000000000000000").unwrap(),
            json!("0x8000000000000000")
        );
        // A second sign after the prefix is not a number.
        assert_eq!(
            parse_dialect("-0x-8000000000000000").unwrap(),
            json!("-0x-8000000000000000")
        );
        assert_eq!(parse_dialect("0x+1f").unwrap(), json!("0x+1f"));
    }

    #[test]
    fn single_quotes_and_escapes() {
        assert_eq!(parse_dialect(r#"'it\'s'"#).unwrap(), json!("it's"));
        assert_eq!(parse_dialect(r#""a\nbé""#).unwrap(), json!("a\nbé"));
        assert_eq!(parse_dialect(r#""😀""#).unwrap(), json!("😀"));
    }

    #[test]
    fn bare_list_of_names_is_rejected() {
        let err = parse_dialect("John, Mary").unwrap_err();
        match err {
            SchemaError::Syntax { line, column, reason } => {
                assert_eq!(line, 1);
                assert_eq!(column, 5);
                assert!(reason.contains("trailing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn structural_errors() {
        assert!(parse_dialect("").is_err());
        assert!(parse_dialect("   // only a comment").is_err());
        assert!(parse_dialect("[1, 2").is_err());
        assert!(parse_dialect("{a 1}").is_err());
        assert!(parse_dialect("\"open").is_err());
    }

    #[test]
    fn error_positions_track_lines() {
        let err = parse_dialect("[\n 1,\n 2\n").unwrap_err();
        assert!(matches!(err, SchemaError::Syntax { line: 4, .. }));
    }
}
