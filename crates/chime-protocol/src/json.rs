//! Strict JSON value model.
//!
//! ## Grammar
//!
//! Exactly one top-level value with optional surrounding whitespace.
//! Numbers follow RFC 8259 (no leading zeros, at least one digit after `.`,
//! optional exponent); values that overflow to infinity are rejected.
//!
//! ## Strings
//!
//! Escapes `\" \\ \/ \b \f \n \r \t` and `\uXXXX` are accepted. A `\u` escape
//! at or above U+0080 decodes to `?`; surrogate pairs are not combined. Raw
//! UTF-8 in the input is kept as is.
//!
//! ## Serialization
//!
//! Output is compact. Object keys keep insertion order. Control characters
//! without a short escape are written as `\u00XX` so that serialized text
//! always parses back to an equal value.

use std::fmt::{self, Write as _};

use indexmap::IndexMap;
use thiserror::Error;

/// Nesting deeper than this is rejected instead of recursing further.
pub const MAX_DEPTH: usize = 256;

/// Errors produced by [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonError {
    #[error("unexpected end of json")]
    UnexpectedEnd,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("expected string")]
    ExpectedString,
    #[error("expected ':' in object")]
    ExpectedColon,
    #[error("expected ',' in object")]
    ExpectedObjectComma,
    #[error("expected ',' in array")]
    ExpectedArrayComma,
    #[error("unterminated object")]
    UnterminatedObject,
    #[error("unterminated array")]
    UnterminatedArray,
    #[error("unterminated string")]
    UnterminatedString,
    #[error("invalid escape")]
    InvalidEscape,
    #[error("invalid unicode escape")]
    InvalidUnicodeEscape,
    #[error("unsupported escape sequence")]
    UnsupportedEscape,
    #[error("control character in string")]
    ControlCharacter,
    #[error("invalid number")]
    InvalidNumber,
    #[error("invalid literal")]
    InvalidLiteral,
    #[error("unexpected trailing characters")]
    TrailingCharacters,
    #[error("json nesting too deep")]
    TooDeep,
}

/// A parsed or constructed JSON value.
///
/// Object equality ignores key order.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JsonValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<JsonValue>),
    Object(IndexMap<String, JsonValue>),
}

impl JsonValue {
    /// Build an object whose keys serialize in the given order.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, JsonValue)>,
    {
        JsonValue::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn array<T, I>(items: I) -> Self
    where
        T: Into<JsonValue>,
        I: IntoIterator<Item = T>,
    {
        JsonValue::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.as_object().and_then(|object| object.get(key))
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, JsonValue>> {
        match self {
            JsonValue::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsonValue]> {
        match self {
            JsonValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsonValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsonValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsonValue::Object(_))
    }
}

impl From<bool> for JsonValue {
    fn from(value: bool) -> Self {
        JsonValue::Bool(value)
    }
}

impl From<f64> for JsonValue {
    fn from(value: f64) -> Self {
        JsonValue::Number(value)
    }
}

impl From<i32> for JsonValue {
    fn from(value: i32) -> Self {
        JsonValue::Number(f64::from(value))
    }
}

impl From<i64> for JsonValue {
    fn from(value: i64) -> Self {
        JsonValue::Number(value as f64)
    }
}

impl From<u64> for JsonValue {
    fn from(value: u64) -> Self {
        JsonValue::Number(value as f64)
    }
}

impl From<&str> for JsonValue {
    fn from(value: &str) -> Self {
        JsonValue::String(value.to_string())
    }
}

impl From<String> for JsonValue {
    fn from(value: String) -> Self {
        JsonValue::String(value)
    }
}

impl From<&String> for JsonValue {
    fn from(value: &String) -> Self {
        JsonValue::String(value.clone())
    }
}

impl From<Vec<JsonValue>> for JsonValue {
    fn from(items: Vec<JsonValue>) -> Self {
        JsonValue::Array(items)
    }
}

// ============================================================================
// Serialization
// ============================================================================

impl fmt::Display for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonValue::Null => f.write_str("null"),
            JsonValue::Bool(value) => f.write_str(if *value { "true" } else { "false" }),
            JsonValue::Number(value) => write_number(f, *value),
            JsonValue::String(value) => write_string(f, value),
            JsonValue::Array(items) => {
                f.write_char('[')?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_char(']')
            }
            JsonValue::Object(object) => {
                f.write_char('{')?;
                for (index, (key, value)) in object.iter().enumerate() {
                    if index > 0 {
                        f.write_char(',')?;
                    }
                    write_string(f, key)?;
                    f.write_char(':')?;
                    write!(f, "{}", value)?;
                }
                f.write_char('}')
            }
        }
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if !value.is_finite() {
        // Not representable in JSON.
        return f.write_str("null");
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        write!(f, "{}", value as i64)
    } else {
        write!(f, "{}", value)
    }
}

fn write_string(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in value.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\u{08}' => f.write_str("\\b")?,
            '\u{0c}' => f.write_str("\\f")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if (c as u32) < 0x20 => write!(f, "\\u{:04x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

/// Quote and escape a string as a JSON string literal.
pub fn quote(value: &str) -> String {
    JsonValue::String(value.to_string()).to_string()
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse exactly one JSON value from `text`.
pub fn parse(text: &str) -> Result<JsonValue, JsonError> {
    let mut parser = Parser {
        input: text.as_bytes(),
        pos: 0,
        depth: 0,
    };
    parser.skip_whitespace();
    let value = parser.parse_value()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(JsonError::TrailingCharacters);
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn skip_digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn parse_value(&mut self) -> Result<JsonValue, JsonError> {
        match self.peek() {
            None => Err(JsonError::UnexpectedEnd),
            Some(b'{') => self.nested(Self::parse_object),
            Some(b'[') => self.nested(Self::parse_array),
            Some(b'"') => self.parse_string().map(JsonValue::String),
            Some(b't') => self.parse_literal(b"true", JsonValue::Bool(true)),
            Some(b'f') => self.parse_literal(b"false", JsonValue::Bool(false)),
            Some(b'n') => self.parse_literal(b"null", JsonValue::Null),
            Some(b'-' | b'0'..=b'9') => self.parse_number().map(JsonValue::Number),
            Some(_) => Err(JsonError::UnexpectedToken),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<JsonValue, JsonError>,
    ) -> Result<JsonValue, JsonError> {
        if self.depth >= MAX_DEPTH {
            return Err(JsonError::TooDeep);
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_object(&mut self) -> Result<JsonValue, JsonError> {
        self.pos += 1;
        self.skip_whitespace();

        let mut object = IndexMap::new();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(JsonValue::Object(object));
        }

        while !self.at_end() {
            let key = self.parse_string()?;

            self.skip_whitespace();
            if self.peek() != Some(b':') {
                return Err(JsonError::ExpectedColon);
            }
            self.pos += 1;
            self.skip_whitespace();

            let value = self.parse_value()?;
            object.insert(key, value);

            self.skip_whitespace();
            match self.peek() {
                None => return Err(JsonError::UnterminatedObject),
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(JsonValue::Object(object));
                }
                Some(b',') => {
                    self.pos += 1;
                    self.skip_whitespace();
                }
                Some(_) => return Err(JsonError::ExpectedObjectComma),
            }
        }

        Err(JsonError::UnterminatedObject)
    }

    fn parse_array(&mut self) -> Result<JsonValue, JsonError> {
        self.pos += 1;
        self.skip_whitespace();

        let mut items = Vec::new();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(JsonValue::Array(items));
        }

        while !self.at_end() {
            items.push(self.parse_value()?);

            self.skip_whitespace();
            match self.peek() {
                None => return Err(JsonError::UnterminatedArray),
                Some(b']') => {
                    self.pos += 1;
                    return Ok(JsonValue::Array(items));
                }
                Some(b',') => {
                    self.pos += 1;
                    self.skip_whitespace();
                }
                Some(_) => return Err(JsonError::ExpectedArrayComma),
            }
        }

        Err(JsonError::UnterminatedArray)
    }

    fn parse_string(&mut self) -> Result<String, JsonError> {
        if self.peek() != Some(b'"') {
            return Err(JsonError::ExpectedString);
        }
        self.pos += 1;

        let mut out = Vec::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                b'"' => {
                    // Only whole UTF-8 sequences and ASCII were copied.
                    return String::from_utf8(out).map_err(|_| JsonError::UnterminatedString);
                }
                b'\\' => {
                    let escape = self.peek().ok_or(JsonError::InvalidEscape)?;
                    self.pos += 1;
                    match escape {
                        b'"' | b'\\' | b'/' => out.push(escape),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => out.push(self.parse_unicode_escape()?),
                        _ => return Err(JsonError::UnsupportedEscape),
                    }
                }
                c if c < 0x20 => return Err(JsonError::ControlCharacter),
                c => out.push(c),
            }
        }

        Err(JsonError::UnterminatedString)
    }

    fn parse_unicode_escape(&mut self) -> Result<u8, JsonError> {
        let hex = self
            .input
            .get(self.pos..self.pos + 4)
            .ok_or(JsonError::InvalidUnicodeEscape)?;
        if !hex.iter().all(u8::is_ascii_hexdigit) {
            return Err(JsonError::InvalidUnicodeEscape);
        }
        let hex = std::str::from_utf8(hex).map_err(|_| JsonError::InvalidUnicodeEscape)?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| JsonError::InvalidUnicodeEscape)?;
        self.pos += 4;
        Ok(if code < 0x80 { code as u8 } else { b'?' })
    }

    fn parse_number(&mut self) -> Result<f64, JsonError> {
        let start = self.pos;

        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => {
                self.skip_digits();
            }
            _ => return Err(JsonError::InvalidNumber),
        }

        if self.peek() == Some(b'.') {
            self.pos += 1;
            if self.skip_digits() == 0 {
                return Err(JsonError::InvalidNumber);
            }
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.skip_digits() == 0 {
                return Err(JsonError::InvalidNumber);
            }
        }

        let text = std::str::from_utf8(&self.input[start..self.pos]).map_err(|_| JsonError::InvalidNumber)?;
        let value: f64 = text.parse().map_err(|_| JsonError::InvalidNumber)?;
        if !value.is_finite() {
            return Err(JsonError::InvalidNumber);
        }
        Ok(value)
    }

    fn parse_literal(&mut self, literal: &[u8], value: JsonValue) -> Result<JsonValue, JsonError> {
        let candidate = self
            .input
            .get(self.pos..self.pos + literal.len())
            .ok_or(JsonError::UnexpectedEnd)?;
        if candidate != literal {
            return Err(JsonError::InvalidLiteral);
        }
        self.pos += literal.len();
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_nested_document() {
        let value = parse(r#" {"a": [1, -2.5, 3e2, true, null], "b": {"c": "d"}} "#).unwrap();

        assert_eq!(
            value,
            JsonValue::object([
                (
                    "a",
                    JsonValue::array([
                        JsonValue::from(1),
                        JsonValue::from(-2.5),
                        JsonValue::from(300),
                        JsonValue::Bool(true),
                        JsonValue::Null,
                    ])
                ),
                ("b", JsonValue::object([("c", JsonValue::from("d"))])),
            ])
        );
    }

    #[test]
    fn test_object_equality_ignores_order() {
        assert_eq!(parse(r#"{"a":1,"b":2}"#).unwrap(), parse(r#"{"b":2,"a":1}"#).unwrap());
    }

    #[test]
    fn test_number_grammar() {
        assert_eq!(parse("0").unwrap(), JsonValue::from(0));
        assert_eq!(parse("-0.5").unwrap(), JsonValue::from(-0.5));
        assert_eq!(parse("1E+2").unwrap(), JsonValue::from(100));
        assert_eq!(parse("01"), Err(JsonError::TrailingCharacters));
        assert_eq!(parse("1."), Err(JsonError::InvalidNumber));
        assert_eq!(parse("-"), Err(JsonError::InvalidNumber));
        assert_eq!(parse("1e"), Err(JsonError::InvalidNumber));
        assert_eq!(parse("1e999"), Err(JsonError::InvalidNumber));
        assert_eq!(parse("NaN"), Err(JsonError::UnexpectedToken));
        assert_eq!(parse("Infinity"), Err(JsonError::UnexpectedToken));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            parse(r#""a\"b\\c\/d\b\f\n\r\t""#).unwrap(),
            JsonValue::from("a\"b\\c/d\u{8}\u{c}\n\r\t")
        );
        assert_eq!(parse(r#""\u0041\u00e9\u4e2d""#).unwrap(), JsonValue::from("A??"));
        assert_eq!(parse("\"caf\u{e9}\"").unwrap(), JsonValue::from("caf\u{e9}"));
    }

    #[test]
    fn test_string_errors() {
        assert_eq!(parse(r#""\x""#), Err(JsonError::UnsupportedEscape));
        assert_eq!(parse(r#""\u12""#), Err(JsonError::InvalidUnicodeEscape));
        assert_eq!(parse(r#""\u12zz""#), Err(JsonError::InvalidUnicodeEscape));
        assert_eq!(parse("\"a\nb\""), Err(JsonError::ControlCharacter));
        assert_eq!(parse("\"abc"), Err(JsonError::UnterminatedString));
        assert_eq!(parse("\"abc\\"), Err(JsonError::InvalidEscape));
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(parse(""), Err(JsonError::UnexpectedEnd));
        assert_eq!(parse("{\"a\" 1}"), Err(JsonError::ExpectedColon));
        assert_eq!(parse("{\"a\":1 \"b\":2}"), Err(JsonError::ExpectedObjectComma));
        assert_eq!(parse("{\"a\":1"), Err(JsonError::UnterminatedObject));
        assert_eq!(parse("{1:2}"), Err(JsonError::ExpectedString));
        assert_eq!(parse("[1 2]"), Err(JsonError::ExpectedArrayComma));
        assert_eq!(parse("[1,"), Err(JsonError::UnterminatedArray));
        assert_eq!(parse("[1"), Err(JsonError::UnterminatedArray));
        assert_eq!(parse("tru"), Err(JsonError::UnexpectedEnd));
        assert_eq!(parse("trux"), Err(JsonError::InvalidLiteral));
        assert_eq!(parse("{} {}"), Err(JsonError::TrailingCharacters));
        assert_eq!(parse("@"), Err(JsonError::UnexpectedToken));
    }

    #[test]
    fn test_depth_limit() {
        let deep = "[".repeat(MAX_DEPTH + 1) + &"]".repeat(MAX_DEPTH + 1);
        assert_eq!(parse(&deep), Err(JsonError::TooDeep));

        let ok = "[".repeat(MAX_DEPTH) + &"]".repeat(MAX_DEPTH);
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn test_serialize_compact_in_insertion_order() {
        let value = JsonValue::object([
            ("z", JsonValue::from(1)),
            ("a", JsonValue::array(["x", "y"])),
            ("m", JsonValue::from(2.5)),
            ("n", JsonValue::Null),
        ]);

        assert_eq!(value.to_string(), r#"{"z":1,"a":["x","y"],"m":2.5,"n":null}"#);
    }

    #[test]
    fn test_serialize_escapes() {
        assert_eq!(
            quote("a\"b\\c\n\t\u{1}/"),
            r#""a\"b\\c\n\t\u0001/""#
        );
    }

    #[test]
    fn test_reparse_serialized_output() {
        let inputs = [
            r#"{"a":[1,2,{"b":null}],"c":"\u0001\n","d":-1.25e-3,"e":12345678901234567890}"#,
            r#"[[],{},"",0,-0,true,false]"#,
            r#""tab\there""#,
        ];
        for input in inputs {
            let first = parse(input).unwrap();
            let second = parse(&first.to_string()).unwrap();
            assert_eq!(first, second, "input: {}", input);
        }
    }

    #[test]
    fn test_output_accepted_by_serde_json() {
        let value = parse(r#"{"s":"\u0002q\"","n":[0.1,1e300]}"#).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&value.to_string()).unwrap();
        assert_eq!(reparsed["s"], "\u{2}q\"");
        assert_eq!(reparsed["n"][0], 0.1);
    }
}
