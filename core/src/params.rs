//! Rest.li 2.0 query encoding.
//!
//! # Overview
//! Parameters arrive as JSON (usually from `--params`) and leave as Rest.li
//! literals: lists render as `List(a,b)`, records as `(k1:v1,k2:v2)`, and leaf
//! values are percent-encoded so that the grammar characters `(`, `)`, `,`,
//! `:` and `'` only ever appear as structure. The empty string is `''`.
//!
//! Strings that already are balanced Rest.li expressions (`List(...)`,
//! `(field:value)`) pass through with reduced encoding: structure and existing
//! escapes are kept, anything else a URL cannot carry is escaped. Raw URNs
//! inside such an expression are escaped whole, so
//! `List(urn:li:sponsoredAccount:1)` goes out as
//! `List(urn%3Ali%3AsponsoredAccount%3A1)`. An expression that still does not
//! parse after that is an encoding error, never a flattened string.
//!
//! `decode` parses the same grammar back, so encode/decode round-trips for
//! strings, URNs, lists and records.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{Error, Result};

/// Entity-type hint attached to a catalog parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    Scalar,
    Urn,
    List,
    #[serde(rename = "list<urn>")]
    UrnList,
    Complex,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Scalar => "scalar",
            ParamKind::Urn => "urn",
            ParamKind::List => "list",
            ParamKind::UrnList => "list<urn>",
            ParamKind::Complex => "complex",
        }
    }
}

/// A LinkedIn URN of the form `urn:li:<entityType>:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Urn(String);

impl Urn {
    pub fn parse(value: &str) -> Result<Self> {
        let malformed = || {
            Error::Encoding(format!(
                "malformed URN {value:?}: expected urn:li:<entityType>:<id>"
            ))
        };
        let rest = value.strip_prefix("urn:li:").ok_or_else(malformed)?;
        let (entity_type, id) = rest.split_once(':').ok_or_else(malformed)?;
        if entity_type.is_empty() || !entity_type.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(malformed());
        }
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(malformed());
        }
        Ok(Urn(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn entity_type(&self) -> &str {
        self.0["urn:li:".len()..]
            .split_once(':')
            .map(|(entity_type, _)| entity_type)
            .unwrap_or_default()
    }

    pub fn id(&self) -> &str {
        self.0["urn:li:".len()..]
            .split_once(':')
            .map(|(_, id)| id)
            .unwrap_or_default()
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Number(Number),
    Bool(bool),
    /// A caller-supplied Rest.li expression, emitted with reduced encoding.
    Literal(String),
}

/// A structured parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(Scalar),
    Urn(Urn),
    List(Vec<ParamValue>),
    /// Record fields in the order they were supplied.
    Complex(Vec<(String, ParamValue)>),
}

impl ParamValue {
    pub fn string(value: impl Into<String>) -> Self {
        ParamValue::Scalar(Scalar::String(value.into()))
    }

    /// A literal already in wire form. Unlike `from_json`, no URN escaping
    /// is applied.
    pub fn literal(value: impl Into<String>) -> Self {
        ParamValue::Scalar(Scalar::Literal(value.into()))
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Err(Error::Encoding(
                "null cannot be encoded as a Rest.li value".to_string(),
            )),
            Value::Bool(flag) => Ok(ParamValue::Scalar(Scalar::Bool(*flag))),
            Value::Number(number) => Ok(ParamValue::Scalar(Scalar::Number(number.clone()))),
            Value::String(text) => Self::from_text(text),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>>>()
                .map(ParamValue::List),
            Value::Object(fields) => fields
                .iter()
                .map(|(key, value)| Ok((key.clone(), Self::from_json(value)?)))
                .collect::<Result<Vec<_>>>()
                .map(ParamValue::Complex),
        }
    }

    /// Like `from_json`, but coerced by the catalog's hint for the parameter.
    pub fn from_json_hinted(value: &Value, kind: ParamKind) -> Result<Self> {
        match kind {
            ParamKind::Scalar => Self::from_json(value),
            ParamKind::Urn => match value {
                Value::String(text) => Urn::parse(text).map(ParamValue::Urn),
                other => Err(Error::Encoding(format!("expected a URN string, got {other}"))),
            },
            ParamKind::List | ParamKind::UrnList => {
                let items: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    Value::String(text) if is_restli_literal(text) => {
                        return normalize_literal(text).map(ParamValue::literal);
                    }
                    other => vec![other],
                };
                items
                    .into_iter()
                    .map(|item| {
                        if kind == ParamKind::UrnList {
                            Self::from_json_hinted(item, ParamKind::Urn)
                        } else {
                            Self::from_json(item)
                        }
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(ParamValue::List)
            }
            ParamKind::Complex => match value {
                Value::Object(_) => Self::from_json(value),
                Value::String(text) if is_restli_literal(text) => {
                    normalize_literal(text).map(ParamValue::literal)
                }
                other => Err(Error::Encoding(format!("expected an object, got {other}"))),
            },
        }
    }

    fn from_text(text: &str) -> Result<Self> {
        if text.starts_with("urn:") {
            return Urn::parse(text).map(ParamValue::Urn);
        }
        if is_restli_literal(text) {
            return normalize_literal(text).map(ParamValue::literal);
        }
        Ok(ParamValue::string(text))
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut String) {
        match self {
            ParamValue::Scalar(Scalar::String(text)) => out.push_str(&encode_string(text)),
            ParamValue::Scalar(Scalar::Number(number)) => {
                out.push_str(&urlencoding::encode(&number.to_string()))
            }
            ParamValue::Scalar(Scalar::Bool(flag)) => {
                out.push_str(if *flag { "true" } else { "false" })
            }
            ParamValue::Scalar(Scalar::Literal(text)) => out.push_str(&reduced_encode(text)),
            ParamValue::Urn(urn) => out.push_str(&urlencoding::encode(urn.as_str())),
            ParamValue::List(items) => {
                out.push_str("List(");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.encode_into(out);
                }
                out.push(')');
            }
            ParamValue::Complex(fields) => {
                out.push('(');
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&encode_string(key));
                    out.push(':');
                    value.encode_into(out);
                }
                out.push(')');
            }
        }
    }
}

/// Encode a leaf string. Every reserved character is escaped.
pub fn encode_string(text: &str) -> String {
    if text.is_empty() {
        return "''".to_string();
    }
    urlencoding::encode(text).into_owned()
}

/// Encode a value placed in a URL path segment, such as an entity key.
pub fn encode_path_segment(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

/// Render `name=value` pairs in the given order. No pairs, no query.
pub fn encode_query(params: &[(String, ParamValue)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{}={}", urlencoding::encode(name), value.encode()))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn decode_query(query: &str) -> Result<Vec<(String, ParamValue)>> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::Encoding(format!("query pair without '=': {pair}")))?;
            Ok((decode_token(name)?, decode(value)?))
        })
        .collect()
}

/// Parse one encoded Rest.li value.
pub fn decode(input: &str) -> Result<ParamValue> {
    let mut parser = Parser { input, pos: 0 };
    let value = parser.value()?;
    if parser.pos != input.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(value)
}

/// A single balanced `List(...)` or `(...)` expression.
pub fn is_restli_literal(text: &str) -> bool {
    let body = text.strip_prefix("List").unwrap_or(text);
    if !body.starts_with('(') || !body.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
                if depth == 0 && i + 1 != body.len() {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Bring a balanced expression into wire form. URN leaves are escaped whole
/// and everything else gets reduced encoding. The result must parse.
fn normalize_literal(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut plain = 0;
    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        if rest.starts_with("urn:") && text[..pos].ends_with(['(', ',', ':']) {
            out.push_str(&reduced_encode(&text[plain..pos]));
            let end = pos + urn_len(rest);
            let urn = Urn::parse(&text[pos..end])?;
            out.push_str(&urlencoding::encode(urn.as_str()));
            pos = end;
            plain = end;
            continue;
        }
        pos += rest.chars().next().map_or(1, char::len_utf8);
    }
    out.push_str(&reduced_encode(&text[plain..]));

    decode(&out).map_err(|e| Error::Encoding(format!("not a Rest.li expression {text:?}: {e}")))?;
    Ok(out)
}

/// Length of the URN at the start of `text`. A parenthesized compound id
/// belongs to the URN, the enclosing list or record separator does not.
fn urn_len(text: &str) -> usize {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return i,
            ')' => depth -= 1,
            ',' if depth == 0 => return i,
            _ => {}
        }
    }
    text.len()
}

fn reduced_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'(' | b')' | b',' | b':' | b'\'' | b'%' => out.push(byte as char),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

fn decode_token(token: &str) -> Result<String> {
    if token == "''" {
        return Ok(String::new());
    }
    urlencoding::decode(token)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| Error::Encoding(format!("invalid percent-encoding in {token:?}: {e}")))
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn value(&mut self) -> Result<ParamValue> {
        let rest = &self.input[self.pos..];
        if rest.starts_with("List(") {
            self.pos += "List(".len();
            return self.list();
        }
        if rest.starts_with('(') {
            self.pos += 1;
            return self.record();
        }
        let token = self.token();
        if token.is_empty() {
            return Err(self.error("expected a value"));
        }
        let text = decode_token(token)?;
        if text.starts_with("urn:li:") {
            if let Ok(urn) = Urn::parse(&text) {
                return Ok(ParamValue::Urn(urn));
            }
        }
        Ok(ParamValue::Scalar(Scalar::String(text)))
    }

    fn list(&mut self) -> Result<ParamValue> {
        let mut items = Vec::new();
        if self.eat(')') {
            return Ok(ParamValue::List(items));
        }
        loop {
            items.push(self.value()?);
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                return Ok(ParamValue::List(items));
            }
            return Err(self.error("expected ',' or ')' in list"));
        }
    }

    fn record(&mut self) -> Result<ParamValue> {
        let mut fields = Vec::new();
        if self.eat(')') {
            return Ok(ParamValue::Complex(fields));
        }
        loop {
            let key = self.token();
            if key.is_empty() {
                return Err(self.error("expected a field name"));
            }
            let key = decode_token(key)?;
            if !self.eat(':') {
                return Err(self.error("expected ':' after field name"));
            }
            fields.push((key, self.value()?));
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                return Ok(ParamValue::Complex(fields));
            }
            return Err(self.error("expected ',' or ')' in record"));
        }
    }

    fn token(&mut self) -> &'a str {
        let input = self.input;
        let start = self.pos;
        let end = input[start..]
            .find(['(', ')', ',', ':'])
            .map_or(input.len(), |offset| start + offset);
        self.pos = end;
        &input[start..end]
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.input[self.pos..].starts_with(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::Encoding(format!("{message} at offset {} in {:?}", self.pos, self.input))
    }
}
