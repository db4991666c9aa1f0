// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Record Store Filters
//!
//! The record store speaks LDAP-style search filters:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `(attr=value)` | equality (any element, for multi-valued attributes) |
//! | `(attr=*)` | presence (non-null, non-empty) |
//! | `(&(..)(..))` | conjunction |
//! | `(\|(..)(..))` | disjunction |
//! | `(!(..))` | negation |
//!
//! Values escape `*`, `(`, `)` and `\` as `\2a`, `\28`, `\29`, `\5c`.
//! [`Filter`] is the typed form; `Display` renders the native string and
//! [`Filter::parse`] reads one back. Store implementations that cannot push
//! filters down evaluate them in process with [`Filter::matches`].

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Attribute every stored record carries; `(uuid=*)` matches everything.
pub const MATCH_ALL_ATTRIBUTE: &str = "uuid";

/// Deepest nesting of `&`, `|` and `!` accepted by [`Filter::parse`].
pub const MAX_FILTER_DEPTH: usize = 32;

/// Longest filter string, in bytes, accepted by [`Filter::parse`].
pub const MAX_FILTER_LENGTH: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    Present(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("unexpected end of filter")]
    UnexpectedEnd,
    #[error("unexpected character {found:?} at offset {offset}")]
    Unexpected { found: char, offset: usize },
    #[error("empty attribute name at offset {0}")]
    EmptyAttribute(usize),
    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),
    #[error("wildcard values are not supported: {0}")]
    Wildcard(String),
    #[error("trailing characters after filter at offset {0}")]
    Trailing(usize),
    #[error("filter nests deeper than {0} levels")]
    TooDeep(usize),
    #[error("filter is longer than {0} bytes")]
    TooLong(usize),
}

impl Filter {
    pub fn eq(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq(attr.into(), value.into())
    }

    pub fn present(attr: impl Into<String>) -> Self {
        Self::Present(attr.into())
    }

    pub fn match_all() -> Self {
        Self::Present(MATCH_ALL_ATTRIBUTE.to_string())
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::Present(attr) if attr == MATCH_ALL_ATTRIBUTE)
    }

    /// Conjunction that drops match-all clauses and collapses trivial cases.
    pub fn and_all(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut clauses: Vec<Filter> = filters
            .into_iter()
            .filter(|f| !f.is_match_all())
            .collect();
        match clauses.len() {
            0 => Self::match_all(),
            1 => clauses.remove(0),
            _ => Self::And(clauses),
        }
    }

    /// Attribute names referenced anywhere in the filter.
    pub fn attributes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Eq(attr, _) | Self::Present(attr) => out.push(attr),
            Self::And(children) | Self::Or(children) => {
                children.iter().for_each(|c| c.collect_attributes(out))
            }
            Self::Not(inner) => inner.collect_attributes(out),
        }
    }

    /// Evaluates the filter against a stored JSON object.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Self::Eq(attr, expected) => match record.get(attr) {
                Some(Value::Array(items)) => items.iter().any(|v| scalar_eq(v, expected)),
                Some(value) => scalar_eq(value, expected),
                None => false,
            },
            Self::Present(attr) => match record.get(attr) {
                None | Some(Value::Null) => false,
                Some(Value::Array(items)) => !items.is_empty(),
                Some(_) => true,
            },
            Self::And(children) => children.iter().all(|c| c.matches(record)),
            Self::Or(children) => children.iter().any(|c| c.matches(record)),
            Self::Not(inner) => !inner.matches(record),
        }
    }

    pub fn parse(input: &str) -> Result<Self, FilterParseError> {
        if input.len() > MAX_FILTER_LENGTH {
            return Err(FilterParseError::TooLong(MAX_FILTER_LENGTH));
        }
        let mut parser = Parser {
            chars: input.char_indices().collect(),
            pos: 0,
            depth: 0,
        };
        let filter = parser.filter()?;
        match parser.peek() {
            None => Ok(filter),
            Some((offset, _)) => Err(FilterParseError::Trailing(offset)),
        }
    }
}

fn scalar_eq(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => (if *b { "true" } else { "false" }) == expected,
        _ => false,
    }
}

/// Escapes a value for inclusion in an equality clause.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            other => out.push(other),
        }
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(attr, value) => write!(f, "({}={})", attr, escape_value(value)),
            Self::Present(attr) => write!(f, "({}=*)", attr),
            Self::And(children) => {
                f.write_str("(&")?;
                children.iter().try_for_each(|c| write!(f, "{}", c))?;
                f.write_str(")")
            }
            Self::Or(children) => {
                f.write_str("(|")?;
                children.iter().try_for_each(|c| write!(f, "{}", c))?;
                f.write_str(")")
            }
            Self::Not(inner) => write!(f, "(!{})", inner),
        }
    }
}

struct Parser {
    chars: Vec<(usize, char)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<(usize, char)> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<(usize, char), FilterParseError> {
        let item = self.peek().ok_or(FilterParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(item)
    }

    fn expect(&mut self, wanted: char) -> Result<(), FilterParseError> {
        match self.next()? {
            (_, c) if c == wanted => Ok(()),
            (offset, found) => Err(FilterParseError::Unexpected { found, offset }),
        }
    }

    fn filter(&mut self) -> Result<Filter, FilterParseError> {
        self.expect('(')?;
        let (_, c) = self.peek().ok_or(FilterParseError::UnexpectedEnd)?;
        let filter = match c {
            '&' | '|' | '!' => {
                self.pos += 1;
                self.depth += 1;
                if self.depth > MAX_FILTER_DEPTH {
                    return Err(FilterParseError::TooDeep(MAX_FILTER_DEPTH));
                }
                let filter = match c {
                    '&' => Filter::And(self.list()?),
                    '|' => Filter::Or(self.list()?),
                    _ => Filter::Not(Box::new(self.filter()?)),
                };
                self.depth -= 1;
                filter
            }
            _ => self.item()?,
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<Filter>, FilterParseError> {
        let mut children = Vec::new();
        while let Some((_, '(')) = self.peek() {
            children.push(self.filter()?);
        }
        if children.is_empty() {
            return match self.peek() {
                Some((offset, found)) => Err(FilterParseError::Unexpected { found, offset }),
                None => Err(FilterParseError::UnexpectedEnd),
            };
        }
        Ok(children)
    }

    fn item(&mut self) -> Result<Filter, FilterParseError> {
        let start = self.peek().map(|(o, _)| o).unwrap_or_default();
        let mut attr = String::new();
        loop {
            let (offset, c) = self.next()?;
            match c {
                '=' => break,
                '(' | ')' | '*' | '\\' => return Err(FilterParseError::Unexpected { found: c, offset }),
                _ => attr.push(c),
            }
        }
        if attr.is_empty() {
            return Err(FilterParseError::EmptyAttribute(start));
        }

        let mut value = String::new();
        let mut raw = String::new();
        let mut saw_wildcard = false;
        while let Some((offset, c)) = self.peek() {
            match c {
                ')' => break,
                '(' => return Err(FilterParseError::Unexpected { found: c, offset }),
                '*' => {
                    self.pos += 1;
                    saw_wildcard = true;
                    raw.push(c);
                }
                '\\' => {
                    self.pos += 1;
                    let hi = self.next().map_err(|_| FilterParseError::InvalidEscape(offset))?.1;
                    let lo = self.next().map_err(|_| FilterParseError::InvalidEscape(offset))?.1;
                    let byte = u8::from_str_radix(&format!("{}{}", hi, lo), 16)
                        .map_err(|_| FilterParseError::InvalidEscape(offset))?;
                    value.push(char::from(byte));
                    raw.push(c);
                }
                _ => {
                    self.pos += 1;
                    value.push(c);
                    raw.push(c);
                }
            }
        }

        if saw_wildcard {
            if raw == "*" {
                return Ok(Filter::Present(attr));
            }
            return Err(FilterParseError::Wildcard(raw));
        }
        Ok(Filter::Eq(attr, value))
    }
}
