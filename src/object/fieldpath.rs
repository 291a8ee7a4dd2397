//! Field Paths
//!
//! Parses field paths such as `spec.forProvider.region`,
//! `status.conditions[0].type` or `metadata.labels['app.kubernetes.io/name']`
//! and resolves them against a [`serde_json::Value`] tree.
//!
//! Parsing can fail; resolution cannot. A path that does not match the shape
//! of an object simply resolves to nothing.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object member lookup
    Field(String),
    /// Array element lookup
    Index(usize),
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse a field path.
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidFieldPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if path.is_empty() {
            return Err(invalid("path is empty"));
        }

        let mut segments = Vec::new();
        let mut chars = path.chars().peekable();
        // Set after a '.' so that "a." and "a..b" are rejected.
        let mut expect_field = true;

        while let Some(&c) = chars.peek() {
            match c {
                '.' => {
                    if expect_field {
                        return Err(invalid("empty field name"));
                    }
                    chars.next();
                    expect_field = true;
                }
                '[' => {
                    chars.next();
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(invalid("unterminated bracket"));
                    }
                    segments.push(parse_bracket(&inner).ok_or_else(|| invalid("empty brackets"))?);
                    expect_field = false;

                    match chars.peek() {
                        None | Some('.') | Some('[') => {}
                        Some(_) => return Err(invalid("unexpected character after ']'")),
                    }
                }
                ']' => return Err(invalid("unexpected ']'")),
                _ => {
                    let mut field = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == '.' || c == '[' || c == ']' {
                            break;
                        }
                        field.push(c);
                        chars.next();
                    }
                    segments.push(Segment::Field(field));
                    expect_field = false;
                }
            }
        }

        if expect_field {
            return Err(invalid("path ends with '.'"));
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    /// The path as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

fn parse_bracket(inner: &str) -> Option<Segment> {
    let inner = inner.trim();
    if inner.is_empty() {
        return None;
    }

    for quote in ['\'', '"'] {
        if inner.len() >= 2 && inner.starts_with(quote) && inner.ends_with(quote) {
            let unquoted = &inner[1..inner.len() - 1];
            if unquoted.is_empty() {
                return None;
            }
            return Some(Segment::Field(unquoted.to_string()));
        }
    }

    match inner.parse::<usize>() {
        Ok(index) => Some(Segment::Index(index)),
        Err(_) => Some(Segment::Field(inner.to_string())),
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Resolve a path to the value it points at.
pub fn get_value<'a>(root: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, segment| match segment {
            Segment::Field(name) => current.as_object()?.get(name),
            Segment::Index(index) => current.as_array()?.get(*index),
        })
}

/// Resolve a path to a string. Values of any other type count as not found.
pub fn get_string<'a>(root: &'a Value, path: &FieldPath) -> Option<&'a str> {
    get_value(root, path).and_then(Value::as_str)
}

/// Resolve a path and deserialize the value found there into `T`.
pub fn get_value_into<T: DeserializeOwned>(root: &Value, path: &FieldPath) -> Result<T> {
    let value = get_value(root, path).ok_or_else(|| Error::FieldNotFound(path.to_string()))?;
    Ok(T::deserialize(value)?)
}
