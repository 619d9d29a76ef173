//! Field paths into entry data.

use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Prefix tried when a path finds nothing on the entry itself.
const SOURCE_PREFIX: &str = "_source";

/// A parsed path such as `system.type.value` or `flags["campaign-codex"].type`.
///
/// Parsing never fails: malformed input simply produces parts that will not
/// match anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    parts: Vec<String>,
}

impl FieldPath {
    /// Parse dot and bracket notation. Bracketed keys may be quoted with `"`
    /// or `'`, in which case dots and brackets inside the quotes are literal.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut in_bracket = false;
        let mut quote: Option<char> = None;
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            if in_bracket {
                if Some(c) == quote {
                    quote = None;
                } else if c == ']' && quote.is_none() {
                    parts.push(std::mem::take(&mut current));
                    in_bracket = false;
                } else {
                    current.push(c);
                }
                continue;
            }
            match c {
                '[' => {
                    if !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                    in_bracket = true;
                    quote = chars.next_if(|next| *next == '"' || *next == '\'');
                },
                '.' => {
                    if !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                },
                _ => current.push(c),
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }
        Self { raw, parts }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Look this path up, falling back to the same path under `_source`.
    pub fn resolve(&self, root: &Value) -> Option<Value> {
        lookup(root, &self.parts).or_else(|| {
            let source = root.get(SOURCE_PREFIX)?;
            lookup(source, &self.parts)
        })
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.raw)
    }
}

/// Walk `parts` from `root`, fanning out across arrays.
///
/// An all-digit part indexes into an array; any other part applied to an
/// array is applied to each of its elements. Returns the single value found,
/// an array of every value when the walk fanned out, or `None` when nothing
/// matched. `null` leaves are kept; missing keys are not.
pub fn lookup(root: &Value, parts: &[String]) -> Option<Value> {
    if parts.is_empty() {
        return None;
    }
    let mut values: Vec<&Value> = vec![root];
    for part in parts {
        let index: Option<usize> = (!part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
            .then(|| part.parse().ok())
            .flatten();
        let mut next = Vec::new();
        for value in values {
            match value {
                Value::Array(items) => match index {
                    Some(index) => next.extend(items.get(index)),
                    None => next.extend(items.iter().filter_map(|item| item.get(part.as_str()))),
                },
                Value::Object(map) => next.extend(map.get(part.as_str())),
                _ => {},
            }
        }
        if next.is_empty() {
            return None;
        }
        values = next;
    }
    match values.as_slice() {
        [single] => Some((*single).clone()),
        many => Some(Value::Array(many.iter().map(|value| (*value).clone()).collect())),
    }
}
