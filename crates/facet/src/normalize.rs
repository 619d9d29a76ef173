//! Facet value normalization.
//!
//! Raw field values come in any JSON shape. Normalization flattens them into
//! a list of `(token, display)` pairs: the token is what filters compare, the
//! display is what a person reads.

use serde_json::Value;

/// Keys consulted, in order, when an object has no usable `value`.
const PREFERRED_KEYS: [&str; 4] = ["type", "subtype", "label", "name"];

/// One normalized facet value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FacetValue {
    /// Lowercase, trimmed comparison key.
    pub token: String,
    /// Trimmed, case-preserving display text.
    pub display: String,
}

impl FacetValue {
    fn from_text(text: &str) -> Option<Self> {
        let display = text.trim();
        if display.is_empty() {
            return None;
        }
        Some(Self {
            token: display.to_lowercase(),
            display: display.to_string(),
        })
    }
}

/// Token for a display string; the same token [`normalize`] would produce.
pub fn token_of(display: &str) -> String {
    display.trim().to_lowercase()
}

/// Flatten a raw value into facet values.
///
/// - `null`, empty and whitespace-only strings produce nothing.
/// - Strings, booleans and numbers produce one value.
/// - Arrays are flattened, recursively.
/// - Objects produce, in order of preference: their normalized `value`
///   member; the first non-empty of `type`, `subtype`, `label` or `name`;
///   their keys when every member is `true` (the shape a serialized set
///   takes); or nothing.
///
/// Never fails. Output order follows input order and may contain repeats.
pub fn normalize(raw: &Value) -> Vec<FacetValue> {
    let mut values = Vec::new();
    normalize_into(raw, &mut values);
    values
}

fn normalize_into(raw: &Value, out: &mut Vec<FacetValue>) {
    match raw {
        Value::Null => {},
        Value::String(text) => out.extend(FacetValue::from_text(text)),
        Value::Bool(flag) => out.extend(FacetValue::from_text(if *flag { "true" } else { "false" })),
        Value::Number(number) => out.extend(FacetValue::from_text(&number.to_string())),
        Value::Array(items) => {
            for item in items {
                normalize_into(item, out);
            }
        },
        Value::Object(map) => {
            if let Some(inner) = map.get("value") {
                let before = out.len();
                normalize_into(inner, out);
                if out.len() > before {
                    return;
                }
            }
            let preferred = PREFERRED_KEYS.iter().filter_map(|key| map.get(*key)).find(|value| is_present(value));
            if let Some(preferred) = preferred {
                normalize_into(preferred, out);
                return;
            }
            if map.values().all(|member| member == &Value::Bool(true)) {
                out.extend(map.keys().filter_map(|key| FacetValue::from_text(key)));
            }
        },
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}
