//! Where user-assigned tags live inside an entry's fields.
//!
//! Tags are stored under `flags.<SCOPE>`: one optional category tag and a
//! list of filter tags.

use serde_json::{Map, Value};

pub const SCOPE: &str = "librarian";
pub const CATEGORY_TAG: &str = "categoryTag";
pub const FILTER_TAG: &str = "filterTag";

/// Field path of the filter tag list.
pub fn filter_tag_path() -> String {
    format!("flags.{SCOPE}.{FILTER_TAG}")
}

/// Collapse inner whitespace and trim. Empty tags are dropped by callers.
pub fn normalize_tag(tag: &str) -> String {
    tag.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn scope(fields: &Value) -> Option<&Map<String, Value>> {
    fields.get("flags")?.get(SCOPE)?.as_object()
}

/// Rebuild the tag scope of `fields` through `update`, creating the
/// intermediate objects when missing. Non-object values in the way are
/// replaced.
pub(crate) fn update_scope(fields: &mut Value, update: impl FnOnce(&mut Map<String, Value>)) {
    let mut root = match fields.take() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let mut flags = match root.remove("flags") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let mut scope = match flags.remove(SCOPE) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    update(&mut scope);
    flags.insert(SCOPE.to_string(), Value::Object(scope));
    root.insert("flags".to_string(), Value::Object(flags));
    *fields = Value::Object(root);
}
