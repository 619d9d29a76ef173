//! Facet field definitions and the per-category catalog.
//!
//! A field is read either through a [`FieldPath`] into the entry's data or
//! through an extractor function. The [`FieldCatalog`] merges built-in
//! defaults, user custom fields and tag groups, and resolves each category
//! once.

use crate::error::Result;
use crate::normalize::{FacetValue, normalize, token_of};
use crate::path::FieldPath;
use librarian_model::{Entry, tags};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{Arc, PoisonError, RwLock};

/// Reads a field from an entry. An error marks the field absent for that
/// entry only.
pub type Extractor = Arc<dyn Fn(&Entry) -> Result<Value> + Send + Sync>;

/// How a field's raw value is obtained.
#[derive(Clone)]
pub enum FieldAccessor {
    Path(FieldPath),
    Extractor(Extractor),
}

impl Debug for FieldAccessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(&path.to_string()).finish(),
            Self::Extractor(_) => f.write_str("Extractor(..)"),
        }
    }
}

/// One facet field.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub key: String,
    pub label: String,
    pub accessor: FieldAccessor,
    /// Whether entries usually carry several values (a hint for display).
    pub multivalued: bool,
}

impl FieldDefinition {
    pub fn path(key: impl Into<String>, label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            accessor: FieldAccessor::Path(FieldPath::parse(path)),
            multivalued: false,
        }
    }

    pub fn extractor(
        key: impl Into<String>,
        label: impl Into<String>,
        extractor: impl Fn(&Entry) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            accessor: FieldAccessor::Extractor(Arc::new(extractor)),
            multivalued: false,
        }
    }

    pub fn multivalued(mut self, multivalued: bool) -> Self {
        self.multivalued = multivalued;
        self
    }

    /// Raw value for an entry, `None` when absent or unreadable.
    pub fn raw(&self, entry: &Entry) -> Option<Value> {
        match &self.accessor {
            FieldAccessor::Path(path) => path.resolve(&entry.fields),
            FieldAccessor::Extractor(extract) => match extract(entry) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::debug!(field = %self.key, entry = %entry.id, error = ?err, "Treating unreadable field as absent");
                    None
                },
            },
        }
    }

    /// Normalized values for an entry.
    pub fn values(&self, entry: &Entry) -> Vec<FacetValue> {
        self.raw(entry).map(|raw| normalize(&raw)).unwrap_or_default()
    }

    /// Distinct tokens for an entry.
    pub fn tokens(&self, entry: &Entry) -> HashSet<String> {
        self.values(entry).into_iter().map(|value| value.token).collect()
    }
}

/// A path-based field as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub key: String,
    pub label: String,
    pub path: String,
    #[serde(default)]
    pub multivalued: bool,
}

impl From<CustomField> for FieldDefinition {
    fn from(field: CustomField) -> Self {
        FieldDefinition::path(field.key, field.label, field.path).multivalued(field.multivalued)
    }
}

/// A named subset of filter tags that gets its own facet group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagGroup {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Tag tokens belonging to this group.
    pub tags: Vec<String>,
}

impl TagGroup {
    fn field(&self, category: &str) -> Option<FieldDefinition> {
        let members: HashSet<String> = self.tags.iter().map(|tag| token_of(tag)).collect();
        if members.iter().all(String::is_empty) {
            return None;
        }
        let key = format!("filterTagGroup:{category}:{}", self.id);
        let label = self.label.clone().unwrap_or_else(|| self.id.clone());
        let def = FieldDefinition::extractor(key, label, move |entry| {
            let displays = entry
                .filter_tags()
                .map(normalize)
                .unwrap_or_default()
                .into_iter()
                .filter(|value| members.contains(&value.token))
                .map(|value| Value::String(value.display))
                .collect();
            Ok(Value::Array(displays))
        });
        Some(def.multivalued(true))
    }
}

/// Built-in fields for categories every provider is expected to know.
fn default_fields() -> HashMap<String, Vec<FieldDefinition>> {
    let table: &[(&str, &[(&str, &str, &str)])] = &[
        ("Item", &[("type", "Type", "type")]),
        ("Actor", &[("type", "Type", "type")]),
        (
            "JournalEntry",
            &[
                ("pages", "Has Pages", "_hasPages"),
                ("codexType", "Campaign Codex", r#"flags["campaign-codex"].type"#),
                ("sheetClass", "Sheet Type", "_sheetClass"),
            ],
        ),
        (
            "Scene",
            &[("navigation", "In Navigation", "navigation"), ("active", "Active", "active"), ("weather", "Weather", "weather")],
        ),
        ("RollTable", &[("formula", "Formula", "formula"), ("displayRoll", "Display Roll", "displayRoll")]),
        ("Cards", &[("type", "Type", "type")]),
        ("Macro", &[("type", "Type", "type")]),
        ("Playlist", &[("channel", "Channel", "channel")]),
        ("Image", &[("extension", "Extension", "extension")]),
    ];
    table
        .iter()
        .map(|(category, fields)| {
            let defs = fields.iter().map(|(key, label, path)| FieldDefinition::path(*key, *label, *path)).collect();
            (category.to_string(), defs)
        })
        .collect()
}

/// Field definitions per category.
///
/// Resolution order: defaults, then custom fields whose key is not taken,
/// then (for tag-enabled categories) one field per tag group and a catch-all
/// tag field. The resolved list is cached until [`invalidate`](Self::invalidate).
#[derive(Default)]
pub struct FieldCatalog {
    defaults: HashMap<String, Vec<FieldDefinition>>,
    custom: HashMap<String, Vec<FieldDefinition>>,
    tag_groups: HashMap<String, Vec<TagGroup>>,
    tagged: HashSet<String>,
    resolved: RwLock<HashMap<String, Arc<[FieldDefinition]>>>,
}

impl FieldCatalog {
    /// A catalog with no fields at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A catalog seeded with the built-in defaults.
    pub fn with_defaults() -> Self {
        Self {
            defaults: default_fields(),
            ..Self::default()
        }
    }

    /// Replace the default fields of one category.
    pub fn set_defaults(&mut self, category: impl Into<String>, defs: Vec<FieldDefinition>) {
        self.defaults.insert(category.into(), defs);
        self.invalidate();
    }

    /// Add a user field. Ignored at resolution time if its key is taken.
    pub fn add_custom(&mut self, category: impl Into<String>, def: impl Into<FieldDefinition>) {
        self.custom.entry(category.into()).or_default().push(def.into());
        self.invalidate();
    }

    /// Enable tag fields for a category and set its tag groups, in display order.
    pub fn set_tag_groups(&mut self, category: impl Into<String>, groups: Vec<TagGroup>) {
        let category = category.into();
        self.tagged.insert(category.clone());
        self.tag_groups.insert(category, groups);
        self.invalidate();
    }

    /// Drop every cached resolution.
    pub fn invalidate(&self) {
        self.resolved.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Field definitions for a category, resolved once and cached.
    pub fn resolve(&self, category: &str) -> Arc<[FieldDefinition]> {
        if let Some(cached) = self.resolved.read().unwrap_or_else(PoisonError::into_inner).get(category) {
            return Arc::clone(cached);
        }
        let resolved: Arc<[FieldDefinition]> = self.build(category).into();
        tracing::debug!(category, fields = resolved.len(), "Resolved facet fields");
        self.resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(category.to_string(), Arc::clone(&resolved));
        resolved
    }

    fn build(&self, category: &str) -> Vec<FieldDefinition> {
        let mut fields: Vec<FieldDefinition> = self.defaults.get(category).cloned().unwrap_or_default();
        let taken = |fields: &[FieldDefinition], key: &str| fields.iter().any(|field| field.key == key);

        for custom in self.custom.get(category).into_iter().flatten() {
            if !taken(&fields, &custom.key) {
                fields.push(custom.clone());
            }
        }

        if self.tagged.contains(category) {
            for group in self.tag_groups.get(category).into_iter().flatten() {
                if let Some(def) = group.field(category)
                    && !taken(&fields, &def.key)
                {
                    fields.push(def);
                }
            }
            if !taken(&fields, tags::FILTER_TAG) {
                fields.push(FieldDefinition::path(tags::FILTER_TAG, "Tags", tags::filter_tag_path()).multivalued(true));
            }
        }
        fields
    }
}

impl Debug for FieldCatalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FieldCatalog")
            .field("categories", &self.defaults.keys().collect::<Vec<_>>())
            .field("tagged", &self.tagged)
            .finish()
    }
}
