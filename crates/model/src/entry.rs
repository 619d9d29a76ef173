use crate::tags;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single catalog entry: a document, scene, image or anything else a
/// provider can list.
///
/// Entries are snapshots. Nothing in the engine mutates an entry it did not
/// receive through an explicit tag update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable identifier, unique within a source and category.
    pub id: String,
    /// Display name, also the target of text search.
    pub name: String,
    /// Category the entry belongs to (`Item`, `Actor`, `Image`, ...).
    pub kind: String,
    /// Source image reference used for thumbnails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Containing folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// Manual sort position within the folder.
    #[serde(default)]
    pub sort: i64,
    /// Arbitrary structured data that facet fields are read from.
    #[serde(default)]
    pub fields: Value,
}

impl Entry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            image: None,
            folder: None,
            sort: 0,
            fields: Value::Null,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_sort(mut self, sort: i64) -> Self {
        self.sort = sort;
        self
    }

    /// Raw filter tag value, if any.
    pub fn filter_tags(&self) -> Option<&Value> {
        tags::scope(&self.fields)?.get(tags::FILTER_TAG)
    }

    pub fn category_tag(&self) -> Option<&str> {
        tags::scope(&self.fields)?.get(tags::CATEGORY_TAG)?.as_str()
    }

    /// Replace the entry's tags. An empty category or an empty tag list
    /// removes the corresponding key.
    pub fn set_tags(&mut self, category: Option<String>, filter: Vec<String>) {
        let category = category.map(|tag| tags::normalize_tag(&tag)).filter(|tag| !tag.is_empty());
        let filter: Vec<Value> = filter
            .iter()
            .map(|tag| tags::normalize_tag(tag))
            .filter(|tag| !tag.is_empty())
            .map(Value::String)
            .collect();
        tags::update_scope(&mut self.fields, |scope| {
            match category {
                Some(tag) => scope.insert(tags::CATEGORY_TAG.to_string(), Value::String(tag)),
                None => scope.remove(tags::CATEGORY_TAG),
            };
            match filter.is_empty() {
                true => scope.remove(tags::FILTER_TAG),
                false => scope.insert(tags::FILTER_TAG.to_string(), Value::Array(filter)),
            };
        });
    }

    /// Identity used when comparing snapshots: the id, falling back to the
    /// image reference. Entries with neither have no identity.
    pub fn identity(&self) -> Option<&str> {
        Some(self.id.as_str())
            .filter(|id| !id.is_empty())
            .or_else(|| self.image.as_deref().filter(|image| !image.is_empty()))
    }

    /// BLAKE3 digest over everything a user can see change.
    pub fn signature(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [
            self.image.as_deref().unwrap_or_default(),
            self.name.as_str(),
            self.folder.as_deref().unwrap_or_default(),
            self.kind.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        // serde_json objects are ordered maps, so this is deterministic.
        hasher.update(self.fields.to_string().as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}
