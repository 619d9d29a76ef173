//! Faceted filtering over catalog entries.
//!
//! Every field of an entry that a [`FieldDefinition`] describes becomes a
//! facet group whose options are the normalized values found across the
//! candidate set. Options carry a tri-state [`FilterState`]: include (any
//! of), and (all of) or exclude (none of). Selections are carried across
//! rebuilds by token so that changing one group never silently drops
//! another group's selection.
//!
//! ```
//! use librarian_facet::{DisplayRegistry, FieldDefinition, FilterState, build_groups, recompute, set_state};
//! use librarian_model::Entry;
//! use serde_json::json;
//!
//! let entries = vec![
//!     Entry::new("1", "Sword", "Item").with_fields(json!({"type": "weapon"})),
//!     Entry::new("2", "Shield", "Item").with_fields(json!({"type": "armor"})),
//! ];
//! let candidates: Vec<&Entry> = entries.iter().collect();
//! let defs = vec![FieldDefinition::path("type", "Type", "type")];
//! let mut registry = DisplayRegistry::new();
//!
//! let mut groups = build_groups(&candidates, &defs, &mut registry);
//! set_state(&mut groups, "type", "weapon", FilterState::Include).unwrap();
//! let result = recompute(&candidates, &defs, &groups, &mut registry, None);
//! assert_eq!(result.filtered.len(), 1);
//! assert_eq!(result.groups[0].options.len(), 2);
//! ```

mod engine;
pub mod error;
mod field;
mod label;
mod normalize;
mod path;
mod state;

pub use crate::engine::{
    DisplayRegistry, FacetGroup, FacetOption, Recomputed, SelectionKey, apply, build_group, build_groups, recompute,
    selection_key, set_state,
};
pub use crate::field::{CustomField, Extractor, FieldAccessor, FieldCatalog, FieldDefinition, TagGroup};
pub use crate::label::humanize;
pub use crate::normalize::{FacetValue, normalize, token_of};
pub use crate::path::{FieldPath, lookup};
pub use crate::state::FilterState;
