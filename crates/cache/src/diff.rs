use librarian_model::Entry;
use std::collections::HashMap;

/// Classification of what changed between two snapshots of one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Ids only in the next snapshot, sorted.
    pub added: Vec<String>,
    /// Ids only in the previous snapshot, sorted.
    pub removed: Vec<String>,
    /// Present in both snapshots with a different content signature.
    pub changed: usize,
}
impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed == 0
    }
}

fn signatures(entries: &[Entry]) -> HashMap<&str, String> {
    entries
        .iter()
        .filter_map(|entry| Some((entry.identity()?, entry.signature())))
        .collect()
}

/// Compare two snapshots by entry identity.
///
/// Entries without an id or image reference have no identity and are
/// ignored on both sides.
pub fn diff(previous: &[Entry], next: &[Entry]) -> Diff {
    let before = signatures(previous);
    let after = signatures(next);
    let mut result = Diff::default();
    for (id, signature) in &after {
        match before.get(id) {
            None => result.added.push(id.to_string()),
            Some(old) if old != signature => result.changed += 1,
            Some(_) => {},
        }
    }
    result.removed = before.keys().filter(|id| !after.contains_key(*id)).map(|id| id.to_string()).collect();
    result.added.sort();
    result.removed.sort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(path: &str) -> Entry {
        Entry::new(path, path.rsplit('/').next().unwrap_or(path), "Image").with_image(path)
    }

    #[test]
    fn test_identical_snapshots_have_no_changes() {
        let entries = vec![image("maps/cave.webp"), image("maps/keep.webp")];
        assert!(diff(&entries, &entries.clone()).is_empty());
    }

    #[test]
    fn test_added_removed_changed() {
        let previous = vec![
            image("maps/cave.webp"),
            image("maps/keep.webp"),
            image("tokens/goblin.png").with_fields(json!({"extension": "png"})),
        ];
        let next = vec![
            image("maps/cave.webp"),
            image("tokens/goblin.png").with_fields(json!({"extension": "webp"})),
            image("tokens/orc.png"),
            image("tokens/troll.png"),
        ];
        let result = diff(&previous, &next);
        assert_eq!(result.added, ["tokens/orc.png", "tokens/troll.png"]);
        assert_eq!(result.removed, ["maps/keep.webp"]);
        assert_eq!(result.changed, 1);
    }

    #[test]
    fn test_moving_folder_is_a_change() {
        let previous = vec![Entry::new("s1", "Tavern", "Scene")];
        let next = vec![Entry::new("s1", "Tavern", "Scene").with_folder("town")];
        assert_eq!(diff(&previous, &next).changed, 1);
    }

    #[test]
    fn test_entries_without_identity_are_ignored() {
        let previous = vec![Entry::new("", "ghost", "Image")];
        let next = vec![Entry::new("", "spectre", "Image"), Entry::new("", "", "Image").with_image("a.png")];
        let result = diff(&previous, &next);
        assert_eq!(result, Diff { added: vec!["a.png".to_string()], removed: Vec::new(), changed: 0 });
    }
}
