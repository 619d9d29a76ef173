use crate::sort::natural_cmp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A node in a folder hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// One-based depth, assigned when the tree is built.
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub sort: i64,
    /// Entries directly inside this folder (not counting descendants).
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub children: Vec<Folder>,
}

impl Folder {
    pub fn new(id: impl Into<String>, name: impl Into<String>, parent: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent,
            depth: 0,
            sort: 0,
            count: 0,
            children: Vec::new(),
        }
    }

    /// Entries in this folder and every descendant.
    pub fn total(&self) -> usize {
        self.count + self.children.iter().map(Folder::total).sum::<usize>()
    }

    /// Depth-first search for a folder by id.
    pub fn find(&self, id: &str) -> Option<&Folder> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    fn collect_ids(&self, ids: &mut HashSet<String>) {
        ids.insert(self.id.clone());
        for child in &self.children {
            child.collect_ids(ids);
        }
    }
}

/// Nest a flat folder list into a tree.
///
/// Folders whose parent is missing from the list become roots. Siblings are
/// ordered by `sort`, then by [`natural_cmp`] on their names. Depth is
/// recomputed from the tree shape.
pub fn build_tree(folders: impl IntoIterator<Item = Folder>) -> Vec<Folder> {
    let folders: Vec<Folder> = folders.into_iter().collect();
    let known: HashSet<String> = folders.iter().map(|folder| folder.id.clone()).collect();
    let mut roots = Vec::new();
    let mut by_parent: HashMap<String, Vec<Folder>> = HashMap::new();
    for folder in folders {
        match folder.parent.as_ref().filter(|parent| known.contains(*parent)) {
            Some(parent) => by_parent.entry(parent.clone()).or_default().push(folder),
            None => roots.push(folder),
        }
    }
    attach(&mut roots, &mut by_parent, 1);
    roots
}

// Each parent's children are removed from the map as they're attached, so a
// parent cycle cannot recurse forever; its members are simply dropped.
fn attach(level: &mut [Folder], by_parent: &mut HashMap<String, Vec<Folder>>, depth: u32) {
    for folder in level.iter_mut() {
        folder.depth = depth;
        if let Some(children) = by_parent.remove(&folder.id) {
            folder.children.extend(children);
        }
        attach(&mut folder.children, by_parent, depth + 1);
    }
    level.sort_by(|a, b| a.sort.cmp(&b.sort).then_with(|| natural_cmp(&a.name, &b.name)));
}

/// Build a hierarchy from `/`-separated folder paths, one per entry.
///
/// Every path segment becomes a folder whose id is the path up to and
/// including that segment. The deepest folder of each path is counted once.
/// Empty paths are skipped.
pub fn tree_from_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<Folder> {
    let mut nodes: BTreeMap<String, Folder> = BTreeMap::new();
    for path in paths {
        let parts: Vec<&str> = path.trim().split('/').filter(|part| !part.is_empty()).collect();
        let mut parent: Option<String> = None;
        let mut current = String::new();
        for (index, part) in parts.iter().enumerate() {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            let node = nodes.entry(current.clone()).or_insert_with(|| Folder::new(current.clone(), *part, parent.clone()));
            if index + 1 == parts.len() {
                node.count += 1;
            }
            parent = Some(current.clone());
        }
    }
    build_tree(nodes.into_values())
}

/// Ids of `root` and all of its descendants, or `None` if no folder in the
/// hierarchy has that id.
pub fn subtree_ids(hierarchy: &[Folder], root: &str) -> Option<HashSet<String>> {
    let folder = hierarchy.iter().find_map(|folder| folder.find(root))?;
    let mut ids = HashSet::new();
    folder.collect_ids(&mut ids);
    Some(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: &str, name: &str, parent: Option<&str>, sort: i64) -> Folder {
        let mut folder = Folder::new(id, name, parent.map(str::to_string));
        folder.sort = sort;
        folder
    }

    fn names(level: &[Folder]) -> Vec<&str> {
        level.iter().map(|folder| folder.name.as_str()).collect()
    }

    #[test]
    fn test_build_tree_nests_and_sorts() {
        let tree = build_tree([
            folder("c", "Chapter 10", Some("root"), 0),
            folder("b", "chapter 2", Some("root"), 0),
            folder("root", "Adventures", None, 0),
            folder("first", "Zeta", Some("root"), -1),
            folder("other", "Maps", None, 0),
        ]);
        assert_eq!(names(&tree), vec!["Adventures", "Maps"]);
        assert_eq!(names(&tree[0].children), vec!["Zeta", "chapter 2", "Chapter 10"]);
        assert_eq!(tree[0].children[0].depth, 2);
    }

    #[test]
    fn test_orphans_become_roots() {
        let tree = build_tree([folder("a", "Alpha", Some("missing"), 0)]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].depth, 1);
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let tree = build_tree([folder("a", "A", Some("b"), 0), folder("b", "B", Some("a"), 0)]);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_tree_from_paths_counts_leaves() {
        let tree = tree_from_paths(["maps/dungeons", "maps/dungeons", "maps", "tokens", "", "maps/cities/"]);
        assert_eq!(names(&tree), vec!["maps", "tokens"]);
        let maps = &tree[0];
        assert_eq!(maps.count, 1);
        assert_eq!(maps.total(), 4);
        assert_eq!(names(&maps.children), vec!["cities", "dungeons"]);
        assert_eq!(maps.children[1].id, "maps/dungeons");
        assert_eq!(maps.children[1].parent.as_deref(), Some("maps"));
        assert_eq!(maps.children[1].count, 2);
    }

    #[test]
    fn test_subtree_ids() {
        let tree = tree_from_paths(["maps/dungeons/deep", "maps/cities", "tokens"]);
        let ids = subtree_ids(&tree, "maps/dungeons").unwrap();
        assert_eq!(ids, HashSet::from(["maps/dungeons".to_string(), "maps/dungeons/deep".to_string()]));
        assert!(subtree_ids(&tree, "nowhere").is_none());
    }
}
