//! Facet group construction and tri-state filtering.
//!
//! Semantics within one group:
//! - an `Exclude` token on the entry rejects it outright,
//! - every `And` token must be on the entry,
//! - at least one `Include` token must be on the entry (when any exist).
//!
//! Groups combine with AND.

use crate::error::{ErrorKind, Result};
use crate::field::FieldDefinition;
use crate::label::humanize;
use crate::normalize::FacetValue;
use crate::state::FilterState;
use librarian_model::{Entry, natural_cmp};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One selectable value within a facet group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetOption {
    pub token: String,
    /// First-seen display text for the token.
    pub display: String,
    /// Presentable form of `display`.
    pub label: String,
    /// Candidates carrying this token.
    pub count: usize,
    pub state: FilterState,
}

/// Options for one field, ordered by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetGroup {
    pub key: String,
    pub label: String,
    pub multivalued: bool,
    pub options: Vec<FacetOption>,
}

impl FacetGroup {
    /// `true` if any option is in a state other than `Off`.
    pub fn is_active(&self) -> bool {
        self.options.iter().any(|option| option.state.is_active())
    }

    pub fn option(&self, token: &str) -> Option<&FacetOption> {
        self.options.iter().find(|option| option.token == token)
    }

    fn tokens_in(&self, state: FilterState) -> impl Iterator<Item = &str> {
        self.options.iter().filter(move |option| option.state == state).map(|option| option.token.as_str())
    }
}

/// First-seen display text per `(field, token)`.
///
/// Owned by whoever drives rebuilds and passed into each one, so the display
/// chosen for a token stays stable across rebuilds of different subsets.
#[derive(Debug, Default, Clone)]
pub struct DisplayRegistry {
    displays: HashMap<String, HashMap<String, String>>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` unless its token already has a display, and return the
    /// display that wins.
    pub fn register(&mut self, field: &str, value: FacetValue) -> &str {
        self.displays.entry(field.to_string()).or_default().entry(value.token).or_insert(value.display)
    }

    pub fn display(&self, field: &str, token: &str) -> Option<&str> {
        self.displays.get(field)?.get(token).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.displays.clear();
    }
}

/// Build the option list for one field over a candidate set.
///
/// Each candidate counts once per distinct token. Returns `None` when no
/// candidate carries a value for the field.
pub fn build_group(candidates: &[&Entry], def: &FieldDefinition, registry: &mut DisplayRegistry) -> Option<FacetGroup> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for entry in candidates {
        let mut seen = HashSet::new();
        for value in def.values(entry) {
            if seen.insert(value.token.clone()) {
                *counts.entry(value.token.clone()).or_default() += 1;
                registry.register(&def.key, value);
            }
        }
    }
    if counts.is_empty() {
        return None;
    }
    let mut options: Vec<FacetOption> = counts
        .into_iter()
        .map(|(token, count)| {
            let display = registry.display(&def.key, &token).unwrap_or(token.as_str()).to_string();
            FacetOption {
                label: humanize(&display),
                display,
                token,
                count,
                state: FilterState::Off,
            }
        })
        .collect();
    options.sort_by(|a, b| natural_cmp(&a.label, &b.label).then_with(|| a.token.cmp(&b.token)));
    Some(FacetGroup {
        key: def.key.clone(),
        label: def.label.clone(),
        multivalued: def.multivalued,
        options,
    })
}

/// Build every non-empty group, in field-definition order.
pub fn build_groups(candidates: &[&Entry], defs: &[FieldDefinition], registry: &mut DisplayRegistry) -> Vec<FacetGroup> {
    defs.iter().filter_map(|def| build_group(candidates, def, registry)).collect()
}

/// Active constraints of one group, ready to test entries against.
struct Criteria<'g> {
    def: &'g FieldDefinition,
    include: HashSet<&'g str>,
    and: Vec<&'g str>,
    exclude: HashSet<&'g str>,
}

impl<'g> Criteria<'g> {
    fn prepare(groups: &'g [FacetGroup], defs: &'g [FieldDefinition], skip: Option<&str>) -> Vec<Self> {
        groups
            .iter()
            .filter(|group| group.is_active() && Some(group.key.as_str()) != skip)
            .filter_map(|group| {
                let Some(def) = defs.iter().find(|def| def.key == group.key) else {
                    tracing::debug!(group = %group.key, "Ignoring selection for a field that is no longer defined");
                    return None;
                };
                Some(Self {
                    def,
                    include: group.tokens_in(FilterState::Include).collect(),
                    and: group.tokens_in(FilterState::And).collect(),
                    exclude: group.tokens_in(FilterState::Exclude).collect(),
                })
            })
            .collect()
    }

    fn matches(&self, entry: &Entry) -> bool {
        let tokens = self.def.tokens(entry);
        if tokens.iter().any(|token| self.exclude.contains(token.as_str())) {
            return false;
        }
        if !self.and.iter().all(|required| tokens.contains(*required)) {
            return false;
        }
        self.include.is_empty() || tokens.iter().any(|token| self.include.contains(token.as_str()))
    }
}

fn apply_except<'a>(
    candidates: &[&'a Entry],
    groups: &[FacetGroup],
    defs: &[FieldDefinition],
    skip: Option<&str>,
) -> Vec<&'a Entry> {
    let criteria = Criteria::prepare(groups, defs, skip);
    if criteria.is_empty() {
        return candidates.to_vec();
    }
    candidates.iter().copied().filter(|entry| criteria.iter().all(|c| c.matches(entry))).collect()
}

/// Filter candidates by every active group. Order is preserved.
pub fn apply<'a>(candidates: &[&'a Entry], groups: &[FacetGroup], defs: &[FieldDefinition]) -> Vec<&'a Entry> {
    apply_except(candidates, groups, defs, None)
}

/// Active selections as sorted `(group key, token, state)` triples.
pub type SelectionKey = Vec<(String, String, FilterState)>;

/// Deterministic fingerprint of the active selections, for cache keys.
///
/// Kept structured rather than joined into a string, since tokens are free
/// text and may contain any separator.
pub fn selection_key(groups: &[FacetGroup]) -> SelectionKey {
    let mut parts: SelectionKey = groups
        .iter()
        .flat_map(|group| {
            group
                .options
                .iter()
                .filter(|option| option.state.is_active())
                .map(move |option| (group.key.clone(), option.token.clone(), option.state))
        })
        .collect();
    parts.sort();
    parts
}

/// Set one option's state, returning its previous state.
pub fn set_state(groups: &mut [FacetGroup], key: &str, token: &str, state: FilterState) -> Result<FilterState> {
    let group = groups
        .iter_mut()
        .find(|group| group.key == key)
        .ok_or_else(|| ErrorKind::UnknownGroup(key.to_string()))?;
    let option = group.options.iter_mut().find(|option| option.token == token).ok_or_else(|| {
        ErrorKind::UnknownOption {
            group: key.to_string(),
            token: token.to_string(),
        }
    })?;
    Ok(std::mem::replace(&mut option.state, state))
}

/// Result of one filter pass.
#[derive(Debug, Clone)]
pub struct Recomputed<'a> {
    pub filtered: Vec<&'a Entry>,
    pub groups: Vec<FacetGroup>,
}

/// Filter the candidates and rebuild every group's options.
///
/// Groups without a selection are rebuilt from the filtered set, so their
/// counts describe what is on screen; `shared` may supply that list when the
/// caller has it memoized. A group with a selection is rebuilt from the
/// candidates filtered by every *other* group, so its own alternatives stay
/// visible. Previous states are carried over by token. A selected option
/// whose token no longer occurs is kept with a count of zero.
pub fn recompute<'a>(
    candidates: &[&'a Entry],
    defs: &[FieldDefinition],
    previous: &[FacetGroup],
    registry: &mut DisplayRegistry,
    shared: Option<&[FacetGroup]>,
) -> Recomputed<'a> {
    let filtered = apply(candidates, previous, defs);
    let mut by_key: HashMap<String, FacetGroup> = match shared {
        Some(groups) => groups.iter().map(|group| (group.key.clone(), group.clone())).collect(),
        None => build_groups(&filtered, defs, registry).into_iter().map(|group| (group.key.clone(), group)).collect(),
    };

    let mut subsets: HashMap<&str, Vec<&'a Entry>> = HashMap::new();
    for old in previous {
        if !old.is_active() {
            if let Some(fresh) = by_key.get_mut(&old.key) {
                carry_states(old, fresh, false);
            }
            continue;
        }
        let Some(def) = defs.iter().find(|def| def.key == old.key) else {
            continue;
        };
        let subset = subsets
            .entry(old.key.as_str())
            .or_insert_with(|| apply_except(candidates, previous, defs, Some(old.key.as_str())));
        let mut rebuilt = build_group(subset, def, registry).unwrap_or_else(|| FacetGroup {
            key: def.key.clone(),
            label: def.label.clone(),
            multivalued: def.multivalued,
            options: Vec::new(),
        });
        carry_states(old, &mut rebuilt, true);
        by_key.insert(old.key.clone(), rebuilt);
    }

    let groups = defs.iter().filter_map(|def| by_key.remove(&def.key)).collect();
    Recomputed { filtered, groups }
}

fn carry_states(old: &FacetGroup, fresh: &mut FacetGroup, keep_vanished: bool) {
    let mut appended = false;
    for previous in &old.options {
        match fresh.options.iter_mut().find(|option| option.token == previous.token) {
            Some(option) => option.state = previous.state,
            None if keep_vanished && previous.state.is_active() => {
                fresh.options.push(FacetOption { count: 0, ..previous.clone() });
                appended = true;
            },
            None => {},
        }
    }
    if appended {
        fresh.options.sort_by(|a, b| natural_cmp(&a.label, &b.label).then_with(|| a.token.cmp(&b.token)));
    }
}
