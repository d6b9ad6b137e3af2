//! Position-keyed cache of per-row affordances produced while rendering rows.
//!
//! Entries are keyed by [`IndexPath`], not identity, so they are only valid
//! until the next structural change. The binding clears the whole cache on
//! every full diff and each row overwrites its entry when it is configured
//! again; nothing tries to carry entries across a diff.
use crate::types::IndexPath;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AffordanceKind {
    LeadingActions,
    TrailingActions,
    ContextMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActionStyle {
    #[default]
    Normal,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwipeAction {
    pub identifier: String,
    pub title: String,
    pub style: ActionStyle,
}

impl SwipeAction {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        SwipeAction { identifier: identifier.into(), title: title.into(), style: ActionStyle::Normal }
    }

    pub fn destructive(mut self) -> Self {
        self.style = ActionStyle::Destructive;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMenu {
    pub title: Option<String>,
    pub actions: Vec<SwipeAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Affordance {
    Actions(Vec<SwipeAction>),
    Menu(ContextMenu),
}

/// Everything one row registered during its last configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowAffordances {
    entries: HashMap<AffordanceKind, Affordance>,
}

impl RowAffordances {
    pub fn get(&self, kind: AffordanceKind) -> Option<&Affordance> {
        self.entries.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn set(&mut self, kind: AffordanceKind, value: Affordance) {
        self.entries.insert(kind, value);
    }
}

/// Handed to the content factory while a row is being rendered.
#[derive(Debug)]
pub struct RowContext {
    position: IndexPath,
    affordances: RowAffordances,
}

impl RowContext {
    pub(crate) fn new(position: IndexPath) -> Self {
        RowContext { position, affordances: RowAffordances::default() }
    }

    pub fn position(&self) -> IndexPath {
        self.position
    }

    pub fn leading_actions(&mut self, actions: Vec<SwipeAction>) {
        self.affordances.set(AffordanceKind::LeadingActions, Affordance::Actions(actions));
    }

    pub fn trailing_actions(&mut self, actions: Vec<SwipeAction>) {
        self.affordances.set(AffordanceKind::TrailingActions, Affordance::Actions(actions));
    }

    pub fn context_menu(&mut self, menu: ContextMenu) {
        self.affordances.set(AffordanceKind::ContextMenu, Affordance::Menu(menu));
    }

    pub(crate) fn into_affordances(self) -> RowAffordances {
        self.affordances
    }
}

#[derive(Debug, Default)]
pub struct RenderCache {
    rows: HashMap<IndexPath, RowAffordances>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites any prior value of `kind` at `position`.
    pub fn record_affordance(&mut self, position: IndexPath, kind: AffordanceKind, value: Affordance) {
        self.rows.entry(position).or_default().set(kind, value);
    }

    /// Replaces everything known about `position` with what its latest render produced.
    pub fn replace_row(&mut self, position: IndexPath, affordances: RowAffordances) {
        if affordances.is_empty() {
            self.rows.remove(&position);
        } else {
            self.rows.insert(position, affordances);
        }
    }

    pub fn affordance(&self, position: IndexPath, kind: AffordanceKind) -> Option<&Affordance> {
        self.rows.get(&position).and_then(|row| row.get(kind))
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
