//! Section/item model and the value types shared by the engine and the list control
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Bounds every section or item identity must satisfy.
pub trait Identity: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Identity for T where T: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static {}

/// An item with a stable identity. Identity must not change across update cycles.
pub trait Identifiable {
    type Id: Identity;

    fn id(&self) -> Self::Id;
}

/// An ordered, uniquely keyed group of items.
///
/// The section value itself is handed to header/footer factories; only its
/// identity takes part in reconciliation.
pub trait ItemsSection: Send + Sync + 'static {
    type Id: Identity;
    type Item: Identifiable + PartialEq + Send + Sync + 'static;

    fn id(&self) -> Self::Id;

    fn items(&self) -> &[Self::Item];
}

pub type SectionIdOf<S> = <S as ItemsSection>::Id;
pub type ItemIdOf<S> = <<S as ItemsSection>::Item as Identifiable>::Id;

/// Plain keyed section for callers that have no section type of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct ListSection<K, T> {
    pub key: K,
    pub items: Vec<T>,
}

impl<K, T> ListSection<K, T> {
    pub fn new(key: K, items: Vec<T>) -> Self {
        ListSection { key, items }
    }
}

impl<K, T> ItemsSection for ListSection<K, T>
where
    K: Identity,
    T: Identifiable + PartialEq + Send + Sync + 'static,
{
    type Id = K;
    type Item = T;

    fn id(&self) -> K {
        self.key.clone()
    }

    fn items(&self) -> &[T] {
        &self.items
    }
}

macro_rules! self_identified {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identifiable for $ty {
                type Id = $ty;

                fn id(&self) -> $ty {
                    self.clone()
                }
            }
        )*
    };
}

// Scalars and strings are their own identity.
self_identified!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, char, String, &'static str);

/// Position of a row: section index plus row index within that section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexPath {
    pub section: usize,
    pub row: usize,
}

impl IndexPath {
    pub const fn new(section: usize, row: usize) -> Self {
        IndexPath { section, row }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgeInsets {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
}

impl EdgeInsets {
    pub const ZERO: EdgeInsets = EdgeInsets { top: 0.0, left: 0.0, bottom: 0.0, right: 0.0 };

    pub const fn new(top: f32, left: f32, bottom: f32, right: f32) -> Self {
        EdgeInsets { top, left, bottom, right }
    }
}

/// Change action enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    Insert,
    Remove,
    Move,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeAction::Insert => "INSERT",
            ChangeAction::Remove => "REMOVE",
            ChangeAction::Move => "MOVE",
        };
        f.write_str(name)
    }
}

/// One step of a structural update.
///
/// Deletions address old positions, insertions address new positions and
/// moves go from an old position to a new one, as in a batch update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change<S, I> {
    DeleteSection { id: S, index: usize },
    InsertSection { id: S, index: usize },
    MoveSection { id: S, from: usize, to: usize },
    DeleteItem { id: I, at: IndexPath },
    InsertItem { id: I, at: IndexPath },
    MoveItem { id: I, from: IndexPath, to: IndexPath },
}

impl<S, I> Change<S, I> {
    pub fn action(&self) -> ChangeAction {
        match self {
            Change::DeleteSection { .. } | Change::DeleteItem { .. } => ChangeAction::Remove,
            Change::InsertSection { .. } | Change::InsertItem { .. } => ChangeAction::Insert,
            Change::MoveSection { .. } | Change::MoveItem { .. } => ChangeAction::Move,
        }
    }

    pub fn is_section_level(&self) -> bool {
        matches!(
            self,
            Change::DeleteSection { .. } | Change::InsertSection { .. } | Change::MoveSection { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_section_exposes_key_and_items() {
        let section = ListSection::new("A", vec![1u32, 2, 3]);
        assert_eq!(section.id(), "A");
        assert_eq!(section.items().len(), 3);
        assert_eq!(section.items()[1].id(), 2);
    }

    #[test]
    fn change_actions_and_levels() {
        let insert: Change<&str, u32> = Change::InsertItem { id: 4, at: IndexPath::new(0, 3) };
        assert_eq!(insert.action(), ChangeAction::Insert);
        assert!(!insert.is_section_level());

        let removal: Change<&str, u32> = Change::DeleteSection { id: "A", index: 0 };
        assert_eq!(removal.action().to_string(), "REMOVE");
        assert!(removal.is_section_level());
    }

    #[test]
    fn index_path_orders_by_section_then_row() {
        assert!(IndexPath::new(0, 9) < IndexPath::new(1, 0));
        assert_eq!(IndexPath::new(2, 5).to_string(), "[2, 5]");
    }
}
