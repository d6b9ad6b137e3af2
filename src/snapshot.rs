//! Snapshot builder: freezes the caller's sections into ordered identities
use crate::errors::ReconcilerError;
use crate::types::{IndexPath, Identifiable, Identity, ItemIdOf, ItemsSection, SectionIdOf};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Ordered section identities, each with its ordered item identities.
///
/// Two snapshots are identical iff section order and every section's item
/// order match exactly.
#[derive(Debug, Clone)]
pub struct Snapshot<S: Identity, I: Identity> {
    sections: IndexMap<S, Vec<I>>,
    item_count: usize,
}

// IndexMap equality ignores order; identity order is what matters here.
impl<S: Identity, I: Identity> PartialEq for Snapshot<S, I> {
    fn eq(&self, other: &Self) -> bool {
        self.item_count == other.item_count && self.sections.iter().eq(other.sections.iter())
    }
}

impl<S: Identity, I: Identity> Eq for Snapshot<S, I> {}

impl<S: Identity, I: Identity> Default for Snapshot<S, I> {
    fn default() -> Self {
        Snapshot { sections: IndexMap::new(), item_count: 0 }
    }
}

impl<S: Identity, I: Identity> Snapshot<S, I> {
    /// Builds a snapshot, preserving the input order verbatim.
    ///
    /// Fails with `MalformedInput` when a section identity or an item
    /// identity appears twice anywhere in the input.
    pub fn build<T>(sections: &[T]) -> Result<Self, ReconcilerError>
    where
        T: ItemsSection<Id = S>,
        T::Item: Identifiable<Id = I>,
    {
        let mut map: IndexMap<S, Vec<I>> = IndexMap::with_capacity(sections.len());
        let mut seen: HashMap<I, IndexPath> = HashMap::new();

        for (section_index, section) in sections.iter().enumerate() {
            let section_id = section.id();
            if let Some(first) = map.get_index_of(&section_id) {
                return Err(ReconcilerError::duplicate_section(section_id, first, section_index));
            }

            let mut ids = Vec::with_capacity(section.items().len());
            for (row, item) in section.items().iter().enumerate() {
                let item_id = item.id();
                let here = IndexPath::new(section_index, row);
                if let Some(first) = seen.insert(item_id.clone(), here) {
                    return Err(ReconcilerError::duplicate_item(item_id, first, here));
                }
                ids.push(item_id);
            }
            map.insert(section_id, ids);
        }

        Ok(Snapshot { sections: map, item_count: seen.len() })
    }

    pub fn number_of_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn number_of_items(&self) -> usize {
        self.item_count
    }

    pub fn number_of_items_in(&self, section: usize) -> Option<usize> {
        self.sections.get_index(section).map(|(_, items)| items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0 && self.sections.is_empty()
    }

    pub fn section_identifiers(&self) -> impl Iterator<Item = &S> {
        self.sections.keys()
    }

    pub fn section_id_at(&self, index: usize) -> Option<&S> {
        self.sections.get_index(index).map(|(id, _)| id)
    }

    pub fn index_of_section(&self, id: &S) -> Option<usize> {
        self.sections.get_index_of(id)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&S, &[I])> {
        self.sections.iter().map(|(id, items)| (id, items.as_slice()))
    }

    pub fn items_in(&self, section: usize) -> Option<&[I]> {
        self.sections.get_index(section).map(|(_, items)| items.as_slice())
    }

    /// Item identities flattened across sections, in display order.
    pub fn item_identifiers(&self) -> impl Iterator<Item = &I> {
        self.sections.values().flatten()
    }

    pub fn item_at(&self, path: IndexPath) -> Option<&I> {
        self.items_in(path.section).and_then(|items| items.get(path.row))
    }

    /// True when `path` addresses a row that exists in this snapshot.
    pub fn contains(&self, path: IndexPath) -> bool {
        self.item_at(path).is_some()
    }

    pub fn last_index_path(&self) -> Option<IndexPath> {
        let (section, (_, items)) = self.sections.iter().enumerate().last()?;
        let row = items.len().checked_sub(1)?;
        Some(IndexPath::new(section, row))
    }

    /// Maps every item identity to its position.
    pub(crate) fn locations(&self) -> HashMap<&I, IndexPath> {
        let mut locations = HashMap::with_capacity(self.item_count);
        for (section, items) in self.sections.values().enumerate() {
            for (row, id) in items.iter().enumerate() {
                locations.insert(id, IndexPath::new(section, row));
            }
        }
        locations
    }
}

/// One accepted update request: the caller's sections plus their snapshot.
#[derive(Debug)]
pub struct Submission<T: ItemsSection> {
    pub sequence: u64,
    pub sections: Vec<T>,
    pub snapshot: Snapshot<SectionIdOf<T>, ItemIdOf<T>>,
}

impl<T: ItemsSection> Submission<T> {
    pub fn new(sequence: u64, sections: Vec<T>) -> Result<Self, ReconcilerError> {
        let snapshot = Snapshot::build(&sections)?;
        Ok(Submission { sequence, sections, snapshot })
    }

    pub(crate) fn empty() -> Self {
        Submission { sequence: 0, sections: Vec::new(), snapshot: Snapshot::default() }
    }

    pub fn item_at(&self, path: IndexPath) -> Option<&T::Item> {
        self.sections.get(path.section).and_then(|s| s.items().get(path.row))
    }

    pub fn section_at(&self, index: usize) -> Option<&T> {
        self.sections.get(index)
    }

    /// Same identities and every item value-equal. Section values are ignored.
    pub fn is_identical_to(&self, other: &Submission<T>) -> bool {
        self.snapshot == other.snapshot
            && self
                .sections
                .iter()
                .zip(&other.sections)
                .all(|(a, b)| a.items() == b.items())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ListSection;

    fn sections(layout: &[(&'static str, &[u32])]) -> Vec<ListSection<&'static str, u32>> {
        layout.iter().map(|(k, items)| ListSection::new(*k, items.to_vec())).collect()
    }

    #[test]
    fn build_preserves_input_order() {
        let snapshot = Snapshot::build(&sections(&[("B", &[3, 1]), ("A", &[2])])).unwrap();
        let ids: Vec<_> = snapshot.section_identifiers().copied().collect();
        assert_eq!(ids, vec!["B", "A"]);
        let items: Vec<_> = snapshot.item_identifiers().copied().collect();
        assert_eq!(items, vec![3, 1, 2]);
        assert_eq!(snapshot.number_of_items(), 3);
        assert_eq!(snapshot.item_at(IndexPath::new(1, 0)), Some(&2));
        assert_eq!(snapshot.last_index_path(), Some(IndexPath::new(1, 0)));
    }

    #[test]
    fn equality_is_order_sensitive() {
        let ab = Snapshot::build(&sections(&[("A", &[1]), ("B", &[2])])).unwrap();
        let ba = Snapshot::build(&sections(&[("B", &[2]), ("A", &[1])])).unwrap();
        let swapped = Snapshot::build(&sections(&[("A", &[2]), ("B", &[1])])).unwrap();
        assert_ne!(ab, ba);
        assert_ne!(ab, swapped);
        assert_eq!(ab, ab.clone());
    }

    #[test]
    fn duplicate_item_across_sections_is_malformed() {
        let err = Snapshot::build(&sections(&[("A", &[1, 2]), ("B", &[2])])).unwrap_err();
        match err {
            ReconcilerError::MalformedInput { details } => {
                assert!(details.contains("[0, 1]"), "{details}");
                assert!(details.contains("[1, 0]"), "{details}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_section_is_malformed() {
        let err = Snapshot::build(&sections(&[("A", &[1]), ("A", &[2])])).unwrap_err();
        assert!(matches!(err, ReconcilerError::MalformedInput { .. }));
    }

    #[test]
    fn out_of_range_lookups_return_none() {
        let snapshot = Snapshot::build(&sections(&[("A", &[1])])).unwrap();
        assert!(!snapshot.contains(IndexPath::new(0, 1)));
        assert!(!snapshot.contains(IndexPath::new(3, 0)));
        assert_eq!(snapshot.number_of_items_in(1), None);
    }

    #[test]
    fn empty_trailing_section_has_no_last_row() {
        let snapshot = Snapshot::build(&sections(&[("A", &[1]), ("B", &[])])).unwrap();
        assert_eq!(snapshot.last_index_path(), None);
        assert!(!snapshot.is_empty());
        assert!(Snapshot::<&str, u32>::default().is_empty());
    }

    #[test]
    fn identical_ignores_section_values_but_not_item_values() {
        #[derive(Debug, Clone, PartialEq)]
        struct Row {
            id: u32,
            title: &'static str,
        }
        impl Identifiable for Row {
            type Id = u32;
            fn id(&self) -> u32 {
                self.id
            }
        }

        let a = Submission::new(1, vec![ListSection::new("A", vec![Row { id: 1, title: "one" }])]).unwrap();
        let same = Submission::new(2, vec![ListSection::new("A", vec![Row { id: 1, title: "one" }])]).unwrap();
        let edited = Submission::new(3, vec![ListSection::new("A", vec![Row { id: 1, title: "uno" }])]).unwrap();

        assert!(a.is_identical_to(&same));
        assert_eq!(a.snapshot, edited.snapshot);
        assert!(!a.is_identical_to(&edited));
    }
}
