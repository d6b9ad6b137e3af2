//! Headless list control that keeps rows in memory.
//!
//! Applies plans with batch-update semantics and validates them the way a
//! platform table would: deletions and move sources address old positions,
//! insertions and move destinations address new ones, and rows that are not
//! mentioned keep their relative order. An inconsistent plan is rejected with
//! an [`ApplyError`] and leaves the rows untouched.
use crate::control::{CellPool, ListControl};
use crate::diff_engine::PlanFor;
use crate::errors::ApplyError;
use crate::snapshot::Snapshot;
use crate::types::{Change, EdgeInsets, IndexPath, ItemIdOf, ItemsSection, SectionIdOf};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub enum ListEvent {
    Applied { changes: usize, animated: bool },
    SizesRefreshed,
    ScrolledToTop { animated: bool },
    RefreshEnded,
    InsetsChanged(EdgeInsets),
    RefreshControlInstalled,
}

type Rows<T> = (SectionIdOf<T>, Vec<ItemIdOf<T>>);

pub struct MemoryList<T: ItemsSection, C> {
    sections: Vec<Rows<T>>,
    rows: HashMap<IndexPath, C>,
    headers: HashMap<usize, C>,
    footers: HashMap<usize, C>,
    events: Vec<ListEvent>,
    reject_next: Option<ApplyError>,
}

impl<T: ItemsSection, C> Default for MemoryList<T, C> {
    fn default() -> Self {
        MemoryList {
            sections: Vec::new(),
            rows: HashMap::new(),
            headers: HashMap::new(),
            footers: HashMap::new(),
            events: Vec::new(),
            reject_next: None,
        }
    }
}

impl<T: ItemsSection, C> MemoryList<T, C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number_of_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn section_ids(&self) -> Vec<SectionIdOf<T>> {
        self.sections.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn rows_in(&self, section: usize) -> Option<&[ItemIdOf<T>]> {
        self.sections.get(section).map(|(_, rows)| rows.as_slice())
    }

    /// True when the displayed rows are exactly those of `snapshot`.
    pub fn matches(&self, snapshot: &Snapshot<SectionIdOf<T>, ItemIdOf<T>>) -> bool {
        self.sections.len() == snapshot.number_of_sections()
            && self
                .sections
                .iter()
                .zip(snapshot.sections())
                .all(|((id, rows), (other_id, other_rows))| id == other_id && rows.as_slice() == other_rows)
    }

    pub fn events(&self) -> &[ListEvent] {
        &self.events
    }

    pub fn applied_count(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, ListEvent::Applied { .. })).count()
    }

    pub fn bound_row(&self, at: IndexPath) -> Option<&C> {
        self.rows.get(&at)
    }

    pub fn bound_header(&self, section: usize) -> Option<&C> {
        self.headers.get(&section)
    }

    pub fn bound_footer(&self, section: usize) -> Option<&C> {
        self.footers.get(&section)
    }

    /// Makes the next apply or size refresh fail with `err`.
    pub fn fail_next_update(&mut self, err: ApplyError) {
        self.reject_next = Some(err);
    }

    fn apply_changes(&mut self, plan: &PlanFor<T>) -> Result<(), ApplyError> {
        let old = &self.sections;

        let mut deleted_sections = HashSet::new();
        let mut moved_sections: HashMap<usize, usize> = HashMap::new();
        let mut inserted_sections: Vec<(usize, SectionIdOf<T>)> = Vec::new();
        let mut deleted_rows = HashSet::new();
        let mut moved_rows: Vec<(IndexPath, IndexPath, ItemIdOf<T>)> = Vec::new();
        let mut inserted_rows: Vec<(IndexPath, ItemIdOf<T>)> = Vec::new();

        let check_section = |index: usize, id: Option<&SectionIdOf<T>>| -> Result<(), ApplyError> {
            match old.get(index) {
                None => Err(ApplyError::OutOfRange { what: "section", index, count: old.len() }),
                Some((found, _)) if id.is_some_and(|id| id != found) => Err(ApplyError::inconsistent(format!(
                    "section {} holds {:?}, plan expected {:?}",
                    index, found, id
                ))),
                Some(_) => Ok(()),
            }
        };
        let check_row = |at: IndexPath, id: &ItemIdOf<T>| -> Result<(), ApplyError> {
            check_section(at.section, None)?;
            let rows = &old[at.section].1;
            match rows.get(at.row) {
                None => Err(ApplyError::OutOfRange { what: "row", index: at.row, count: rows.len() }),
                Some(found) if found != id => Err(ApplyError::inconsistent(format!(
                    "row {} holds {:?}, plan expected {:?}",
                    at, found, id
                ))),
                Some(_) => Ok(()),
            }
        };

        for change in &plan.changes {
            match change {
                Change::DeleteSection { id, index } => {
                    check_section(*index, Some(id))?;
                    if !deleted_sections.insert(*index) {
                        return Err(ApplyError::inconsistent(format!("section {} deleted twice", index)));
                    }
                }
                Change::MoveSection { id, from, to } => {
                    check_section(*from, Some(id))?;
                    if moved_sections.insert(*from, *to).is_some() {
                        return Err(ApplyError::inconsistent(format!("section {} moved twice", from)));
                    }
                }
                Change::InsertSection { id, index } => inserted_sections.push((*index, id.clone())),
                Change::DeleteItem { id, at } => {
                    check_row(*at, id)?;
                    deleted_rows.insert(*at);
                }
                Change::MoveItem { id, from, to } => {
                    check_row(*from, id)?;
                    moved_rows.push((*from, *to, id.clone()));
                }
                Change::InsertItem { id, at } => inserted_rows.push((*at, id.clone())),
            }
        }

        for from in moved_sections.keys() {
            if deleted_sections.contains(from) {
                return Err(ApplyError::inconsistent(format!("section {} both deleted and moved", from)));
            }
        }
        for (from, _, _) in &moved_rows {
            if deleted_sections.contains(&from.section) {
                return Err(ApplyError::inconsistent(format!("row {} moved out of a deleted section", from)));
            }
        }
        let move_sources: HashSet<IndexPath> = moved_rows.iter().map(|(from, _, _)| *from).collect();

        // Strip deleted and moved rows from every surviving old section.
        let mut carried: Vec<Option<Rows<T>>> = old
            .iter()
            .enumerate()
            .map(|(index, (id, rows))| {
                if deleted_sections.contains(&index) {
                    return None;
                }
                let kept = rows
                    .iter()
                    .enumerate()
                    .filter(|(row, _)| {
                        let at = IndexPath::new(index, *row);
                        !deleted_rows.contains(&at) && !move_sources.contains(&at)
                    })
                    .map(|(_, id)| id.clone())
                    .collect();
                Some((id.clone(), kept))
            })
            .collect();

        let mut placed_sections = Vec::with_capacity(inserted_sections.len() + moved_sections.len());
        for (index, id) in inserted_sections {
            placed_sections.push((index, (id, Vec::new())));
        }
        for (&from, &to) in &moved_sections {
            if let Some(section) = carried[from].take() {
                placed_sections.push((to, section));
            }
        }
        let survivors: Vec<Rows<T>> = carried.into_iter().flatten().collect();
        let mut sections = fill_slots("section", survivors, placed_sections)?;

        let mut placements: HashMap<usize, Vec<(usize, ItemIdOf<T>)>> = HashMap::new();
        for (at, id) in inserted_rows {
            placements.entry(at.section).or_default().push((at.row, id));
        }
        for (_, to, id) in moved_rows {
            placements.entry(to.section).or_default().push((to.row, id));
        }
        for (index, (_, rows)) in sections.iter_mut().enumerate() {
            let placed = placements.remove(&index).unwrap_or_default();
            *rows = fill_slots("row", std::mem::take(rows), placed)?;
        }
        if let Some(section) = placements.keys().next() {
            return Err(ApplyError::OutOfRange { what: "section", index: *section, count: sections.len() });
        }

        self.sections = sections;
        Ok(())
    }

    fn take_rejection(&mut self) -> Result<(), ApplyError> {
        match self.reject_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Puts every placed entry at its final index and fills the remaining slots
/// with `survivors`, in order. The counts must line up exactly.
fn fill_slots<V>(what: &'static str, survivors: Vec<V>, placed: Vec<(usize, V)>) -> Result<Vec<V>, ApplyError> {
    let count = survivors.len() + placed.len();
    let mut slots: Vec<Option<V>> = (0..count).map(|_| None).collect();
    for (index, value) in placed {
        let slot = slots.get_mut(index).ok_or(ApplyError::OutOfRange { what, index, count })?;
        if slot.is_some() {
            return Err(ApplyError::inconsistent(format!("{} {} targeted twice", what, index)));
        }
        *slot = Some(value);
    }
    let mut survivors = survivors.into_iter();
    let filled: Vec<V> = slots
        .into_iter()
        .map(|slot| slot.or_else(|| survivors.next()))
        .collect::<Option<Vec<V>>>()
        .ok_or_else(|| ApplyError::inconsistent(format!("{} count mismatch", what)))?;
    Ok(filled)
}

impl<T: ItemsSection, C> CellPool for MemoryList<T, C> {
    type Content = C;

    fn bind(&mut self, content: C, position: IndexPath) {
        self.rows.insert(position, content);
    }

    fn bind_header(&mut self, content: C, section: usize) {
        self.headers.insert(section, content);
    }

    fn bind_footer(&mut self, content: C, section: usize) {
        self.footers.insert(section, content);
    }
}

impl<T: ItemsSection, C> ListControl<T> for MemoryList<T, C> {
    fn apply_plan(&mut self, plan: &PlanFor<T>, animated: bool) -> Result<(), ApplyError> {
        self.take_rejection()?;
        self.apply_changes(plan)?;
        // Positions moved underneath every bound view.
        self.rows.clear();
        self.headers.clear();
        self.footers.clear();
        self.events.push(ListEvent::Applied { changes: plan.len(), animated });
        Ok(())
    }

    fn refresh_sizes(&mut self) -> Result<(), ApplyError> {
        self.take_rejection()?;
        self.events.push(ListEvent::SizesRefreshed);
        Ok(())
    }

    fn scroll_to_top(&mut self, animated: bool) {
        self.events.push(ListEvent::ScrolledToTop { animated });
    }

    fn end_refreshing(&mut self) {
        self.events.push(ListEvent::RefreshEnded);
    }

    fn set_content_insets(&mut self, insets: EdgeInsets) {
        self.events.push(ListEvent::InsetsChanged(insets));
    }

    fn install_refresh_control(&mut self) {
        self.events.push(ListEvent::RefreshControlInstalled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff_engine::diff;
    use crate::types::ListSection;

    type Section = ListSection<&'static str, u32>;

    fn snap(layout: &[(&'static str, &[u32])]) -> Snapshot<&'static str, u32> {
        let sections: Vec<Section> = layout.iter().map(|(k, items)| ListSection::new(*k, items.to_vec())).collect();
        Snapshot::build(&sections).unwrap()
    }

    fn transition(from: &[(&'static str, &[u32])], to: &[(&'static str, &[u32])]) {
        let (old, new) = (snap(from), snap(to));
        let mut list: MemoryList<Section, ()> = MemoryList::new();
        list.apply_plan(&diff(&Snapshot::default(), &old), false).unwrap();
        assert!(list.matches(&old));
        list.apply_plan(&diff(&old, &new), true).unwrap();
        assert!(list.matches(&new), "{:?} -> {:?} left {:?}", from, to, list.sections);
    }

    #[test]
    fn plans_transform_old_rows_into_new_rows() {
        transition(&[("A", &[1, 2, 3])], &[("A", &[1, 2, 3, 4])]);
        transition(&[("A", &[1, 2, 3])], &[("A", &[3, 2, 1])]);
        transition(&[("A", &[1, 2]), ("B", &[3, 4])], &[("B", &[4, 1]), ("A", &[3])]);
        transition(&[("A", &[1, 2]), ("B", &[3])], &[("C", &[2, 5]), ("A", &[3, 1])]);
        transition(&[("A", &[1]), ("B", &[2]), ("C", &[3])], &[("C", &[1, 2, 3])]);
        transition(&[("A", &[1, 2, 3, 4, 5])], &[("A", &[5, 1, 4, 2]), ("B", &[])]);
        transition(&[("A", &[1, 2])], &[]);
    }

    #[test]
    fn stale_plan_is_rejected_and_rows_are_kept() {
        let old = snap(&[("A", &[1, 2])]);
        let mut list: MemoryList<Section, ()> = MemoryList::new();
        list.apply_plan(&diff(&Snapshot::default(), &old), false).unwrap();

        // Computed against rows the list never displayed.
        let plan = diff(&snap(&[("A", &[1, 2, 3])]), &snap(&[("A", &[1, 2])]));
        let err = list.apply_plan(&plan, false).unwrap_err();
        assert!(matches!(err, ApplyError::OutOfRange { what: "row", index: 2, count: 2 }));
        assert!(list.matches(&old));
    }

    #[test]
    fn mismatched_identity_is_inconsistent() {
        let mut list: MemoryList<Section, ()> = MemoryList::new();
        list.apply_plan(&diff(&Snapshot::default(), &snap(&[("A", &[1])])), false).unwrap();
        let plan = diff(&snap(&[("A", &[9])]), &snap(&[("A", &[])]));
        assert!(matches!(list.apply_plan(&plan, false), Err(ApplyError::Inconsistent { .. })));
    }

    #[test]
    fn injected_failure_applies_once() {
        let mut list: MemoryList<Section, ()> = MemoryList::new();
        list.fail_next_update(ApplyError::Rejected("row count mismatch".into()));
        assert!(ListControl::<Section>::refresh_sizes(&mut list).is_err());
        assert!(ListControl::<Section>::refresh_sizes(&mut list).is_ok());
    }
}
