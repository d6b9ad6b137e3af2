//! Keyed two-level diffing engine (sections, then rows) with LIS move detection
use crate::errors::ReconcilerError;
use crate::snapshot::Snapshot;
use crate::types::{Change, ChangeAction, IndexPath, Identity, ItemIdOf, SectionIdOf};
use log::trace;
use serde::Serialize;
use std::collections::HashSet;

/// The structural mutation that turns one snapshot into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(bound(serialize = "S: Serialize, I: Serialize"))]
pub struct DiffPlan<S, I> {
    pub changes: Vec<Change<S, I>>,
}

pub type PlanFor<T> = DiffPlan<SectionIdOf<T>, ItemIdOf<T>>;

impl<S, I> Default for DiffPlan<S, I> {
    fn default() -> Self {
        DiffPlan { changes: Vec::new() }
    }
}

impl<S, I> DiffPlan<S, I> {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn section_changes(&self) -> impl Iterator<Item = &Change<S, I>> {
        self.changes.iter().filter(|c| c.is_section_level())
    }

    pub fn item_changes(&self) -> impl Iterator<Item = &Change<S, I>> {
        self.changes.iter().filter(|c| !c.is_section_level())
    }

    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action() == action).count()
    }
}

impl<S: Serialize, I: Serialize> DiffPlan<S, I> {
    pub fn to_json(&self) -> Result<serde_json::Value, ReconcilerError> {
        Ok(serde_json::to_value(self)?)
    }
}

pub struct DiffEngine<'a, S: Identity, I: Identity> {
    old: &'a Snapshot<S, I>,
    new: &'a Snapshot<S, I>,
    result: DiffPlan<S, I>,
}

impl<'a, S: Identity, I: Identity> DiffEngine<'a, S, I> {
    pub fn new(old: &'a Snapshot<S, I>, new: &'a Snapshot<S, I>) -> Self {
        DiffEngine { old, new, result: DiffPlan::default() }
    }

    pub fn reconcile(mut self) -> DiffPlan<S, I> {
        let surviving = self.diff_sections();
        self.diff_items(&surviving);
        self.order_changes();
        self.result
    }

    /// Emits section deletions, insertions and moves. Returns, for every new
    /// section index, the old index of the same section when it survives.
    fn diff_sections(&mut self) -> Vec<Option<usize>> {
        for (old_index, id) in self.old.section_identifiers().enumerate() {
            if self.new.index_of_section(id).is_none() {
                self.result.changes.push(Change::DeleteSection { id: id.clone(), index: old_index });
            }
        }

        let mut new_to_old = Vec::with_capacity(self.new.number_of_sections());
        let mut sequence_for_lis = Vec::new();
        for (new_index, id) in self.new.section_identifiers().enumerate() {
            match self.old.index_of_section(id) {
                Some(old_index) => {
                    new_to_old.push(Some(old_index));
                    sequence_for_lis.push(old_index);
                }
                None => {
                    new_to_old.push(None);
                    self.result.changes.push(Change::InsertSection { id: id.clone(), index: new_index });
                }
            }
        }

        let stable = stable_members(&sequence_for_lis);
        for (new_index, old_index) in new_to_old.iter().enumerate() {
            if let Some(old_index) = *old_index {
                if !stable.contains(&old_index) {
                    if let Some(id) = self.new.section_id_at(new_index) {
                        self.result.changes.push(Change::MoveSection { id: id.clone(), from: old_index, to: new_index });
                    }
                }
            }
        }

        new_to_old
    }

    fn diff_items(&mut self, new_to_old_section: &[Option<usize>]) {
        let old_locations = self.old.locations();
        let new_locations = self.new.locations();
        let old_survives = |section: usize| -> bool {
            self.old
                .section_id_at(section)
                .is_some_and(|id| self.new.index_of_section(id).is_some())
        };

        // Rows gone from a surviving section. Rows of deleted sections go with them.
        for (id, &at) in &old_locations {
            if !new_locations.contains_key(id) && old_survives(at.section) {
                self.result.changes.push(Change::DeleteItem { id: (*id).clone(), at });
            }
        }

        for (new_section, items) in self.new.sections().map(|(_, items)| items).enumerate() {
            let Some(old_section) = new_to_old_section.get(new_section).copied().flatten() else {
                // Fresh section: every row is an insertion; rows that came from a
                // surviving section are deleted there.
                for (row, id) in items.iter().enumerate() {
                    if let Some(&from) = old_locations.get(id) {
                        if old_survives(from.section) {
                            self.result.changes.push(Change::DeleteItem { id: id.clone(), at: from });
                        }
                    }
                    self.result.changes.push(Change::InsertItem { id: id.clone(), at: IndexPath::new(new_section, row) });
                }
                continue;
            };

            let mut new_to_old_row = Vec::with_capacity(items.len());
            let mut sequence_for_lis = Vec::new();
            for id in items {
                match old_locations.get(id) {
                    Some(from) if from.section == old_section => {
                        new_to_old_row.push(Some(from.row));
                        sequence_for_lis.push(from.row);
                    }
                    _ => new_to_old_row.push(None),
                }
            }
            let stable = stable_members(&sequence_for_lis);

            for (row, id) in items.iter().enumerate() {
                let to = IndexPath::new(new_section, row);
                match (new_to_old_row[row], old_locations.get(id)) {
                    (Some(old_row), _) => {
                        if !stable.contains(&old_row) {
                            let from = IndexPath::new(old_section, old_row);
                            self.result.changes.push(Change::MoveItem { id: id.clone(), from, to });
                        }
                    }
                    (None, Some(&from)) if old_survives(from.section) => {
                        self.result.changes.push(Change::MoveItem { id: id.clone(), from, to });
                    }
                    (None, _) => {
                        self.result.changes.push(Change::InsertItem { id: id.clone(), at: to });
                    }
                }
            }
        }
    }

    /// Orders changes the way a batch update consumes them: deletions from the
    /// bottom up, then insertions top down, then moves. Sections before rows.
    fn order_changes(&mut self) {
        fn rank<S, I>(change: &Change<S, I>) -> (u8, i64, i64) {
            match change {
                Change::DeleteSection { index, .. } => (0, -(*index as i64), 0),
                Change::DeleteItem { at, .. } => (1, -(at.section as i64), -(at.row as i64)),
                Change::InsertSection { index, .. } => (2, *index as i64, 0),
                Change::InsertItem { at, .. } => (3, at.section as i64, at.row as i64),
                Change::MoveSection { to, .. } => (4, *to as i64, 0),
                Change::MoveItem { to, .. } => (5, to.section as i64, to.row as i64),
            }
        }

        self.result.changes.sort_by_key(rank);
        trace!("DiffEngine: ordered {} changes", self.result.changes.len());
    }
}

/// Values of `seq` that lie on a longest increasing subsequence.
fn stable_members(seq: &[usize]) -> HashSet<usize> {
    longest_increasing_subsequence(seq).into_iter().map(|i| seq[i]).collect()
}

/// O(n log n) LIS. Returns indices into `seq`; empty input gives an empty vector.
fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    if seq.is_empty() {
        return Vec::new();
    }

    let mut predecessors = vec![0; seq.len()];
    let mut indices = vec![0; seq.len()];
    let mut length = 0;

    for (i, &value) in seq.iter().enumerate() {
        let mut low = 0;
        let mut high = length;

        while low < high {
            let mid = low + (high - low) / 2;
            if seq[indices[mid]] < value {
                low = mid + 1;
            } else {
                high = mid;
            }
        }

        if low > 0 {
            predecessors[i] = indices[low - 1];
        }
        indices[low] = i;

        if low == length {
            length += 1;
        }
    }

    let mut lis = Vec::with_capacity(length);
    let mut k = indices[length - 1];
    for _ in 0..length {
        lis.push(k);
        k = predecessors[k];
    }
    lis.reverse();
    lis
}

/// Convenience wrapper around [`DiffEngine`].
pub fn diff<S: Identity, I: Identity>(old: &Snapshot<S, I>, new: &Snapshot<S, I>) -> DiffPlan<S, I> {
    let plan = DiffEngine::new(old, new).reconcile();
    trace!(
        "DiffEngine: {} changes ({} insert, {} remove, {} move)",
        plan.len(),
        plan.count(ChangeAction::Insert),
        plan.count(ChangeAction::Remove),
        plan.count(ChangeAction::Move)
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ListSection;

    type Plan = DiffPlan<&'static str, u32>;

    fn snap(layout: &[(&'static str, &[u32])]) -> Snapshot<&'static str, u32> {
        let sections: Vec<_> = layout.iter().map(|(k, items)| ListSection::new(*k, items.to_vec())).collect();
        Snapshot::build(&sections).unwrap()
    }

    fn plan(old: &[(&'static str, &[u32])], new: &[(&'static str, &[u32])]) -> Plan {
        diff(&snap(old), &snap(new))
    }

    #[test]
    fn lis_handles_empty_and_sorted_input() {
        assert!(longest_increasing_subsequence(&[]).is_empty());
        assert_eq!(longest_increasing_subsequence(&[0, 1, 2]), vec![0, 1, 2]);
        assert_eq!(longest_increasing_subsequence(&[2, 0, 1]).len(), 2);
    }

    #[test]
    fn initial_load_inserts_section_then_rows() {
        let plan = plan(&[], &[("A", &[1, 2, 3])]);
        assert_eq!(
            plan.changes,
            vec![
                Change::InsertSection { id: "A", index: 0 },
                Change::InsertItem { id: 1, at: IndexPath::new(0, 0) },
                Change::InsertItem { id: 2, at: IndexPath::new(0, 1) },
                Change::InsertItem { id: 3, at: IndexPath::new(0, 2) },
            ]
        );
    }

    #[test]
    fn appending_one_row_is_a_single_insertion() {
        let plan = plan(&[("A", &[1, 2, 3])], &[("A", &[1, 2, 3, 4])]);
        assert_eq!(plan.changes, vec![Change::InsertItem { id: 4, at: IndexPath::new(0, 3) }]);
        assert_eq!(plan.section_changes().count(), 0);
    }

    #[test]
    fn identical_snapshots_produce_empty_plan() {
        assert!(plan(&[("A", &[1, 2]), ("B", &[3])], &[("A", &[1, 2]), ("B", &[3])]).is_empty());
    }

    #[test]
    fn clearing_removes_sections_only() {
        let plan = plan(&[("A", &[1, 2]), ("B", &[3])], &[]);
        assert_eq!(
            plan.changes,
            vec![Change::DeleteSection { id: "B", index: 1 }, Change::DeleteSection { id: "A", index: 0 }]
        );
    }

    #[test]
    fn swap_is_one_move() {
        let plan = plan(&[("A", &[1, 2, 3])], &[("A", &[1, 3, 2])]);
        assert_eq!(plan.count(ChangeAction::Move), 1);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn row_moves_between_surviving_sections() {
        let plan = plan(&[("A", &[1, 2]), ("B", &[3])], &[("A", &[1]), ("B", &[2, 3])]);
        assert_eq!(
            plan.changes,
            vec![Change::MoveItem { id: 2, from: IndexPath::new(0, 1), to: IndexPath::new(1, 0) }]
        );
        assert_eq!(plan.item_changes().count(), 1);
        assert_eq!(plan.section_changes().count(), 0);
    }

    #[test]
    fn row_into_fresh_section_is_delete_plus_insert() {
        let plan = plan(&[("A", &[1, 2])], &[("A", &[1]), ("C", &[2])]);
        assert_eq!(
            plan.changes,
            vec![
                Change::DeleteItem { id: 2, at: IndexPath::new(0, 1) },
                Change::InsertSection { id: "C", index: 1 },
                Change::InsertItem { id: 2, at: IndexPath::new(1, 0) },
            ]
        );
    }

    #[test]
    fn row_from_deleted_section_is_plain_insert() {
        let plan = plan(&[("A", &[1]), ("B", &[2])], &[("A", &[1, 2])]);
        assert_eq!(
            plan.changes,
            vec![
                Change::DeleteSection { id: "B", index: 1 },
                Change::InsertItem { id: 2, at: IndexPath::new(0, 1) },
            ]
        );
    }

    #[test]
    fn section_reorder_moves_one_section() {
        let plan = plan(&[("A", &[1]), ("B", &[2]), ("C", &[3])], &[("C", &[3]), ("A", &[1]), ("B", &[2])]);
        assert_eq!(plan.changes, vec![Change::MoveSection { id: "C", from: 2, to: 0 }]);
    }

    #[test]
    fn plan_serializes_to_json() {
        let plan = plan(&[], &[("A", &[7])]);
        let json = plan.to_json().unwrap();
        assert_eq!(json["changes"][0]["kind"], "insert_section");
        assert_eq!(json["changes"][1]["id"], 7);
        assert_eq!(json["changes"][1]["at"]["row"], 0);
    }
}
