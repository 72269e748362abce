use simdash_core::{Simulation, SimulationId, StatusEvent};
use std::collections::HashMap;
use std::iter::FusedIterator;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("simulation {id} is not in the store")]
pub struct StaleReference {
    pub id: SimulationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The id was already present; its record was replaced and moved to
    /// the front.
    Replaced,
}

/// Insertion-ordered id -> record map. Single source of truth for every
/// view of the simulation list.
///
/// `order` and `records` always hold the same id set, each id once.
#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    order: Vec<SimulationId>,
    records: HashMap<SimulationId, Simulation>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: SimulationId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn get(&self, id: SimulationId) -> Option<&Simulation> {
        self.records.get(&id)
    }

    /// Replaces the whole contents, keeping snapshot order. A repeated id in
    /// the snapshot keeps its first occurrence. Returns the resulting size.
    pub fn load(&mut self, records: Vec<Simulation>) -> usize {
        self.order.clear();
        self.records.clear();
        self.order.reserve(records.len());
        for record in records {
            if self.records.contains_key(&record.id) {
                warn!(
                    event = "store_snapshot_duplicate",
                    id = %record.id,
                    "dropping repeated id in snapshot"
                );
                continue;
            }
            self.order.push(record.id);
            self.records.insert(record.id, record);
        }
        self.order.len()
    }

    /// Applies a status change to an existing record. A missing id is left
    /// missing: late events for deleted records never resurrect them.
    pub fn upsert_status(&mut self, event: StatusEvent) -> Result<&Simulation, StaleReference> {
        let record = self
            .records
            .get_mut(&event.id)
            .ok_or(StaleReference { id: event.id })?;
        record.apply_status(event.status, event.progress);
        Ok(record)
    }

    /// Adds a record at the front (newest first).
    pub fn insert(&mut self, record: Simulation) -> InsertOutcome {
        let id = record.id;
        let outcome = if self.records.insert(id, record).is_some() {
            self.order.retain(|existing| *existing != id);
            InsertOutcome::Replaced
        } else {
            InsertOutcome::Inserted
        };
        self.order.insert(0, id);
        outcome
    }

    /// Adds a record at the front only when the id is unknown.
    pub fn insert_if_absent(&mut self, record: Simulation) -> bool {
        if self.records.contains_key(&record.id) {
            return false;
        }
        self.insert(record);
        true
    }

    pub fn remove(&mut self, id: SimulationId) -> Option<Simulation> {
        let removed = self.records.remove(&id)?;
        self.order.retain(|existing| *existing != id);
        Some(removed)
    }

    /// Empties the store, returning how many records were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.order.len();
        self.order.clear();
        self.records.clear();
        dropped
    }

    /// Current records in store order. The iterator borrows the store, so
    /// it reflects exactly the state at the time of the call.
    pub fn all(&self) -> Records<'_> {
        Records {
            ids: self.order.iter(),
            records: &self.records,
        }
    }

    /// Records at positions `[start, start + len)` of the store order.
    pub fn window(&self, start: usize, len: usize) -> Records<'_> {
        let start = start.min(self.order.len());
        let end = start.saturating_add(len).min(self.order.len());
        Records {
            ids: self.order[start..end].iter(),
            records: &self.records,
        }
    }

    pub fn ids(&self) -> &[SimulationId] {
        &self.order
    }
}

pub struct Records<'a> {
    ids: std::slice::Iter<'a, SimulationId>,
    records: &'a HashMap<SimulationId, Simulation>,
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a Simulation;

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.ids.by_ref() {
            if let Some(record) = self.records.get(id) {
                return Some(record);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for Records<'_> {}

impl FusedIterator for Records<'_> {}


#[cfg(test)]
mod proptests {
    use super::tests::record;
    use super::*;
    use proptest::prelude::*;
    use simdash_core::SimulationStatus;
    use std::collections::HashSet;

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u64),
        InsertIfAbsent(u64),
        Remove(u64),
        Upsert(u64, u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..16).prop_map(Op::Insert),
            (0u64..16).prop_map(Op::InsertIfAbsent),
            (0u64..16).prop_map(Op::Remove),
            (0u64..16, 0u8..=100).prop_map(|(id, progress)| Op::Upsert(id, progress)),
        ]
    }

    proptest! {
        #[test]
        fn mutation_sequences_keep_ids_unique(ops in prop::collection::vec(op(), 0..200)) {
            let mut store = RecordStore::new();
            for op in ops {
                let before = store.len();
                match op {
                    Op::Insert(id) => {
                        let present = store.contains(SimulationId(id));
                        let outcome = store.insert(record(id, SimulationStatus::NotStarted));
                        prop_assert_eq!(outcome == InsertOutcome::Replaced, present);
                        prop_assert_eq!(store.ids().first(), Some(&SimulationId(id)));
                    }
                    Op::InsertIfAbsent(id) => {
                        let present = store.contains(SimulationId(id));
                        let inserted = store.insert_if_absent(record(id, SimulationStatus::Finished));
                        prop_assert_eq!(inserted, !present);
                    }
                    Op::Remove(id) => {
                        let present = store.contains(SimulationId(id));
                        prop_assert_eq!(store.remove(SimulationId(id)).is_some(), present);
                        prop_assert!(!store.contains(SimulationId(id)));
                    }
                    Op::Upsert(id, progress) => {
                        let present = store.contains(SimulationId(id));
                        let event = StatusEvent::new(SimulationId(id), SimulationStatus::Running)
                            .with_progress(progress);
                        prop_assert_eq!(store.upsert_status(event).is_ok(), present);
                        prop_assert_eq!(store.len(), before);
                    }
                }
                let unique: HashSet<SimulationId> = store.all().map(|r| r.id).collect();
                prop_assert_eq!(unique.len(), store.len());
                prop_assert_eq!(store.all().count(), store.len());
            }
        }
    }
}
