use crate::store::RecordStore;
use simdash_core::{Simulation, SimulationId, SimulationStatus};

/// The record open in the detail overlay, held by id only. What gets shown
/// is always read back from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    selected: Option<SimulationId>,
}

impl Selection {
    pub fn open(&mut self, id: SimulationId) {
        self.selected = Some(id);
    }

    pub fn close(&mut self) -> Option<SimulationId> {
        self.selected.take()
    }

    pub fn selected(&self) -> Option<SimulationId> {
        self.selected
    }

    pub fn is_open(&self) -> bool {
        self.selected.is_some()
    }

    pub fn view<'a>(&self, store: &'a RecordStore) -> Option<DetailView<'a>> {
        let id = self.selected?;
        store.get(id).map(|record| DetailView { record })
    }

    /// Force-closes the selection when its record is gone. Returns the id
    /// that was closed.
    pub fn retain(&mut self, store: &RecordStore) -> Option<SimulationId> {
        match self.selected {
            Some(id) if !store.contains(id) => self.selected.take(),
            _ => None,
        }
    }
}

/// Live borrow of the selected record.
#[derive(Debug, Clone, Copy)]
pub struct DetailView<'a> {
    record: &'a Simulation,
}

impl<'a> DetailView<'a> {
    pub fn record(&self) -> &'a Simulation {
        self.record
    }

    pub fn status(&self) -> SimulationStatus {
        self.record.status
    }

    pub fn progress(&self) -> Option<u8> {
        self.record.progress()
    }

    pub fn affordances(&self, pending: bool) -> Affordances {
        Affordances::for_status(self.record.status, pending)
    }
}

/// Which detail actions are enabled for a record.
///
/// `retry` and `re_execute` are shown for failed and finished records but
/// never act; a terminal record can only be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub execute: bool,
    pub download: bool,
    pub delete: bool,
    pub retry: bool,
    pub re_execute: bool,
}

impl Affordances {
    pub fn for_status(status: SimulationStatus, pending: bool) -> Self {
        Self {
            execute: !pending && status == SimulationStatus::NotStarted,
            download: !pending && status == SimulationStatus::Finished,
            delete: !pending,
            retry: status == SimulationStatus::Error,
            re_execute: status == SimulationStatus::Finished,
        }
    }
}
