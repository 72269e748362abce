//! Single consumer that folds snapshot results, stream notices and request
//! outcomes into the record store.
//!
//! Every mutation goes through [`Reconciler::apply`] on the owning task, one
//! event at a time, so the store never needs a lock. Request outcomes only
//! touch the store when they succeeded; failures become notices.

use crate::dispatch::DownloadError;
use crate::selection::{DetailView, Selection};
use crate::store::{RecordStore, StaleReference};
use crate::transport::{BulkDeleteOutcome, ExecuteAck, StreamNotice, TransportError};
use chrono::{DateTime, Utc};
use simdash_core::{Simulation, SimulationId, SimulationStats, SimulationStatus, StatusEvent};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_NOTICES: usize = 32;

#[derive(Debug)]
pub enum SyncEvent {
    StreamConnected,
    StreamDisconnected {
        reason: String,
    },
    Snapshot(Result<Vec<Simulation>, TransportError>),
    Status(StatusEvent),
    Announced(Simulation),
    Created(Result<Simulation, TransportError>),
    Executed {
        id: SimulationId,
        result: Result<ExecuteAck, TransportError>,
    },
    Deleted {
        id: SimulationId,
        result: Result<(), TransportError>,
    },
    DeletedAll(Result<BulkDeleteOutcome, TransportError>),
    Downloaded {
        id: SimulationId,
        result: Result<PathBuf, DownloadError>,
    },
}

impl From<StreamNotice> for SyncEvent {
    fn from(notice: StreamNotice) -> Self {
        match notice {
            StreamNotice::Connected => SyncEvent::StreamConnected,
            StreamNotice::Disconnected { reason } => SyncEvent::StreamDisconnected { reason },
            StreamNotice::Status(event) => SyncEvent::Status(event),
            StreamNotice::Announced(record) => SyncEvent::Announced(record),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingOp {
    Snapshot,
    Create,
    Execute(SimulationId),
    Delete(SimulationId),
    DeleteAll,
    Download(SimulationId),
}

impl PendingOp {
    pub fn target(&self) -> Option<SimulationId> {
        match self {
            PendingOp::Execute(id) | PendingOp::Delete(id) | PendingOp::Download(id) => Some(*id),
            PendingOp::Snapshot | PendingOp::Create | PendingOp::DeleteAll => None,
        }
    }
}

/// Why a request was not started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Refusal {
    #[error("a request for this is already in flight")]
    AlreadyPending,
    #[error(transparent)]
    Stale(#[from] StaleReference),
    #[error("cannot {action} simulation {id} while it is {status}")]
    NotAllowed {
        id: SimulationId,
        action: &'static str,
        status: SimulationStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-visible, non-fatal message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotState {
    Loading,
    Loaded { at: DateTime<Utc> },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Connected { since: DateTime<Utc> },
    Disconnected { at: DateTime<Utc>, reason: String },
}

#[derive(Debug)]
pub struct Reconciler {
    store: RecordStore,
    selection: Selection,
    pending: HashSet<PendingOp>,
    notices: VecDeque<Notice>,
    snapshot: SnapshotState,
    stream: StreamState,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            store: RecordStore::new(),
            selection: Selection::default(),
            pending: HashSet::new(),
            notices: VecDeque::new(),
            snapshot: SnapshotState::Loading,
            stream: StreamState::Connecting,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn stats(&self) -> SimulationStats {
        SimulationStats::from_records(self.store.all())
    }

    pub fn snapshot_state(&self) -> &SnapshotState {
        &self.snapshot
    }

    pub fn stream_state(&self) -> &StreamState {
        &self.stream
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Opens the detail view for a known record.
    pub fn open(&mut self, id: SimulationId) -> Result<(), StaleReference> {
        if !self.store.contains(id) {
            return Err(StaleReference { id });
        }
        self.selection.open(id);
        Ok(())
    }

    pub fn close(&mut self) -> Option<SimulationId> {
        self.selection.close()
    }

    pub fn detail(&self) -> Option<DetailView<'_>> {
        self.selection.view(&self.store)
    }

    pub fn is_pending(&self, op: PendingOp) -> bool {
        self.pending.contains(&op)
    }

    /// Whether any request targeting this record is in flight.
    pub fn is_busy(&self, id: SimulationId) -> bool {
        self.pending.iter().any(|op| op.target() == Some(id))
    }

    /// Marks a request as in flight after checking it is allowed for the
    /// current record state.
    pub fn begin(&mut self, op: PendingOp) -> Result<(), Refusal> {
        if self.pending.contains(&op) {
            return Err(Refusal::AlreadyPending);
        }
        if let Some(id) = op.target() {
            let record = self.store.get(id).ok_or(StaleReference { id })?;
            if self.is_busy(id) {
                return Err(Refusal::AlreadyPending);
            }
            let required = match op {
                PendingOp::Execute(_) => Some(("run", SimulationStatus::NotStarted)),
                PendingOp::Download(_) => Some(("download", SimulationStatus::Finished)),
                _ => None,
            };
            if let Some((action, status)) = required {
                if record.status != status {
                    return Err(Refusal::NotAllowed {
                        id,
                        action,
                        status: record.status,
                    });
                }
            }
        }
        if op == PendingOp::Snapshot {
            self.snapshot = SnapshotState::Loading;
        }
        self.pending.insert(op);
        Ok(())
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            level,
            message: message.into(),
            at: Utc::now(),
        });
    }

    fn finish(&mut self, op: PendingOp) {
        self.pending.remove(&op);
    }

    fn drop_selection_if_gone(&mut self) {
        if let Some(id) = self.selection.retain(&self.store) {
            debug!(event = "selection_closed", id = %id);
        }
    }

    pub fn apply(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::StreamConnected => {
                self.stream = StreamState::Connected { since: Utc::now() };
                self.notify(NoticeLevel::Info, "live updates connected");
            }
            SyncEvent::StreamDisconnected { reason } => {
                self.notify(
                    NoticeLevel::Warning,
                    format!("live updates stopped: {reason}"),
                );
                self.stream = StreamState::Disconnected {
                    at: Utc::now(),
                    reason,
                };
            }
            SyncEvent::Snapshot(result) => {
                self.finish(PendingOp::Snapshot);
                match result {
                    Ok(records) => {
                        let count = self.store.load(records);
                        self.snapshot = SnapshotState::Loaded { at: Utc::now() };
                        self.drop_selection_if_gone();
                        info!(event = "snapshot_loaded", count);
                    }
                    Err(err) => {
                        warn!(event = "snapshot_failed", error = %err);
                        self.snapshot = SnapshotState::Failed {
                            message: err.to_string(),
                        };
                        self.notify(
                            NoticeLevel::Error,
                            format!("could not load simulations: {err}"),
                        );
                    }
                }
            }
            SyncEvent::Status(status) => {
                if let Err(stale) = self.store.upsert_status(status) {
                    debug!(event = "status_for_unknown_id", id = %stale.id, status = %status.status);
                }
            }
            SyncEvent::Announced(record) => {
                let id = record.id;
                if self.store.insert_if_absent(record) {
                    debug!(event = "simulation_announced", id = %id);
                }
            }
            SyncEvent::Created(result) => {
                self.finish(PendingOp::Create);
                match result {
                    Ok(record) => {
                        let message = format!("created simulation {} ({})", record.id, record.name);
                        if !self.store.insert_if_absent(record) {
                            debug!(event = "created_already_announced");
                        }
                        self.notify(NoticeLevel::Info, message);
                    }
                    Err(err) => {
                        warn!(event = "create_failed", error = %err);
                        self.notify(NoticeLevel::Error, format!("create failed: {err}"));
                    }
                }
            }
            SyncEvent::Executed { id, result } => {
                self.finish(PendingOp::Execute(id));
                match result {
                    Ok(ack) => self.confirm_execute(id, ack),
                    Err(err) => {
                        warn!(event = "execute_failed", id = %id, error = %err);
                        self.notify(
                            NoticeLevel::Error,
                            format!("could not start simulation {id}: {err}"),
                        );
                    }
                }
            }
            SyncEvent::Deleted { id, result } => {
                self.finish(PendingOp::Delete(id));
                match result {
                    Ok(()) => {
                        if self.store.remove(id).is_none() {
                            debug!(event = "deleted_unknown_id", id = %id);
                        }
                        self.drop_selection_if_gone();
                        self.notify(NoticeLevel::Info, format!("deleted simulation {id}"));
                    }
                    Err(err) => {
                        warn!(event = "delete_failed", id = %id, error = %err);
                        self.notify(
                            NoticeLevel::Error,
                            format!("could not delete simulation {id}: {err}"),
                        );
                    }
                }
            }
            SyncEvent::DeletedAll(result) => {
                self.finish(PendingOp::DeleteAll);
                match result {
                    Ok(outcome) => {
                        let dropped = self.store.clear();
                        self.drop_selection_if_gone();
                        info!(event = "store_cleared", dropped);
                        let message = if outcome.message.is_empty() {
                            format!("deleted {dropped} simulations")
                        } else {
                            outcome.message
                        };
                        self.notify(NoticeLevel::Info, message);
                    }
                    Err(err) => {
                        warn!(event = "delete_all_failed", error = %err);
                        self.notify(NoticeLevel::Error, format!("delete all failed: {err}"));
                    }
                }
            }
            SyncEvent::Downloaded { id, result } => {
                self.finish(PendingOp::Download(id));
                match result {
                    Ok(path) => self.notify(
                        NoticeLevel::Info,
                        format!("saved simulation {id} to {}", path.display()),
                    ),
                    Err(err) => {
                        warn!(event = "download_failed", id = %id, error = %err);
                        self.notify(
                            NoticeLevel::Error,
                            format!("download of simulation {id} failed: {err}"),
                        );
                    }
                }
            }
        }
    }

    /// The run ack is confirmed server state. It only moves a record out of
    /// `NotStarted`; if the stream already reported a later state, that wins.
    fn confirm_execute(&mut self, id: SimulationId, ack: ExecuteAck) {
        let Some(current) = self.store.get(id).map(|record| record.status) else {
            debug!(event = "execute_ack_for_unknown_id", id = %id);
            return;
        };
        if current == SimulationStatus::NotStarted {
            let status = ack
                .record
                .map(|record| record.status)
                .filter(|status| *status != SimulationStatus::NotStarted)
                .unwrap_or(SimulationStatus::Running);
            let mut event = StatusEvent::new(id, status);
            if status == SimulationStatus::Running {
                event = event.with_progress(0);
            }
            if let Err(stale) = self.store.upsert_status(event) {
                debug!(event = "execute_ack_for_unknown_id", id = %stale.id);
            }
        }
        self.notify(NoticeLevel::Info, format!("started simulation {id}"));
    }
}
