use async_trait::async_trait;
use serde_json::json;
use simdash_core::{
    NewSimulation, Simulation, SimulationDraft, SimulationId, SimulationParams, SimulationStatus,
    StatusEvent,
};
use simdash_sync::engine::SnapshotState;
use simdash_sync::{
    Artifact, BulkDeleteOutcome, Dispatcher, ExecuteAck, NoticeLevel, PendingOp, Reconciler,
    SimulationApi, SyncEvent, TransportError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn row(id: u64, status: &str) -> Simulation {
    serde_json::from_value(json!({
        "id": id,
        "sim_name": format!("plate-{id}"),
        "n_transmitter": 1,
        "n_receiver": 1,
        "emitters_pitch": "0.5",
        "receivers_pitch": 0.5,
        "sensor_distance": 10,
        "sensor_edge_margin": 1.0,
        "typical_mesh_size": 0.1,
        "plate_thickness": 4,
        "porosity": 0.1,
        "attenuation": "No",
        "p_status": status
    }))
    .expect("valid row")
}

fn draft(n_transmitter: &str) -> SimulationDraft {
    SimulationDraft {
        name: "plate-new".to_string(),
        n_transmitter: n_transmitter.to_string(),
        n_receiver: "2".to_string(),
        emitters_pitch: "0.5".to_string(),
        receivers_pitch: "0.5".to_string(),
        sensor_distance: "10".to_string(),
        sensor_edge_margin: "1".to_string(),
        typical_mesh_size: "0.1".to_string(),
        plate_thickness: "4".to_string(),
        porosity: "0.1".to_string(),
        attenuation: "No".to_string(),
    }
}

#[derive(Default)]
struct FakeApi {
    records: Mutex<Vec<Simulation>>,
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
    snapshot_down: bool,
    refuse_bulk_delete: bool,
}

impl FakeApi {
    fn with_records(records: Vec<Simulation>) -> Self {
        let next_id = records.iter().map(|r| r.id.0).max().unwrap_or(0) + 1;
        Self {
            records: Mutex::new(records),
            next_id: AtomicU64::new(next_id),
            ..Self::default()
        }
    }

    fn record_call(&self, call: impl Into<String>) {
        self.calls.lock().expect("calls").push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }
}

#[async_trait]
impl SimulationApi for FakeApi {
    async fn fetch_snapshot(&self) -> Result<Vec<Simulation>, TransportError> {
        self.record_call("fetch");
        if self.snapshot_down {
            return Err(TransportError::Request("connection refused".to_string()));
        }
        Ok(self.records.lock().expect("records").clone())
    }

    async fn create(&self, draft: &NewSimulation) -> Result<Simulation, TransportError> {
        self.record_call("create");
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut record = row(id, "Not started");
        record.name = draft.name().to_string();
        record.params = draft.params().clone();
        self.records.lock().expect("records").insert(0, record.clone());
        Ok(record)
    }

    async fn execute(
        &self,
        id: SimulationId,
        _params: &SimulationParams,
    ) -> Result<ExecuteAck, TransportError> {
        self.record_call(format!("run {id}"));
        Ok(ExecuteAck::default())
    }

    async fn delete(&self, id: SimulationId) -> Result<(), TransportError> {
        self.record_call(format!("delete {id}"));
        self.records.lock().expect("records").retain(|r| r.id != id);
        Ok(())
    }

    async fn delete_all(&self) -> Result<BulkDeleteOutcome, TransportError> {
        self.record_call("delete all");
        if self.refuse_bulk_delete {
            return Err(TransportError::Rejected("database locked".to_string()));
        }
        self.records.lock().expect("records").clear();
        Ok(BulkDeleteOutcome {
            message: "All simulations deleted".to_string(),
        })
    }

    async fn download(&self, id: SimulationId) -> Result<Artifact, TransportError> {
        self.record_call(format!("download {id}"));
        Ok(Artifact {
            id,
            file_name: Artifact::default_file_name(id),
            bytes: b"MATLAB 5.0 MAT-file".to_vec(),
        })
    }
}

struct Harness {
    api: Arc<FakeApi>,
    engine: Reconciler,
    dispatcher: Dispatcher,
    events: mpsc::Receiver<SyncEvent>,
    dir: tempfile::TempDir,
}

impl Harness {
    fn new(api: FakeApi) -> Self {
        let api = Arc::new(api);
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, events) = mpsc::channel(4);
        let dispatcher = Dispatcher::new(api.clone(), tx, dir.path().to_path_buf());
        Self {
            api,
            engine: Reconciler::new(),
            dispatcher,
            events,
            dir,
        }
    }

    async fn settle(&mut self) {
        let event = self.events.recv().await.expect("dispatcher event");
        self.engine.apply(event);
    }

    async fn mount(&mut self) {
        self.engine.begin(PendingOp::Snapshot).expect("begin snapshot");
        self.dispatcher.fetch_snapshot();
        self.settle().await;
    }

    fn ids(&self) -> Vec<u64> {
        self.engine.store().all().map(|r| r.id.0).collect()
    }
}

#[tokio::test]
async fn mount_loads_snapshot_once() {
    let mut harness = Harness::new(FakeApi::with_records(vec![
        row(2, "Running"),
        row(1, "Not started"),
    ]));
    harness.mount().await;
    assert_eq!(harness.ids(), vec![2, 1]);
    assert!(matches!(
        harness.engine.snapshot_state(),
        SnapshotState::Loaded { .. }
    ));
    assert_eq!(harness.api.calls(), vec!["fetch"]);
}

#[tokio::test]
async fn unreachable_backend_leaves_store_empty() {
    let mut harness = Harness::new(FakeApi {
        snapshot_down: true,
        ..FakeApi::default()
    });
    harness.mount().await;
    assert!(harness.engine.store().is_empty());
    assert_eq!(
        harness.engine.latest_notice().map(|n| n.level),
        Some(NoticeLevel::Error)
    );
}

#[tokio::test]
async fn create_run_and_delete_round_trip() {
    let mut harness = Harness::new(FakeApi::with_records(vec![row(1, "Finished")]));
    harness.mount().await;

    let new_sim = draft("2").validate().expect("valid draft");
    harness.engine.begin(PendingOp::Create).expect("begin create");
    harness.dispatcher.create(new_sim);
    harness.settle().await;
    assert_eq!(harness.ids(), vec![2, 1]);

    let record = harness
        .engine
        .store()
        .get(SimulationId(2))
        .cloned()
        .expect("created record");
    harness
        .engine
        .begin(PendingOp::Execute(record.id))
        .expect("begin run");
    harness.dispatcher.execute(&record);
    harness.settle().await;
    assert_eq!(
        harness.engine.store().get(SimulationId(2)).map(|r| r.status),
        Some(SimulationStatus::Running)
    );

    harness.engine.apply(SyncEvent::Status(
        StatusEvent::new(SimulationId(2), SimulationStatus::Running).with_progress(55),
    ));
    harness.engine.open(SimulationId(2)).expect("open");
    assert_eq!(
        harness.engine.detail().and_then(|view| view.progress()),
        Some(55)
    );

    harness
        .engine
        .begin(PendingOp::Delete(SimulationId(2)))
        .expect("begin delete");
    harness.dispatcher.delete(SimulationId(2));
    harness.settle().await;
    assert_eq!(harness.ids(), vec![1]);
    assert!(harness.engine.detail().is_none());
    assert_eq!(
        harness.api.calls(),
        vec!["fetch", "create", "run 2", "delete 2"]
    );
}

#[tokio::test]
async fn invalid_draft_never_reaches_transport() {
    let mut harness = Harness::new(FakeApi::with_records(vec![row(1, "Not started")]));
    harness.mount().await;
    assert!(draft("0").validate().is_err());
    assert_eq!(harness.ids(), vec![1]);
    assert_eq!(harness.api.calls(), vec!["fetch"]);
}

#[tokio::test]
async fn refused_bulk_delete_keeps_records() {
    let mut harness = Harness::new(FakeApi {
        refuse_bulk_delete: true,
        ..FakeApi::with_records(vec![row(1, "Finished"), row(2, "Error")])
    });
    harness.mount().await;
    harness.engine.begin(PendingOp::DeleteAll).expect("begin");
    harness.dispatcher.delete_all();
    harness.settle().await;
    assert_eq!(harness.ids(), vec![1, 2]);
    assert!(!harness.engine.is_pending(PendingOp::DeleteAll));
}

#[tokio::test]
async fn download_writes_result_file() {
    let mut harness = Harness::new(FakeApi::with_records(vec![row(4, "Finished")]));
    harness.mount().await;
    harness
        .engine
        .begin(PendingOp::Download(SimulationId(4)))
        .expect("begin download");
    harness.dispatcher.download(SimulationId(4));
    harness.settle().await;

    let saved = harness.dir.path().join("simulacion_4.mat");
    assert_eq!(
        std::fs::read(&saved).expect("saved file"),
        b"MATLAB 5.0 MAT-file".to_vec()
    );
    let message = harness
        .engine
        .latest_notice()
        .map(|n| n.message.clone())
        .unwrap_or_default();
    assert!(message.contains("simulacion_4.mat"), "{message}");
}
