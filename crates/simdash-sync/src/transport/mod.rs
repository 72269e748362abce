//! Boundary to the simulation backend: request/response calls over HTTP and
//! the push event stream over Socket.IO. Everything past this module sees
//! only canonical `simdash_core` types.

use async_trait::async_trait;
use simdash_core::{NewSimulation, Simulation, SimulationId, SimulationParams};
use thiserror::Error;

pub mod http;
pub mod stream;

pub use http::HttpSimulationApi;
pub use stream::{EventStream, StreamHandle, StreamNotice, StreamOptions, Subscription};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("server answered {code}: {message}")]
    Status { code: u16, message: String },
    #[error("server rejected the request: {0}")]
    Rejected(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("event stream failed: {0}")]
    Stream(String),
}

/// Acknowledgement of a run request. The backend echoes the record it
/// flipped to running when it can.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecuteAck {
    pub record: Option<Simulation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDeleteOutcome {
    pub message: String,
}

/// A downloaded result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: SimulationId,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn default_file_name(id: SimulationId) -> String {
        format!("simulacion_{id}.mat")
    }
}

#[async_trait]
pub trait SimulationApi: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Vec<Simulation>, TransportError>;

    async fn create(&self, draft: &NewSimulation) -> Result<Simulation, TransportError>;

    /// Starts a simulation. The backend re-reads the run parameters from the
    /// request body, so they travel with the id.
    async fn execute(
        &self,
        id: SimulationId,
        params: &SimulationParams,
    ) -> Result<ExecuteAck, TransportError>;

    async fn delete(&self, id: SimulationId) -> Result<(), TransportError>;

    /// Succeeds only when the backend reports `status == "success"`.
    async fn delete_all(&self) -> Result<BulkDeleteOutcome, TransportError>;

    async fn download(&self, id: SimulationId) -> Result<Artifact, TransportError>;
}
