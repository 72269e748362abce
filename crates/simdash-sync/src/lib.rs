//! Client-side simulation registry and live-view synchronization.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod pagination;
pub mod selection;
pub mod store;
pub mod transport;

pub use config::{ClientConfig, ConfigError, ConfigOverrides};
pub use dispatch::{Dispatcher, DownloadError};
pub use engine::{Notice, NoticeLevel, PendingOp, Reconciler, Refusal, SyncEvent};
pub use pagination::{PageView, Pagination, ViewportProbe};
pub use selection::{Affordances, DetailView, Selection};
pub use store::{RecordStore, StaleReference};
pub use transport::{
    Artifact, BulkDeleteOutcome, EventStream, ExecuteAck, HttpSimulationApi, SimulationApi,
    StreamHandle, StreamNotice, StreamOptions, Subscription, TransportError,
};
