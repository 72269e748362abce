use crate::engine::SyncEvent;
use crate::transport::{SimulationApi, TransportError};
use simdash_core::{NewSimulation, Simulation, SimulationId};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Runs API calls off the owning loop and reports each outcome back as a
/// [`SyncEvent`], so the store is still only mutated by the reconciler.
#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn SimulationApi>,
    events: mpsc::Sender<SyncEvent>,
    download_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(
        api: Arc<dyn SimulationApi>,
        events: mpsc::Sender<SyncEvent>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            api,
            events,
            download_dir,
        }
    }

    pub fn fetch_snapshot(&self) {
        let api = Arc::clone(&self.api);
        self.spawn(async move { SyncEvent::Snapshot(api.fetch_snapshot().await) });
    }

    pub fn create(&self, draft: NewSimulation) {
        let api = Arc::clone(&self.api);
        self.spawn(async move { SyncEvent::Created(api.create(&draft).await) });
    }

    pub fn execute(&self, record: &Simulation) {
        let api = Arc::clone(&self.api);
        let id = record.id;
        let params = record.params.clone();
        self.spawn(async move {
            SyncEvent::Executed {
                id,
                result: api.execute(id, &params).await,
            }
        });
    }

    pub fn delete(&self, id: SimulationId) {
        let api = Arc::clone(&self.api);
        self.spawn(async move {
            SyncEvent::Deleted {
                id,
                result: api.delete(id).await,
            }
        });
    }

    pub fn delete_all(&self) {
        let api = Arc::clone(&self.api);
        self.spawn(async move { SyncEvent::DeletedAll(api.delete_all().await) });
    }

    pub fn download(&self, id: SimulationId) {
        let api = Arc::clone(&self.api);
        let dir = self.download_dir.clone();
        self.spawn(async move {
            SyncEvent::Downloaded {
                id,
                result: save_artifact(api.as_ref(), id, dir).await,
            }
        });
    }

    fn spawn<F>(&self, request: F)
    where
        F: Future<Output = SyncEvent> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = request.await;
            if events.send(event).await.is_err() {
                debug!(event = "dispatch_receiver_closed");
            }
        });
    }
}

/// Fetches the result file and writes it into `dir`.
pub async fn save_artifact(
    api: &dyn SimulationApi,
    id: SimulationId,
    dir: PathBuf,
) -> Result<PathBuf, DownloadError> {
    let artifact = api.download(id).await?;
    let path = dir.join(&artifact.file_name);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|source| DownloadError::Write {
            path: dir.clone(),
            source,
        })?;
    tokio::fs::write(&path, &artifact.bytes)
        .await
        .map_err(|source| DownloadError::Write {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}
