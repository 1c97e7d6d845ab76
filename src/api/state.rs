use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::jobs::{EngineContext, EngineSettings, FjallJobStore, JobOrchestrator};
use crate::ledger::{FjallLedger, LedgerStore, open_keyspace};
use crate::observability::Metrics;
use crate::storage::StorageClient;
use crate::worker::ChunkProcessor;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: JobOrchestrator,
    pub ledger: Arc<dyn LedgerStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: JobOrchestrator,
        ledger: Arc<dyn LedgerStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            ledger,
            metrics,
        }
    }

    /// Open stores and storage named by `config`, wire the orchestrator and
    /// pick up jobs left unfinished by a previous run
    pub async fn open(
        config: Config,
        processor: Arc<dyn ChunkProcessor>,
    ) -> Result<Self, AnyError> {
        info!(path = %config.server.data_path.display(), "Opening Fjall keyspace");
        let keyspace = open_keyspace(&config.server.data_path)
            .map_err(|e| format!("Failed to open Fjall keyspace: {}", e))?;
        let ledger = Arc::new(
            FjallLedger::with_keyspace(keyspace.clone())
                .map_err(|e| format!("Failed to open ledger: {}", e))?,
        );
        let jobs = Arc::new(
            FjallJobStore::with_keyspace(&keyspace)
                .map_err(|e| format!("Failed to open job store: {}", e))?,
        );

        let storage = StorageClient::from_config(&config.storage)
            .map_err(|e| format!("Failed to initialize storage: {}", e))?;
        info!(
            provider = ?config.storage.provider,
            bucket = %storage.bucket,
            "Storage ready"
        );

        let metrics = Arc::new(Metrics::new());
        let orchestrator = JobOrchestrator::new(EngineContext {
            ledger: ledger.clone(),
            jobs,
            processor,
            storage: Arc::new(storage),
            metrics: metrics.clone(),
            settings: EngineSettings::from(&config),
        });
        orchestrator
            .recover()
            .await
            .map_err(|e| format!("Failed to recover unfinished jobs: {}", e))?;

        Ok(Self::new(config, orchestrator, ledger, metrics))
    }
}
