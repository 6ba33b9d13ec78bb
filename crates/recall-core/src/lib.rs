pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod paths;
pub mod runtime;
pub mod storage;

pub use config::RecallConfig;
pub use error::{RecallError, Result};
pub use models::*;

use std::sync::Arc;
use std::time::Duration;

use recall_ai::{Mode, SharedMode};
use runtime::{
    EventBridge, FallbackChain, PromptAssembler, SessionManager, SessionOrchestrator,
    StorageWorkSource, TokenSplit,
};
use storage::Storage;
use tracing::{info, warn};

use crate::memory::StoredResponseProcessor;

/// Process-wide capture state: storage, the backend chain and the session table.
pub struct RecallCore {
    pub config: RecallConfig,
    pub storage: Storage,
    pub modes: SharedMode,
    pub manager: Arc<SessionManager>,
}

impl RecallCore {
    /// Open storage at the configured path and build the configured chain.
    pub async fn new(config: RecallConfig) -> Result<Self> {
        let db_path = config.db_path()?;
        let storage = Storage::new(&db_path)?;
        let chain = FallbackChain::from_config(&config)?;
        info!(
            db_path = %db_path.display(),
            backends = chain.len(),
            primary = chain.primary_name().unwrap_or("none"),
            "Initializing Recall"
        );
        Self::with_chain(config, storage, chain)
    }

    /// Assemble the runtime around an explicit chain.
    pub fn with_chain(config: RecallConfig, storage: Storage, chain: FallbackChain) -> Result<Self> {
        let mode = match Mode::by_name(&config.agent.mode) {
            Some(mode) => mode,
            None => {
                warn!(mode = %config.agent.mode, "Unknown mode, using code");
                Mode::code()
            }
        };
        let modes = SharedMode::new(mode);
        let mode_source = Arc::new(modes.clone());

        let source = StorageWorkSource::new(storage.queue.clone())
            .with_idle_timeout(Duration::from_millis(config.agent.idle_timeout_ms));
        let processor = StoredResponseProcessor::new(storage.records.clone(), mode_source.clone());

        let orchestrator = SessionOrchestrator::new(
            Arc::new(chain),
            Arc::new(processor),
            PromptAssembler::new(mode_source),
            Arc::new(source),
        )
        .with_session_store(storage.sessions.clone())
        .with_token_split(TokenSplit::new(config.agent.input_share_percent));

        let manager = Arc::new(SessionManager::new(Arc::new(orchestrator), storage.clone())?);

        Ok(Self {
            config,
            storage,
            modes,
            manager,
        })
    }

    pub fn bridge(&self) -> EventBridge {
        EventBridge::new(self.manager.clone())
    }

    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}
