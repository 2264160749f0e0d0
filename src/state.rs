//! Application state shared by all handlers.
//!
//! This module owns:
//!   - the study configuration and the derived allocation policy
//!   - the requirement catalog (loaded once, immutable)
//!   - the JSON document store
//!   - the agent backend and the in-memory chat session store

use std::{sync::Arc, time::Duration};

use tracing::{info, instrument, warn};

use crate::agent::{AgentBackend, CliAgent};
use crate::allocator::AllocationPolicy;
use crate::config::StudyConfig;
use crate::nfr::{Catalog, CatalogError};
use crate::sessions::{InMemorySessionStore, SessionStore};
use crate::store::JsonStore;

pub struct AppState {
    pub cfg: StudyConfig,
    pub policy: AllocationPolicy,
    pub catalog: Catalog,
    pub store: JsonStore,
    pub agent: Arc<dyn AgentBackend>,
    pub sessions: Arc<dyn SessionStore>,
    /// Sent as the first prompt of every new agent session.
    pub initial_prompt: Option<String>,
}

impl AppState {
    /// Build state with the CLI agent described by `cfg.agent`.
    #[instrument(level = "info", skip_all)]
    pub fn new(cfg: StudyConfig) -> Result<Self, CatalogError> {
        let agent = CliAgent::from_settings(&cfg.agent);
        info!(
            target: "nfr_study",
            bin = %agent.binary,
            model = %agent.model,
            project = %agent.project_path.display(),
            logs = %agent.logs_dir.display(),
            "Agent CLI configured"
        );
        Self::with_agent(cfg, Arc::new(agent))
    }

    /// Build state around any agent backend.
    pub fn with_agent(cfg: StudyConfig, agent: Arc<dyn AgentBackend>) -> Result<Self, CatalogError> {
        let catalog = Catalog::load_or_build(&cfg.requirements_path, cfg.corpus_path.as_deref(), cfg.study.page_size)?;
        let store = JsonStore::new(cfg.data_dir.clone());
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(
            cfg.sessions.max_sessions,
            Duration::from_secs(cfg.sessions.idle_ttl_secs),
        ));

        let initial_prompt = match std::fs::read_to_string(&cfg.agent.instruction_prompt_path) {
            Ok(p) => {
                info!(target: "nfr_study", path = %cfg.agent.instruction_prompt_path.display(), len = p.len(), "Instruction prompt loaded");
                Some(p)
            }
            Err(_) => {
                warn!(target: "nfr_study", path = %cfg.agent.instruction_prompt_path.display(), "No instruction prompt; new agent sessions start empty");
                None
            }
        };

        if cfg.admin_password.is_none() {
            warn!(target: "nfr_study", "ADMIN_PASSWORD not set; admin endpoints are disabled");
        }

        info!(
            target: "nfr_study",
            data_dir = %cfg.data_dir.display(),
            allocation = ?cfg.study.allocation,
            page_size = cfg.study.page_size,
            batches = catalog.total_batches(),
            "Study state ready"
        );

        Ok(Self {
            policy: AllocationPolicy::from(&cfg.study),
            catalog,
            store,
            agent,
            sessions,
            initial_prompt,
            cfg,
        })
    }
}
