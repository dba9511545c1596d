pub mod apply;
pub mod providers;
pub mod status;

use anyhow::Result;
use declarative::{BoxedResource, Manager, Registry, TemplateEnvironment};
use std::path::Path;
use std::sync::Arc;

use crate::config::AgentConfig;
use crate::facts;
use crate::manager::Agent;
use crate::manifest::Manifest;
use crate::session::{self, Session, SessionKind, SessionRecord};

/// One agent run over a manifest
pub struct Run {
    pub config: AgentConfig,
    pub noop: bool,
    pub session: Arc<Session>,
    pub resources: Vec<BoxedResource>,
}

impl Run {
    /// Load the agent config, then build every resource in the manifest
    pub fn prepare(manifest: &Path, kind: SessionKind, noop: bool) -> Result<Self> {
        Self::prepare_with(AgentConfig::load()?, manifest, kind, noop)
    }

    pub fn prepare_with(
        config: AgentConfig,
        manifest: &Path,
        kind: SessionKind,
        noop: bool,
    ) -> Result<Self> {
        let noop = noop || config.noop;
        let manifest = Manifest::load(manifest)?;
        let data = manifest.merged_data(config.data_value()?);
        let env = TemplateEnvironment::new(facts::gather(), data);

        let session = Arc::new(Session::new(kind, noop));
        let manager: Arc<dyn Manager> = Arc::new(Agent::new(
            noop,
            config.command_timeout(),
            env,
            session.clone(),
        ));
        let registry = Arc::new(Registry::new());
        crate::providers::register_builtin(&registry)?;

        let resources = manifest.resources(&manager, &registry)?;
        session.declare(&resources);
        log::debug!("Loaded {} resources", resources.len());

        Ok(Self {
            config,
            noop,
            session,
            resources,
        })
    }

    /// Snapshot the session, persisting it when sessions are recorded
    pub fn finish(&self) -> Result<SessionRecord> {
        let record = self.session.finish();
        if self.config.record_sessions {
            let path = session::save(&record, &self.config.state_dir()?)?;
            log::info!("Session written to {}", path.display());
        }
        Ok(record)
    }
}
