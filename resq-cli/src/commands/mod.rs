//! CLI command implementations.

pub mod clear;
pub mod create;
pub mod init;
pub mod list;
pub mod peers;
pub mod role;
pub mod serve;
pub mod status;
pub mod update;

use anyhow::{Context, Result};
use resq_node::{
    DropDirTransport, Engine, IdentityService, InboundStream, NodeConfig, Orchestrator,
    SqliteStore,
};
use resq_types::{DeviceIdentity, DisasterRequest};
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the optional config file inside the data directory.
pub const CONFIG_FILE: &str = "resq.toml";

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Directory holding the database and config file.
    pub data_dir: PathBuf,
    /// Shared directory overriding `[drop_dir] directory`.
    pub drop_dir: Option<PathBuf>,
}

impl NodeOptions {
    /// Options for `data_dir` with no drop directory override.
    #[cfg(test)]
    pub fn local(data_dir: &std::path::Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            drop_dir: None,
        }
    }

    /// Options sharing `drop_dir`, scanning it every 50 ms.
    #[cfg(test)]
    pub fn shared(data_dir: &std::path::Path, drop_dir: &std::path::Path) -> Self {
        std::fs::write(
            data_dir.join(CONFIG_FILE),
            "[drop_dir]\npoll_interval_ms = 50\n",
        )
        .unwrap();
        Self {
            data_dir: data_dir.to_path_buf(),
            drop_dir: Some(drop_dir.to_path_buf()),
        }
    }

    /// Load `resq.toml` from the data directory, or defaults if absent.
    ///
    /// A relative database path is resolved against the data directory.
    pub fn load_config(&self) -> Result<NodeConfig> {
        let path = self.data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            NodeConfig::from_file(&path)?
        } else {
            NodeConfig::default()
        };

        if config.storage.database.is_relative() {
            config.storage.database = self.data_dir.join(&config.storage.database);
        }
        if let Some(dir) = &self.drop_dir {
            config.drop_dir.directory = Some(dir.clone());
        }
        Ok(config)
    }

    /// Open the local store.
    pub async fn open_store(&self, config: &NodeConfig) -> Result<Arc<SqliteStore>> {
        let store = SqliteStore::connect(&config.storage.database)
            .await
            .with_context(|| {
                format!(
                    "Failed to open database {}",
                    config.storage.database.display()
                )
            })?;
        Ok(Arc::new(store))
    }
}

/// A running node: store, identity, transports and engine.
pub struct Node {
    /// Effective configuration.
    pub config: NodeConfig,
    /// Identity snapshot taken at startup.
    pub identity: DeviceIdentity,
    /// The reconciliation engine.
    pub engine: Arc<Engine<SqliteStore>>,
    /// Unified inbound stream, until handed to the engine.
    pub inbound: Option<InboundStream>,
}

impl Node {
    /// Open the store, load the identity and start every configured transport.
    pub async fn open(options: &NodeOptions) -> Result<Self> {
        let config = options.load_config()?;
        let store = options.open_store(&config).await?;

        let identity = IdentityService::new(Arc::clone(&store))
            .load()
            .await
            .context("Failed to load device identity")?;

        let (orchestrator, inbound) = Orchestrator::from_config(&config);
        if let Some(transport) =
            DropDirTransport::from_config(&config.drop_dir, identity.id.clone(), identity.role)
        {
            orchestrator.register_provider(Arc::new(transport));
        }
        for failure in orchestrator.start_all().await {
            eprintln!(
                "warning: transport {} did not start: {}",
                failure.provider, failure.error
            );
        }

        let engine = Engine::new(store, Arc::new(orchestrator), identity.id.clone())
            .await
            .context("Failed to start engine")?;

        Ok(Self {
            config,
            identity,
            engine: Arc::new(engine),
            inbound: Some(inbound),
        })
    }

    /// Hand the inbound stream to the engine's merge loop.
    pub fn spawn_inbound(&mut self) -> Option<tokio::task::JoinHandle<()>> {
        self.inbound
            .take()
            .map(|inbound| self.engine.spawn_inbound(inbound))
    }

    /// Finish pending broadcasts and stop every transport.
    pub async fn shutdown(&self) {
        self.engine.flush_broadcasts().await;
        for failure in self.engine.orchestrator().stop_all().await {
            eprintln!(
                "warning: transport {} did not stop cleanly: {}",
                failure.provider, failure.error
            );
        }
    }
}

/// Shorten an id for table output.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((index, _)) => &id[..index],
        None => id,
    }
}

/// One-line rendering of a request.
pub fn request_line(request: &DisasterRequest) -> String {
    format!(
        "{}  {:<12}  {:<9}  {}",
        short_id(request.id.as_str()),
        request.status.as_str(),
        request.kind,
        request.description
    )
}
