//! # resq-node
//!
//! The stateful half of a ResQLink device.
//!
//! This crate wires the pure logic of `resq-core` to the outside world:
//! - [`storage`] - Local store (SQLite via sqlx) and settings
//! - [`identity`] - Persisted device id and role
//! - [`transport`] - Provider trait plus mock and shared-directory providers
//! - [`orchestrator`] - Fan-out of broadcasts, fan-in of deliveries
//! - [`engine`] - Reconciliation of local and remote changes
//! - [`config`] - TOML configuration
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(SqliteStore::connect(&path).await?);
//! let identity = IdentityService::new(Arc::clone(&store));
//! let (orchestrator, inbound) = Orchestrator::from_config(&config);
//! orchestrator.register_provider(Arc::new(MockTransport::new("mock")));
//! orchestrator.start_all().await;
//!
//! let engine = Arc::new(Engine::new(store, Arc::new(orchestrator), identity.get_or_create_device_id().await?).await?);
//! engine.spawn_inbound(inbound);
//! engine.create_request(RequestDraft::new("medical", "Two injured at the bridge"), now_millis()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
mod locks;
pub mod orchestrator;
pub mod storage;
pub mod transport;

pub use config::{ConfigError, NodeConfig};
pub use engine::{Engine, ReceiveOutcome, SubmitOutcome};
pub use error::{EngineError, IdentityError, StoreError};
pub use identity::IdentityService;
pub use orchestrator::{
    BroadcastReport, InboundRecord, InboundStream, Orchestrator, ProviderFailure, ProviderStatus,
};
pub use storage::{KeyValueStore, MemoryKeyValue, RequestStore, SqliteStore};
pub use transport::{
    Delivery, DropDirTransport, InboundSink, MockTransport, ProviderError, TransportProvider,
};
