//! Transport abstraction for ResQLink.
//!
//! A provider is one medium that can carry request records between devices
//! (a shared folder, a radio, a mock for tests). Providers are independent:
//! one failing or hanging never affects another.
//!
//! # Design
//!
//! The trait is broadcast-oriented rather than connection-oriented:
//! - `start()` / `stop()` bring the medium up and down
//! - `broadcast_request()` offers a full record to whoever is reachable
//! - `attach()` hands the provider a bounded channel for inbound deliveries
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new("mock");
//! transport.attach(sink);
//! transport.start().await?;
//! transport.broadcast_request(&request).await?;
//! ```

mod drop_dir;
mod mock;

pub use drop_dir::DropDirTransport;
pub use mock::MockTransport;

use async_trait::async_trait;
use resq_types::{DeviceId, DisasterRequest, Role, TypesError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// A record that arrived on some transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// The full record as the sender had it.
    pub request: DisasterRequest,
    /// Device that put it on the transport, when the medium reports it.
    pub origin: Option<DeviceId>,
    /// Role that device announced, when the medium reports it.
    pub role: Option<Role>,
}

impl Delivery {
    /// A delivery with no origin metadata.
    pub fn anonymous(request: DisasterRequest) -> Self {
        Self {
            request,
            origin: None,
            role: None,
        }
    }
}

/// Where a provider pushes inbound deliveries.
pub type InboundSink = mpsc::Sender<Delivery>;

/// Transport provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The medium is not usable right now.
    #[error("provider {provider} unavailable")]
    Unavailable {
        /// Provider name.
        provider: String,
    },

    /// The provider did not finish within the broadcast timeout.
    #[error("provider {provider} timed out after {after:?}")]
    Timeout {
        /// Provider name.
        provider: String,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// Broadcast failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Start failed.
    #[error("start failed: {0}")]
    StartFailed(String),

    /// Operation needs `start()` first.
    #[error("provider not started")]
    NotStarted,

    /// No inbound sink attached.
    #[error("no inbound sink attached")]
    NotAttached,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire encoding error.
    #[error("wire format error: {0}")]
    Wire(#[from] TypesError),
}

/// A medium that can carry request records between devices.
///
/// Implementations must be safe to call concurrently: inbound deliveries can
/// arrive while a broadcast is in flight.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Stable name used in logs and status reports.
    fn name(&self) -> &str;

    /// Whether the medium is usable right now.
    ///
    /// Queried before every broadcast attempt.
    fn is_available(&self) -> bool;

    /// Bring the medium up. Inbound deliveries may start after this returns.
    async fn start(&self) -> Result<(), ProviderError>;

    /// Bring the medium down.
    async fn stop(&self) -> Result<(), ProviderError>;

    /// Offer the full record to every reachable peer.
    ///
    /// May be slow; callers bound it with a timeout.
    async fn broadcast_request(&self, request: &DisasterRequest) -> Result<(), ProviderError>;

    /// Register the channel inbound deliveries are pushed into.
    ///
    /// Replaces any previously attached sink.
    fn attach(&self, sink: InboundSink);
}
