//! Transport orchestrator.
//!
//! Owns every registered provider. Outbound, a broadcast is offered to all
//! available providers at once, each attempt time-boxed and isolated from the
//! others. Inbound, each provider gets its own bounded channel; a drain task
//! per provider forwards deliveries into one unified stream for the engine and
//! records who sent them in the peer table.

use crate::config::{NodeConfig, PeerConfig, TransportConfig};
use crate::transport::{Delivery, ProviderError, TransportProvider};
use futures_util::future::join_all;
use resq_core::PeerTable;
use resq_types::{now_millis, DisasterRequest, Peer};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A delivery tagged with the provider it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRecord {
    /// Provider name.
    pub provider: String,
    /// What arrived.
    pub delivery: Delivery,
}

/// Unified inbound stream consumed by the engine.
pub type InboundStream = mpsc::Receiver<InboundRecord>;

/// One provider's failure during a fan-out operation.
#[derive(Debug)]
pub struct ProviderFailure {
    /// Provider name.
    pub provider: String,
    /// What went wrong.
    pub error: ProviderError,
}

/// Outcome of one broadcast across all providers.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Providers that accepted the record.
    pub delivered: Vec<String>,
    /// Providers that failed or timed out.
    pub failed: Vec<ProviderFailure>,
    /// Providers skipped because they reported themselves unavailable.
    pub skipped: Vec<String>,
}

impl BroadcastReport {
    /// Total providers considered.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len() + self.skipped.len()
    }
}

/// Per-provider health snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    /// Provider name.
    pub name: String,
    /// Current availability flag.
    pub available: bool,
    /// Successful broadcasts since registration.
    pub broadcasts_ok: u64,
    /// Failed or timed-out broadcasts since registration.
    pub broadcasts_failed: u64,
    /// Broadcasts skipped while unavailable.
    pub broadcasts_skipped: u64,
    /// Inbound deliveries forwarded.
    pub deliveries: u64,
    /// Most recent broadcast error.
    pub last_error: Option<String>,
}

/// Counters for one provider.
#[derive(Debug, Default)]
struct ProviderStats {
    broadcasts_ok: AtomicU64,
    broadcasts_failed: AtomicU64,
    broadcasts_skipped: AtomicU64,
    deliveries: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ProviderStats {
    fn record_failure(&self, error: &ProviderError) {
        self.broadcasts_failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
    }
}

struct Registered {
    provider: Arc<dyn TransportProvider>,
    stats: Arc<ProviderStats>,
    drain: JoinHandle<()>,
}

/// Fans broadcasts out to, and deliveries in from, every registered provider.
pub struct Orchestrator {
    broadcast_timeout: Duration,
    inbound_buffer: usize,
    providers: RwLock<Vec<Registered>>,
    inbound: mpsc::Sender<InboundRecord>,
    peers: Arc<Mutex<PeerTable>>,
}

impl Orchestrator {
    /// Create an orchestrator and the inbound stream it feeds.
    pub fn new(transport: &TransportConfig, peers: &PeerConfig) -> (Self, InboundStream) {
        let inbound_buffer = transport.inbound_buffer.max(1);
        let (inbound, stream) = mpsc::channel(inbound_buffer);

        let orchestrator = Self {
            broadcast_timeout: transport.broadcast_timeout(),
            inbound_buffer,
            providers: RwLock::new(Vec::new()),
            inbound,
            peers: Arc::new(Mutex::new(PeerTable::new(peers.stale_after_ms()))),
        };
        (orchestrator, stream)
    }

    /// Create from the node configuration.
    pub fn from_config(config: &NodeConfig) -> (Self, InboundStream) {
        Self::new(&config.transport, &config.peers)
    }

    /// Register a provider and start draining its inbound channel.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register_provider(&self, provider: Arc<dyn TransportProvider>) {
        let name = provider.name().to_string();
        let stats = Arc::new(ProviderStats::default());

        let (tx, mut rx) = mpsc::channel::<Delivery>(self.inbound_buffer);
        provider.attach(tx);

        let drain = {
            let name = name.clone();
            let stats = Arc::clone(&stats);
            let peers = Arc::clone(&self.peers);
            let unified = self.inbound.clone();

            tokio::spawn(async move {
                while let Some(delivery) = rx.recv().await {
                    stats.deliveries.fetch_add(1, Ordering::Relaxed);
                    if let Some(origin) = &delivery.origin {
                        lock(&peers).observe(origin.clone(), delivery.role, now_millis());
                    }

                    let record = InboundRecord {
                        provider: name.clone(),
                        delivery,
                    };
                    if unified.send(record).await.is_err() {
                        tracing::debug!("{}: inbound stream closed, drain exiting", name);
                        break;
                    }
                }
            })
        };

        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        if providers.iter().any(|r| r.provider.name() == name) {
            tracing::warn!("Provider name {} registered twice", name);
        }
        providers.push(Registered {
            provider,
            stats,
            drain,
        });
        tracing::info!("Registered transport provider {}", name);
    }

    /// Number of registered providers.
    pub fn provider_count(&self) -> usize {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn snapshot(&self) -> Vec<(Arc<dyn TransportProvider>, Arc<ProviderStats>)> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| (Arc::clone(&r.provider), Arc::clone(&r.stats)))
            .collect()
    }

    /// Start every provider concurrently.
    ///
    /// Returns the providers that failed; the rest are running.
    pub async fn start_all(&self) -> Vec<ProviderFailure> {
        let providers = self.snapshot();
        let results = join_all(
            providers
                .iter()
                .map(|(provider, _)| async move { (provider.name().to_string(), provider.start().await) }),
        )
        .await;

        let failures = collect_failures("start", results);
        tracing::info!(
            "Started {} of {} transport providers",
            providers.len() - failures.len(),
            providers.len()
        );
        failures
    }

    /// Stop every provider concurrently.
    pub async fn stop_all(&self) -> Vec<ProviderFailure> {
        let providers = self.snapshot();
        let results = join_all(
            providers
                .iter()
                .map(|(provider, _)| async move { (provider.name().to_string(), provider.stop().await) }),
        )
        .await;

        let failures = collect_failures("stop", results);
        tracing::info!("Stopped transport providers ({} failures)", failures.len());
        failures
    }

    /// Offer `request` to every available provider at once.
    ///
    /// Each attempt is bounded by the broadcast timeout. Failures are logged
    /// and counted, never propagated.
    pub async fn broadcast(&self, request: &DisasterRequest) -> BroadcastReport {
        let providers = self.snapshot();
        let timeout = self.broadcast_timeout;

        let attempts = providers.iter().map(|(provider, stats)| async move {
            let name = provider.name().to_string();
            if !provider.is_available() {
                stats.broadcasts_skipped.fetch_add(1, Ordering::Relaxed);
                return (name, None);
            }

            let result =
                match tokio::time::timeout(timeout, provider.broadcast_request(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout {
                        provider: name.clone(),
                        after: timeout,
                    }),
                };

            match &result {
                Ok(()) => {
                    stats.broadcasts_ok.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => stats.record_failure(e),
            }
            (name, Some(result))
        });

        let mut report = BroadcastReport::default();
        for (name, outcome) in join_all(attempts).await {
            match outcome {
                None => {
                    tracing::debug!("{}: unavailable, skipped broadcast of {}", name, request.id);
                    report.skipped.push(name);
                }
                Some(Ok(())) => report.delivered.push(name),
                Some(Err(error)) => {
                    tracing::warn!("Broadcast of {} via {} failed: {}", request.id, name, error);
                    report.failed.push(ProviderFailure {
                        provider: name,
                        error,
                    });
                }
            }
        }

        tracing::debug!(
            "Broadcast {}: {} delivered, {} failed, {} skipped",
            request.id,
            report.delivered.len(),
            report.failed.len(),
            report.skipped.len()
        );
        report
    }

    /// Health of every provider, in registration order.
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| ProviderStatus {
                name: r.provider.name().to_string(),
                available: r.provider.is_available(),
                broadcasts_ok: r.stats.broadcasts_ok.load(Ordering::Relaxed),
                broadcasts_failed: r.stats.broadcasts_failed.load(Ordering::Relaxed),
                broadcasts_skipped: r.stats.broadcasts_skipped.load(Ordering::Relaxed),
                deliveries: r.stats.deliveries.load(Ordering::Relaxed),
                last_error: r
                    .stats
                    .last_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
            })
            .collect()
    }

    /// Peers seen in inbound traffic, most recent first.
    pub fn peers(&self, now: i64) -> Vec<Peer> {
        lock(&self.peers).snapshot(now)
    }

    /// Number of peers seen recently enough to count as connected.
    pub fn connected_peers(&self, now: i64) -> usize {
        lock(&self.peers).connected_count(now)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        let providers = self.providers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for registered in providers.iter() {
            registered.drain.abort();
        }
    }
}

fn lock(peers: &Mutex<PeerTable>) -> MutexGuard<'_, PeerTable> {
    peers.lock().unwrap_or_else(PoisonError::into_inner)
}

fn collect_failures(
    action: &str,
    results: Vec<(String, Result<(), ProviderError>)>,
) -> Vec<ProviderFailure> {
    results
        .into_iter()
        .filter_map(|(provider, result)| match result {
            Ok(()) => None,
            Err(error) => {
                tracing::warn!("Failed to {} provider {}: {}", action, provider, error);
                Some(ProviderFailure { provider, error })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use resq_types::{DeviceId, Role};
    use std::time::Instant;

    fn config(timeout_ms: u64) -> TransportConfig {
        TransportConfig {
            broadcast_timeout_ms: timeout_ms,
            inbound_buffer: 8,
        }
    }

    fn sample() -> DisasterRequest {
        DisasterRequest::create(DeviceId::from("a"), "medical", "Child with high fever", None, 1)
    }

    async fn orchestrator_with(
        timeout_ms: u64,
        mocks: &[&MockTransport],
    ) -> (Orchestrator, InboundStream) {
        let (orchestrator, inbound) = Orchestrator::new(&config(timeout_ms), &PeerConfig::default());
        for mock in mocks {
            orchestrator.register_provider(Arc::new((*mock).clone()));
        }
        assert!(orchestrator.start_all().await.is_empty());
        (orchestrator, inbound)
    }

    // ===========================================
    // Broadcast Tests
    // ===========================================

    #[tokio::test]
    async fn broadcast_reaches_every_provider() {
        let a = MockTransport::new("a");
        let b = MockTransport::new("b");
        let (orchestrator, _inbound) = orchestrator_with(1_000, &[&a, &b]).await;

        let report = orchestrator.broadcast(&sample()).await;

        assert_eq!(report.delivered.len(), 2);
        assert_eq!(a.broadcast_count(), 1);
        assert_eq!(b.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn failing_provider_does_not_affect_siblings() {
        let good1 = MockTransport::new("good1");
        let bad = MockTransport::new("bad");
        let good2 = MockTransport::new("good2");
        bad.fail_always("radio dead");
        let (orchestrator, _inbound) = orchestrator_with(1_000, &[&good1, &bad, &good2]).await;

        let report = orchestrator.broadcast(&sample()).await;

        assert_eq!(report.delivered, vec!["good1".to_string(), "good2".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].provider, "bad");
        assert!(matches!(report.failed[0].error, ProviderError::SendFailed(_)));
        assert_eq!(good1.broadcast_count(), 1);
        assert_eq!(good2.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn hanging_provider_times_out_alone() {
        let fast = MockTransport::new("fast");
        let slow = MockTransport::new("slow");
        slow.set_delay(Duration::from_secs(5));
        let (orchestrator, _inbound) = orchestrator_with(50, &[&fast, &slow]).await;

        let started = Instant::now();
        let report = orchestrator.broadcast(&sample()).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(report.delivered, vec!["fast".to_string()]);
        assert!(matches!(
            report.failed[0].error,
            ProviderError::Timeout { ref provider, .. } if provider == "slow"
        ));
    }

    #[tokio::test]
    async fn unavailable_provider_is_skipped() {
        let up = MockTransport::new("up");
        let down = MockTransport::new("down");
        down.set_available(false);
        let (orchestrator, _inbound) = orchestrator_with(1_000, &[&up, &down]).await;

        let report = orchestrator.broadcast(&sample()).await;

        assert_eq!(report.skipped, vec!["down".to_string()]);
        assert_eq!(report.attempted(), 2);
        assert_eq!(down.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_without_providers_is_empty() {
        let (orchestrator, _inbound) = orchestrator_with(1_000, &[]).await;
        let report = orchestrator.broadcast(&sample()).await;
        assert_eq!(report.attempted(), 0);
    }

    #[tokio::test]
    async fn provider_status_counts_outcomes() {
        let flaky = MockTransport::new("flaky");
        let (orchestrator, _inbound) = orchestrator_with(1_000, &[&flaky]).await;

        flaky.fail_next_broadcast("interference");
        orchestrator.broadcast(&sample()).await;
        orchestrator.broadcast(&sample()).await;
        flaky.set_available(false);
        orchestrator.broadcast(&sample()).await;

        let status = &orchestrator.provider_status()[0];
        assert_eq!(status.name, "flaky");
        assert!(!status.available);
        assert_eq!(status.broadcasts_ok, 1);
        assert_eq!(status.broadcasts_failed, 1);
        assert_eq!(status.broadcasts_skipped, 1);
        assert_eq!(status.last_error.as_deref(), Some("send failed: interference"));
    }

    // ===========================================
    // Lifecycle Tests
    // ===========================================

    #[tokio::test]
    async fn start_failure_is_isolated() {
        let ok = MockTransport::new("ok");
        let broken = MockTransport::new("broken");
        broken.fail_next_start("no adapter");

        let (orchestrator, _inbound) = Orchestrator::new(&config(1_000), &PeerConfig::default());
        orchestrator.register_provider(Arc::new(ok.clone()));
        orchestrator.register_provider(Arc::new(broken.clone()));

        let failures = orchestrator.start_all().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].provider, "broken");
        assert!(ok.is_started());
        assert!(!broken.is_started());

        assert!(orchestrator.stop_all().await.is_empty());
        assert!(!ok.is_started());
    }

    // ===========================================
    // Inbound Tests
    // ===========================================

    #[tokio::test]
    async fn deliveries_from_all_providers_are_merged() {
        let a = MockTransport::new("a");
        let b = MockTransport::new("b");
        let (orchestrator, mut inbound) = orchestrator_with(1_000, &[&a, &b]).await;

        a.simulate_incoming(sample()).await.unwrap();
        b.simulate_incoming(sample()).await.unwrap();

        let mut providers = vec![
            inbound.recv().await.unwrap().provider,
            inbound.recv().await.unwrap().provider,
        ];
        providers.sort();
        assert_eq!(providers, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(orchestrator.provider_status()[0].deliveries, 1);
    }

    #[tokio::test]
    async fn delivery_origin_is_recorded_as_peer() {
        let radio = MockTransport::new("radio");
        let (orchestrator, mut inbound) = orchestrator_with(1_000, &[&radio]).await;

        radio
            .simulate_incoming_from(sample(), DeviceId::from("peer-1"), Some(Role::RequestHandler))
            .await
            .unwrap();
        inbound.recv().await.unwrap();

        let peers = orchestrator.peers(now_millis());
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, DeviceId::from("peer-1"));
        assert_eq!(peers[0].role, Some(Role::RequestHandler));
        assert!(peers[0].is_connected);
        assert_eq!(orchestrator.connected_peers(now_millis()), 1);
    }

    #[tokio::test]
    async fn anonymous_delivery_adds_no_peer() {
        let radio = MockTransport::new("radio");
        let (orchestrator, mut inbound) = orchestrator_with(1_000, &[&radio]).await;

        radio.simulate_incoming(sample()).await.unwrap();
        inbound.recv().await.unwrap();

        assert!(orchestrator.peers(now_millis()).is_empty());
    }
}
