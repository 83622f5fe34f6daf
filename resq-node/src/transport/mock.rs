//! Mock transport for testing.
//!
//! Records broadcasts, injects failures and delays, and lets tests push
//! inbound deliveries as if a peer had sent them.

use super::{Delivery, InboundSink, ProviderError, TransportProvider};
use async_trait::async_trait;
use resq_types::{DeviceId, DisasterRequest, Role};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Mock transport for testing.
///
/// Clones share state, so a test can keep a handle after registering the
/// provider with an orchestrator.
#[derive(Debug)]
pub struct MockTransport {
    name: String,
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug)]
struct MockTransportInner {
    started: bool,
    available: bool,
    broadcasts: Vec<DisasterRequest>,
    sink: Option<InboundSink>,
    delay: Option<Duration>,
    fail_next_start: Option<String>,
    fail_next_broadcast: Option<String>,
    fail_always: Option<String>,
}

impl Default for MockTransportInner {
    fn default() -> Self {
        Self {
            started: false,
            available: true,
            broadcasts: Vec::new(),
            sink: None,
            delay: None,
            fail_next_start: None,
            fail_next_broadcast: None,
            fail_always: None,
        }
    }
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every record broadcast so far, in order.
    pub fn broadcasts(&self) -> Vec<DisasterRequest> {
        self.state().broadcasts.clone()
    }

    /// Number of successful broadcasts.
    pub fn broadcast_count(&self) -> usize {
        self.state().broadcasts.len()
    }

    /// Whether `start()` succeeded and `stop()` was not called since.
    pub fn is_started(&self) -> bool {
        self.state().started
    }

    /// Toggle the availability flag.
    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    /// Sleep this long inside every broadcast.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Cause the next start() to fail with the given error.
    pub fn fail_next_start(&self, error: &str) {
        self.state().fail_next_start = Some(error.to_string());
    }

    /// Cause the next broadcast_request() to fail with the given error.
    pub fn fail_next_broadcast(&self, error: &str) {
        self.state().fail_next_broadcast = Some(error.to_string());
    }

    /// Cause every broadcast_request() to fail with the given error.
    pub fn fail_always(&self, error: &str) {
        self.state().fail_always = Some(error.to_string());
    }

    /// Deliver `request` as if an anonymous peer had sent it.
    pub async fn simulate_incoming(&self, request: DisasterRequest) -> Result<(), ProviderError> {
        self.deliver(Delivery::anonymous(request)).await
    }

    /// Deliver `request` as if `origin` had sent it.
    pub async fn simulate_incoming_from(
        &self,
        request: DisasterRequest,
        origin: DeviceId,
        role: Option<Role>,
    ) -> Result<(), ProviderError> {
        self.deliver(Delivery {
            request,
            origin: Some(origin),
            role,
        })
        .await
    }

    async fn deliver(&self, delivery: Delivery) -> Result<(), ProviderError> {
        let sink = self.state().sink.clone().ok_or(ProviderError::NotAttached)?;
        sink.send(delivery)
            .await
            .map_err(|_| ProviderError::SendFailed("inbound channel closed".into()))
    }

    /// Clear recorded broadcasts and injected failures.
    pub fn reset(&self) {
        let mut inner = self.state();
        inner.broadcasts.clear();
        inner.delay = None;
        inner.fail_next_start = None;
        inner.fail_next_broadcast = None;
        inner.fail_always = None;
        inner.available = true;
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl TransportProvider for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.state().available
    }

    async fn start(&self) -> Result<(), ProviderError> {
        let mut inner = self.state();

        // Check for forced failure
        if let Some(error) = inner.fail_next_start.take() {
            return Err(ProviderError::StartFailed(error));
        }

        inner.started = true;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.state().started = false;
        Ok(())
    }

    async fn broadcast_request(&self, request: &DisasterRequest) -> Result<(), ProviderError> {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.state();

        if !inner.started {
            return Err(ProviderError::NotStarted);
        }
        if !inner.available {
            return Err(ProviderError::Unavailable {
                provider: self.name.clone(),
            });
        }

        // Check for forced failure
        if let Some(error) = inner.fail_always.clone() {
            return Err(ProviderError::SendFailed(error));
        }
        if let Some(error) = inner.fail_next_broadcast.take() {
            return Err(ProviderError::SendFailed(error));
        }

        inner.broadcasts.push(request.clone());
        Ok(())
    }

    fn attach(&self, sink: InboundSink) {
        self.state().sink = Some(sink);
    }
}
