//! File-drop transport over a shared directory.
//!
//! Every broadcast writes one MessagePack [`Envelope`] file named
//! `<request-id>.<origin>.<nonce>.resq`. Any device that can see the same
//! directory (USB stick passed between camps, a synced folder, a network
//! share) picks the file up on its next scan. Files are never deleted here;
//! the directory is a shared log that late joiners can replay.

use super::{Delivery, InboundSink, ProviderError, TransportProvider};
use crate::config::DropDirConfig;
use async_trait::async_trait;
use resq_types::{now_millis, DeviceId, DisasterRequest, Envelope, RequestId, Role};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

const SUFFIX: &str = ".resq";

/// Transport that exchanges envelopes through a shared directory.
pub struct DropDirTransport {
    name: String,
    directory: PathBuf,
    poll_interval: Duration,
    origin: DeviceId,
    role: Option<Role>,
    state: Mutex<DropDirState>,
}

#[derive(Default)]
struct DropDirState {
    sink: Option<InboundSink>,
    poller: Option<JoinHandle<()>>,
}

impl DropDirTransport {
    /// Create a transport writing as `origin` into `directory`.
    pub fn new(directory: impl Into<PathBuf>, origin: DeviceId, role: Option<Role>) -> Self {
        Self {
            name: "drop-dir".to_string(),
            directory: directory.into(),
            poll_interval: Duration::from_secs(1),
            origin,
            role,
            state: Mutex::new(DropDirState::default()),
        }
    }

    /// Build from configuration. `None` when no directory is configured.
    pub fn from_config(config: &DropDirConfig, origin: DeviceId, role: Option<Role>) -> Option<Self> {
        let directory = config.directory.as_ref()?;
        Some(Self::new(directory.clone(), origin, role).with_poll_interval(config.poll_interval()))
    }

    /// Scan the directory this often.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The shared directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn state(&self) -> MutexGuard<'_, DropDirState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn file_name(&self, id: &RequestId) -> String {
        format!(
            "{}.{}.{}{}",
            file_component(id.as_str()),
            file_component(self.origin.as_str()),
            uuid::Uuid::new_v4().simple(),
            SUFFIX
        )
    }

    fn spawn_poller(&self, sink: InboundSink) -> JoinHandle<()> {
        let name = self.name.clone();
        let directory = self.directory.clone();
        let origin = self.origin.clone();
        let interval = self.poll_interval;

        tokio::spawn(async move {
            tracing::info!(
                "{}: watching {} (interval: {:?})",
                name,
                directory.display(),
                interval
            );

            let mut seen = HashSet::new();
            let mut timer = tokio::time::interval(interval);

            loop {
                timer.tick().await;

                match scan_directory(&directory, &origin, &mut seen, &sink).await {
                    Ok(0) => {}
                    Ok(count) => tracing::debug!("{}: picked up {} envelopes", name, count),
                    Err(_) if sink.is_closed() => {
                        tracing::debug!("{}: inbound channel closed, poller exiting", name);
                        break;
                    }
                    Err(e) => tracing::warn!("{}: scan of {} failed: {}", name, directory.display(), e),
                }
            }
        })
    }
}

/// Make `raw` safe as one part of a file name.
///
/// Ids arrive from other devices, so anything beyond ASCII letters, digits,
/// `-` and `_` is replaced. The envelope inside the file carries the real id.
fn file_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// True if the file name carries `origin` in its origin slot.
fn written_by(file_name: &str, origin: &DeviceId) -> bool {
    file_name
        .strip_suffix(SUFFIX)
        .and_then(|stem| stem.rsplitn(3, '.').nth(1))
        .is_some_and(|o| o == file_component(origin.as_str()))
}

/// Deliver every envelope in `directory` not written by `origin` and not in
/// `seen`. Returns how many were delivered.
async fn scan_directory(
    directory: &Path,
    origin: &DeviceId,
    seen: &mut HashSet<String>,
    sink: &InboundSink,
) -> Result<usize, ProviderError> {
    let mut entries = tokio::fs::read_dir(directory).await?;
    let mut delivered = 0;

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.ends_with(SUFFIX) || seen.contains(name) {
            continue;
        }
        if written_by(name, origin) {
            seen.insert(name.to_string());
            continue;
        }

        // Unreadable files are retried on the next scan.
        let bytes = match tokio::fs::read(entry.path()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("Skipping unreadable envelope {}: {}", name, e);
                continue;
            }
        };
        seen.insert(name.to_string());

        let envelope = match Envelope::from_bytes(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Ignoring malformed envelope {}: {}", name, e);
                continue;
            }
        };
        if &envelope.origin == origin {
            continue;
        }

        sink.send(Delivery {
            request: envelope.request,
            origin: Some(envelope.origin),
            role: envelope.role,
        })
        .await
        .map_err(|_| ProviderError::SendFailed("inbound channel closed".into()))?;
        delivered += 1;
    }

    Ok(delivered)
}

#[async_trait]
impl TransportProvider for DropDirTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.directory.is_dir()
    }

    async fn start(&self) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| {
                ProviderError::StartFailed(format!("{}: {}", self.directory.display(), e))
            })?;

        let mut state = self.state();
        let sink = state.sink.clone().ok_or(ProviderError::NotAttached)?;
        if let Some(previous) = state.poller.take() {
            previous.abort();
        }
        state.poller = Some(self.spawn_poller(sink));
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        if let Some(poller) = self.state().poller.take() {
            poller.abort();
            tracing::info!("{}: stopped watching {}", self.name, self.directory.display());
        }
        Ok(())
    }

    async fn broadcast_request(&self, request: &DisasterRequest) -> Result<(), ProviderError> {
        let envelope = Envelope::new(self.origin.clone(), self.role, now_millis(), request.clone());
        let bytes = envelope.to_bytes()?;

        let file_name = self.file_name(&request.id);
        let temp_path = self.directory.join(format!(".{file_name}.tmp"));

        // Readers only pick up complete files.
        tokio::fs::write(&temp_path, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, self.directory.join(&file_name)).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!("{}: wrote {} ({} bytes)", self.name, file_name, bytes.len());
        Ok(())
    }

    fn attach(&self, sink: InboundSink) {
        self.state().sink = Some(sink);
    }
}

impl Drop for DropDirTransport {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(poller) = state.poller.take() {
            poller.abort();
        }
    }
}
