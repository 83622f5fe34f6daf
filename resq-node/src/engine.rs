//! Reconciliation engine.
//!
//! Applies local mutations and inbound records to the local store and keeps
//! subscribers up to date. All writes for one request id go through a per-id
//! lock, so an inbound merge and a local status update on the same request
//! never interleave. Broadcasts run in spawned tasks; a slow or failing
//! transport never delays or fails the local write.

use crate::error::EngineError;
use crate::locks::KeyedLocks;
use crate::orchestrator::{InboundStream, Orchestrator};
use crate::storage::RequestStore;
use resq_core::{
    can_transition, canonicalize, is_terminal, merge, next_entry_timestamp, RequestDraft,
    StatusSummary,
};
use resq_types::{DeviceId, DisasterRequest, RequestId, RequestStatus, StatusEntry};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Result of a local create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored and queued for broadcast.
    Created,
    /// A record with this id already existed; nothing changed.
    Duplicate,
}

/// Result of merging one inbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// First copy of this request on this device.
    Seeded,
    /// Local record changed; `added` history entries were new.
    Merged {
        /// Entries the remote copy contributed.
        added: usize,
    },
    /// The remote copy brought nothing new.
    Unchanged,
    /// The record was unusable (no id or no history) and was dropped.
    Rejected,
}

/// Merges local and remote changes into the local store.
pub struct Engine<S: RequestStore> {
    store: Arc<S>,
    orchestrator: Arc<Orchestrator>,
    device_id: DeviceId,
    locks: KeyedLocks,
    updates: watch::Sender<Vec<DisasterRequest>>,
    publish_lock: tokio::sync::Mutex<()>,
    pending_broadcasts: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: RequestStore + 'static> Engine<S> {
    /// Create an engine acting as `device_id`.
    ///
    /// Initializes the store and loads the current record set for
    /// subscribers.
    pub async fn new(
        store: Arc<S>,
        orchestrator: Arc<Orchestrator>,
        device_id: DeviceId,
    ) -> Result<Self, EngineError> {
        store.init().await?;
        let (updates, _) = watch::channel(store.list().await?);

        Ok(Self {
            store,
            orchestrator,
            device_id,
            locks: KeyedLocks::new(),
            updates,
            publish_lock: tokio::sync::Mutex::new(()),
            pending_broadcasts: Mutex::new(Vec::new()),
        })
    }

    /// The device this engine writes as.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// The orchestrator used for broadcasts.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Watch the full record list. A new value is published after every
    /// change to the local store.
    pub fn subscribe(&self) -> watch::Receiver<Vec<DisasterRequest>> {
        self.updates.subscribe()
    }

    /// Store a locally created record and broadcast it.
    ///
    /// Creating an id that already exists is a no-op. A record without an
    /// id or without history is refused with [`EngineError::Malformed`].
    pub async fn submit_new_request(
        &self,
        record: DisasterRequest,
    ) -> Result<SubmitOutcome, EngineError> {
        if let Some(reason) = malformed(&record) {
            return Err(EngineError::Malformed {
                id: record.id,
                reason,
            });
        }
        let record = canonicalize(record);
        {
            let _guard = self.locks.lock(&record.id).await;
            if self.store.get(&record.id).await?.is_some() {
                tracing::debug!("Request {} already stored, ignoring create", record.id);
                return Ok(SubmitOutcome::Duplicate);
            }
            self.store.upsert(&record).await?;
        }

        tracing::info!("Created request {} ({})", record.id, record.kind);
        self.publish().await;
        self.spawn_broadcast(record);
        Ok(SubmitOutcome::Created)
    }

    /// Validate a draft and create it as a request from this device.
    pub async fn create_request(
        &self,
        draft: RequestDraft,
        now: i64,
    ) -> Result<DisasterRequest, EngineError> {
        let record = draft.into_request(self.device_id.clone(), now)?;
        self.submit_new_request(record.clone()).await?;
        Ok(record)
    }

    /// Append a status change and broadcast the updated record.
    ///
    /// Transitions outside the lifecycle are applied anyway and logged. If
    /// `now` is not later than the newest entry (clock behind a peer's), the
    /// entry is stamped just after it so it stays the latest.
    pub async fn submit_status_update(
        &self,
        id: &RequestId,
        status: RequestStatus,
        updated_by: DeviceId,
        now: i64,
    ) -> Result<DisasterRequest, EngineError> {
        let updated = {
            let _guard = self.locks.lock(id).await;
            let current = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| EngineError::NotFound { id: id.clone() })?;

            let at = next_entry_timestamp(&current.status_history, now);
            if at != now {
                tracing::debug!(
                    "Request {}: local clock {} is behind history, stamping {}",
                    id,
                    now,
                    at
                );
            }
            self.store
                .append_status_history(id, StatusEntry::new(status, at, updated_by))
                .await?
        };

        let previous = updated.status_history.iter().rev().nth(1).map(|e| e.status);
        if let Some(previous) = previous {
            if !can_transition(previous, status) {
                tracing::warn!(
                    "Request {}: {} -> {} is outside the lifecycle",
                    id,
                    previous,
                    status
                );
            }
        }

        tracing::info!("Request {} is now {}", id, status);
        self.publish().await;
        self.spawn_broadcast(updated.clone());
        Ok(updated)
    }

    /// [`submit_status_update`](Self::submit_status_update) as this device.
    pub async fn update_status(
        &self,
        id: &RequestId,
        status: RequestStatus,
        now: i64,
    ) -> Result<DisasterRequest, EngineError> {
        self.submit_status_update(id, status, self.device_id.clone(), now)
            .await
    }

    /// Merge a record that arrived from another device.
    ///
    /// Re-broadcasts only when the remote copy contributed history entries
    /// this device did not have.
    pub async fn on_received(
        &self,
        remote: DisasterRequest,
    ) -> Result<ReceiveOutcome, EngineError> {
        if let Some(reason) = malformed(&remote) {
            tracing::warn!("Dropping inbound record {:?}: {}", remote.id, reason);
            return Ok(ReceiveOutcome::Rejected);
        }

        let id = remote.id.clone();
        let (outcome, rebroadcast) = {
            let _guard = self.locks.lock(&id).await;

            match self.store.get(&id).await? {
                None => {
                    let seeded = canonicalize(remote);
                    self.store.upsert(&seeded).await?;
                    (ReceiveOutcome::Seeded, Some(seeded))
                }
                Some(local) => {
                    let merged = merge(&local, &remote);
                    if let Some(anomaly) = &merged.anomaly {
                        tracing::warn!(
                            "Request {}: copies disagree on {:?}, keeping local values",
                            anomaly.id,
                            anomaly.fields
                        );
                    }

                    if merged.merged == local {
                        (ReceiveOutcome::Unchanged, None)
                    } else {
                        self.store.upsert(&merged.merged).await?;
                        let rebroadcast = merged.has_new_entries().then(|| merged.merged.clone());
                        (
                            ReceiveOutcome::Merged {
                                added: merged.added,
                            },
                            rebroadcast,
                        )
                    }
                }
            }
        };

        match outcome {
            ReceiveOutcome::Seeded => tracing::info!("Received new request {}", id),
            ReceiveOutcome::Merged { added } => {
                tracing::info!("Merged {} new status entries into {}", added, id)
            }
            _ => tracing::debug!("Inbound copy of {} brought nothing new", id),
        }

        if outcome != ReceiveOutcome::Unchanged {
            self.publish().await;
        }
        if let Some(record) = rebroadcast {
            self.spawn_broadcast(record);
        }
        Ok(outcome)
    }

    /// Drain `inbound` in a background task, merging every delivery.
    ///
    /// A failed merge is logged and the loop continues.
    pub fn spawn_inbound(self: &Arc<Self>, mut inbound: InboundStream) -> JoinHandle<()> {
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(record) = inbound.recv().await {
                let id = record.delivery.request.id.clone();
                match engine.on_received(record.delivery.request).await {
                    Ok(outcome) => {
                        tracing::debug!("Inbound {} via {}: {:?}", id, record.provider, outcome)
                    }
                    Err(e) => {
                        tracing::error!("Failed to merge {} from {}: {}", id, record.provider, e)
                    }
                }
            }
            tracing::info!("Inbound stream closed");
        })
    }

    /// All records, newest first.
    pub async fn requests(&self) -> Result<Vec<DisasterRequest>, EngineError> {
        Ok(self.store.list().await?)
    }

    /// One record.
    pub async fn request(&self, id: &RequestId) -> Result<Option<DisasterRequest>, EngineError> {
        Ok(self.store.get(id).await?)
    }

    /// Per-status counts over all records.
    pub async fn summary(&self) -> Result<StatusSummary, EngineError> {
        let requests = self.store.list().await?;
        Ok(StatusSummary::from_requests(&requests))
    }

    /// Delete every record. Administrative only.
    pub async fn clear_all(&self) -> Result<u64, EngineError> {
        let removed = self.store.clear_all().await?;
        self.publish().await;
        Ok(removed)
    }

    /// Queue a broadcast of every record that is not yet acknowledged.
    ///
    /// Used when a transport comes up, so records created while nothing was
    /// reachable still get out. Returns how many were queued.
    pub async fn rebroadcast_open(&self) -> Result<usize, EngineError> {
        let open: Vec<DisasterRequest> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| !is_terminal(r.status))
            .collect();

        let count = open.len();
        for record in open {
            self.spawn_broadcast(record);
        }
        tracing::info!("Re-broadcasting {} open requests", count);
        Ok(count)
    }

    /// Wait for every broadcast started so far to finish.
    pub async fn flush_broadcasts(&self) {
        let pending = std::mem::take(
            &mut *self
                .pending_broadcasts
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::warn!("Broadcast task ended abnormally: {}", e);
            }
        }
    }

    fn spawn_broadcast(&self, record: DisasterRequest) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let handle = tokio::spawn(async move {
            orchestrator.broadcast(&record).await;
        });

        let mut pending = self
            .pending_broadcasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    async fn publish(&self) {
        // Serialized so a slower list() never overwrites a newer one.
        let _guard = self.publish_lock.lock().await;
        match self.store.list().await {
            Ok(records) => {
                self.updates.send_replace(records);
            }
            Err(e) => tracing::error!("Failed to refresh request list: {}", e),
        }
    }
}

/// Why `record` cannot be stored, if it cannot.
fn malformed(record: &DisasterRequest) -> Option<&'static str> {
    if record.id.as_str().is_empty() {
        Some("empty id")
    } else if record.status_history.is_empty() {
        Some("empty status history")
    } else {
        None
    }
}
