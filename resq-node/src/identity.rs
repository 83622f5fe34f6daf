//! Device identity: the persisted device id and the chosen role.

use crate::error::IdentityError;
use crate::storage::KeyValueStore;
use resq_types::{DeviceId, DeviceIdentity, Role};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Settings key holding the device id.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Settings key holding the selected role.
pub const ROLE_KEY: &str = "user_role";

/// Reads and writes this device's identity through a [`KeyValueStore`].
///
/// The device id is generated on first use and cached; concurrent first
/// callers agree on a single id.
pub struct IdentityService<K: KeyValueStore> {
    store: Arc<K>,
    device_id: OnceCell<DeviceId>,
}

impl<K: KeyValueStore> IdentityService<K> {
    /// Create a service over `store`.
    pub fn new(store: Arc<K>) -> Self {
        Self {
            store,
            device_id: OnceCell::new(),
        }
    }

    /// Return the persisted device id, generating and saving one on first run.
    pub async fn get_or_create_device_id(&self) -> Result<DeviceId, IdentityError> {
        let id = self
            .device_id
            .get_or_try_init(|| async {
                if let Some(existing) = self.store.get_value(DEVICE_ID_KEY).await? {
                    if !existing.is_empty() {
                        return Ok::<_, IdentityError>(DeviceId::new(existing));
                    }
                    // A blank id left behind by an older install is replaced.
                    self.store.remove_value(DEVICE_ID_KEY).await?;
                }

                // Another process on the same database may get here first;
                // whichever insert lands is the device id for both.
                let candidate = DeviceId::generate();
                let stored = self
                    .store
                    .set_value_if_absent(DEVICE_ID_KEY, candidate.as_str())
                    .await?;
                if stored == candidate.as_str() {
                    tracing::info!("Generated device id {}", candidate);
                }
                Ok(DeviceId::new(stored))
            })
            .await?;

        Ok(id.clone())
    }

    /// The selected role, if any.
    pub async fn role(&self) -> Result<Option<Role>, IdentityError> {
        match self.store.get_value(ROLE_KEY).await? {
            None => Ok(None),
            Some(value) if value.is_empty() => Ok(None),
            Some(value) => value
                .parse::<Role>()
                .map(Some)
                .map_err(|_| IdentityError::InvalidRole(value)),
        }
    }

    /// Persist a new role. Existing records are not touched.
    pub async fn set_role(&self, role: Role) -> Result<(), IdentityError> {
        self.store.set_value(ROLE_KEY, role.as_str()).await?;
        tracing::info!("Role set to {}", role.label());
        Ok(())
    }

    /// Forget the selected role.
    pub async fn clear_role(&self) -> Result<(), IdentityError> {
        self.store.remove_value(ROLE_KEY).await?;
        tracing::info!("Role cleared");
        Ok(())
    }

    /// Snapshot of id and role, read once at startup.
    pub async fn load(&self) -> Result<DeviceIdentity, IdentityError> {
        Ok(DeviceIdentity {
            id: self.get_or_create_device_id().await?,
            role: self.role().await?,
        })
    }
}
