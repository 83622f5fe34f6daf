//! In-process key-value store.

use super::KeyValueStore;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Settings kept in memory only. Used by tests and embedders that persist
/// identity elsewhere.
#[derive(Debug, Default)]
pub struct MemoryKeyValue {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValue {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValue {
    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_value_if_absent(&self, key: &str, value: &str) -> Result<String, StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values
            .entry(key.to_string())
            .or_insert_with(|| value.to_string())
            .clone())
    }

    async fn remove_value(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let kv = MemoryKeyValue::new();
        assert_eq!(kv.get_value("k").await.unwrap(), None);

        kv.set_value("k", "v1").await.unwrap();
        kv.set_value("k", "v2").await.unwrap();
        assert_eq!(kv.get_value("k").await.unwrap().as_deref(), Some("v2"));

        assert_eq!(kv.set_value_if_absent("k", "v3").await.unwrap(), "v2");
        assert_eq!(kv.set_value_if_absent("other", "v4").await.unwrap(), "v4");

        kv.remove_value("k").await.unwrap();
        kv.remove_value("k").await.unwrap();
        assert_eq!(kv.get_value("k").await.unwrap(), None);
    }
}
