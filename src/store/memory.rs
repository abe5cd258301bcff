//! In-process store.
//!
//! One mutex around a map makes every primitive atomic. Useful for tests
//! and for single-process deployments where workers are tasks, not hosts.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{FencedStore, Store};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries()?.is_empty())
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Unavailable("memory store mutex poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut entries = self.entries()?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn get_and_replace(&self, key: &str, value: &str) -> Result<Option<String>> {
        Ok(self.entries()?.insert(key.to_string(), value.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

impl FencedStore for MemoryStore {
    async fn compare_and_swap(&self, key: &str, expected: &str, value: &str) -> Result<bool> {
        let mut entries = self.entries()?;
        match entries.get_mut(key) {
            Some(current) if current == expected => {
                *current = value.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut entries = self.entries()?;
        if entries.get(key).is_some_and(|current| current == expected) {
            entries.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
