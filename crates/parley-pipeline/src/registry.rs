//! Registry of in-flight jobs.
//!
//! Entries are registered when a job is submitted and removed when it reaches
//! a terminal state. The registry is an explicit value shared by reference
//! (usually behind an `Arc`) rather than process-global state.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{PipelineError, PipelineResult};

/// Concurrent map of live jobs keyed by request identity.
#[derive(Debug)]
pub struct JobRegistry<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for JobRegistry<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> JobRegistry<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, V>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a live job. Fails if the key is already live.
    pub fn register(&self, key: K, value: V) -> PipelineResult<()> {
        match self.try_register(key.clone(), value) {
            Ok(()) => Ok(()),
            Err(_) => Err(PipelineError::AlreadyRegistered(format!("{:?}", key))),
        }
    }

    /// Register a live job, or return the value already registered under
    /// the key. Check and insert happen under one lock.
    pub fn try_register(&self, key: K, value: V) -> Result<(), V> {
        let mut entries = self.entries();
        if let Some(existing) = entries.get(&key) {
            return Err(existing.clone());
        }
        entries.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries().contains_key(key)
    }

    /// Remove a job that reached a terminal state.
    pub fn deregister(&self, key: &K) -> Option<V> {
        self.entries().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all live entries.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.entries()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lifecycle() {
        let registry: JobRegistry<String, u32> = JobRegistry::new();
        registry.register("a".into(), 1).unwrap();
        assert_eq!(registry.get(&"a".into()), Some(1));
        assert!(matches!(
            registry.register("a".into(), 2),
            Err(PipelineError::AlreadyRegistered(_))
        ));
        assert_eq!(registry.deregister(&"a".into()), Some(1));
        assert!(registry.is_empty());
        registry.register("a".into(), 3).unwrap();
        assert_eq!(registry.get(&"a".into()), Some(3));
    }

    #[test]
    fn test_try_register_returns_existing() {
        let registry: JobRegistry<&str, &str> = JobRegistry::new();
        assert_eq!(registry.try_register("req", "job-1"), Ok(()));
        assert_eq!(registry.try_register("req", "job-2"), Err("job-1"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_registration_admits_one() {
        let registry: Arc<JobRegistry<&'static str, usize>> = Arc::new(JobRegistry::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.try_register("same", i).is_ok() }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(registry.len(), 1);
    }
}
