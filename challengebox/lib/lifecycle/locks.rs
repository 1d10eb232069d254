use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex as StdMutex},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{Owner, OwnerKind};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The (owner, image) key an owner's single instance of an image is tracked under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    owner_kind: OwnerKind,
    owner_id: String,
    image: String,
}

/// Async mutexes created on demand per key.
///
/// Entries nobody holds or waits on are pruned whenever a new key is looked up.
pub(crate) struct KeyedLocks<K> {
    locks: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SlotKey {
    /// The slot of `owner` for the bare repository `image`.
    pub fn new(owner: &Owner, image: impl Into<String>) -> Self {
        Self::from_parts(*owner.get_kind(), owner.get_id().clone(), image)
    }

    /// The slot for raw owner fields.
    pub fn from_parts(
        owner_kind: OwnerKind,
        owner_id: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            owner_kind,
            owner_id: owner_id.into(),
            image: image.into(),
        }
    }
}

impl<K: Clone + Eq + Hash> KeyedLocks<K> {
    pub(crate) fn new() -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Waits for the lock of `key`.
    pub(crate) async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        self.handle(key).lock_owned().await
    }

    /// Takes the lock of `key` if nobody holds it.
    pub(crate) fn try_lock(&self, key: &K) -> Option<OwnedMutexGuard<()>> {
        self.handle(key).try_lock_owned().ok()
    }

    fn handle(&self, key: &K) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(lock) = locks.get(key) {
            return Arc::clone(lock);
        }

        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let key = SlotKey::from_parts(OwnerKind::User, "1", "web");

        let guard = locks.lock(&key).await;
        assert!(locks.try_lock(&key).is_none());
        assert!(locks
            .try_lock(&SlotKey::from_parts(OwnerKind::User, "1", "pwn"))
            .is_some());

        drop(guard);
        assert!(locks.try_lock(&key).is_some());
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = KeyedLocks::new();
        for id in 0..10_i64 {
            let _guard = locks.lock(&id).await;
        }

        let _held = locks.lock(&100).await;
        let _other = locks.lock(&101).await;
        assert_eq!(locks.len(), 2);
    }
}
