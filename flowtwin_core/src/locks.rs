//! Resource Lock Manager: exclusive, non-queued, holder-checked locks over
//! stations and belt segments.
//!
//! A key is either free or held by exactly one holder (a part id). There is
//! no queueing: a blocked acquirer polls. Station and belt keys live in
//! separate key spaces, so a station id can never collide with a belt.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use flowtwin_env::PlantContext;

/// Directed belt segment `from -> to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeltKey {
    pub from: String,
    pub to: String,
}

impl BeltKey {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// The same belt travelled the other way.
    pub fn reversed(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }
}

/// A lockable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKey {
    Station(String),
    Belt(BeltKey),
}

impl ResourceKey {
    pub fn station(id: &str) -> Self {
        ResourceKey::Station(id.to_string())
    }

    pub fn belt(from: &str, to: &str) -> Self {
        ResourceKey::Belt(BeltKey::new(from, to))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Station(id) => write!(f, "station:{}", id),
            ResourceKey::Belt(b) => write!(f, "belt:{}->{}", b.from, b.to),
        }
    }
}

/// Shared lock table. Cloning yields another handle onto the same table.
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    held: Arc<Mutex<HashMap<ResourceKey, String>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ResourceKey, String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes `key` for `holder` if it is free. Re-acquiring a key already
    /// held by the same holder succeeds.
    pub fn try_acquire(&self, key: &ResourceKey, holder: &str) -> bool {
        let mut table = self.table();
        match table.get(key) {
            Some(current) => current == holder,
            None => {
                table.insert(key.clone(), holder.to_string());
                true
            }
        }
    }

    /// Releases `key` if `holder` holds it. Returns whether anything was
    /// released; releasing someone else's key is a no-op.
    pub fn release(&self, key: &ResourceKey, holder: &str) -> bool {
        let mut table = self.table();
        if table.get(key).is_some_and(|h| h == holder) {
            table.remove(key);
            true
        } else {
            false
        }
    }

    /// Current holder of `key`.
    pub fn holder(&self, key: &ResourceKey) -> Option<String> {
        self.table().get(key).cloned()
    }

    /// Drops every key `holder` owns. Returns how many were released.
    pub fn release_holder(&self, holder: &str) -> usize {
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, h| h != holder);
        before - table.len()
    }

    /// Keys currently held by `holder`, sorted.
    pub fn held_by(&self, holder: &str) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self
            .table()
            .iter()
            .filter(|(_, h)| h.as_str() == holder)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn held_count(&self) -> usize {
        self.table().len()
    }

    /// Non-blocking scoped acquisition.
    pub fn try_lock(&self, key: ResourceKey, holder: &str) -> Option<LockGuard> {
        if self.try_acquire(&key, holder) {
            Some(LockGuard {
                manager: self.clone(),
                key,
                holder: holder.to_string(),
            })
        } else {
            None
        }
    }

    /// Polls until `key` is free, then returns a guard for it.
    ///
    /// There is no timeout and no fairness: whichever poller retries first
    /// after a release wins.
    pub async fn acquire<Ctx: PlantContext>(
        &self,
        ctx: &Ctx,
        key: ResourceKey,
        holder: &str,
        poll: Duration,
    ) -> LockGuard {
        let mut attempts = 0u32;
        loop {
            if let Some(guard) = self.try_lock(key.clone(), holder) {
                if attempts > 0 {
                    debug!(holder, %key, attempts, "lock acquired after contention");
                }
                return guard;
            }
            attempts += 1;
            ctx.sleep(poll).await;
        }
    }
}

/// Scoped ownership of one key. Releases on drop.
#[derive(Debug)]
pub struct LockGuard {
    manager: LockManager,
    key: ResourceKey,
    holder: String,
}

impl LockGuard {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Releases explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.manager.release(&self.key, &self.holder);
    }
}
