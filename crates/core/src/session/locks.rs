use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per session id. Turns on the same session queue behind
/// each other; distinct ids never share a lock.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.entry(session_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops the entry for one session unless a turn still holds or waits
    /// on it; a later `acquire` must queue behind that turn.
    pub fn forget(&self, session_id: &str) -> bool {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        let idle = locks.get(session_id).is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(session_id);
        }
        idle
    }

    /// Drops entries nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        match self.locks.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
