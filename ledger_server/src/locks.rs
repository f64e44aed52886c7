//! Per-user request guard.
//!
//! Games and reward endpoints must not run two requests for the same user at
//! once. The guard lives here in the request layer; the ledger itself only
//! relies on its row locks.

use chip_ledger::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as KeyMutex, OwnedMutexGuard};

/// Another request for the same user did not finish in time
#[derive(Debug, thiserror::Error)]
#[error("Another request for user {0} is still in progress")]
pub struct UserBusy(pub UserId);

/// Held while a request for one user runs
#[derive(Debug)]
pub struct UserGuard {
    user: UserId,
    _guard: OwnedMutexGuard<()>,
}

impl UserGuard {
    pub fn user(&self) -> UserId {
        self.user
    }
}

/// Per-key mutual exclusion for user ids
#[derive(Debug)]
pub struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<KeyMutex<()>>>>,
    timeout: Duration,
}

impl UserLocks {
    /// Create a guard map
    ///
    /// # Arguments
    ///
    /// * `timeout` - How long `acquire` waits for a busy user
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Wait for exclusive access to `user`
    ///
    /// # Errors
    ///
    /// Returns `UserBusy` if the user stays locked for longer than the timeout.
    pub async fn acquire(&self, user: UserId) -> Result<UserGuard, UserBusy> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(user).or_default())
        };

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(UserGuard {
                user,
                _guard: guard,
            }),
            Err(_) => {
                tracing::debug!(user_id = user, "User lock timed out");
                Err(UserBusy(user))
            }
        }
    }

    /// Number of users with a live lock entry
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}
