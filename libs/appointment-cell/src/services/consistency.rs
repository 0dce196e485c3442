// libs/appointment-cell/src/services/consistency.rs
//
// Per-professional scheduling locks. Conflict check and the save of a new
// time window run under the professional's lock, so two overlapping requests
// for the same professional cannot both pass the check.
//

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::AppointmentError;

const PRUNE_THRESHOLD: usize = 1024;

pub struct SchedulingLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
}

/// Held for the duration of a check-then-write. Dropping releases the lock.
#[derive(Debug)]
pub struct SchedulingGuard {
    professional_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl SchedulingGuard {
    pub fn professional_id(&self) -> Uuid {
        self.professional_id
    }
}

impl SchedulingLocks {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    pub async fn acquire(&self, professional_id: Uuid) -> Result<SchedulingGuard, AppointmentError> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                // entries nobody is holding or waiting on
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(
                locks
                    .entry(professional_id)
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        match tokio::time::timeout(self.lock_timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!("Acquired scheduling lock for professional {}", professional_id);
                Ok(SchedulingGuard {
                    professional_id,
                    _guard: guard,
                })
            }
            Err(_) => {
                warn!(
                    "Timed out after {:?} waiting for scheduling lock on professional {}",
                    self.lock_timeout, professional_id
                );
                Err(AppointmentError::LockTimeout(professional_id))
            }
        }
    }

    pub async fn tracked_professionals(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn second_acquire_waits_then_times_out() {
        let locks = SchedulingLocks::new(Duration::from_millis(50));
        let professional_id = Uuid::new_v4();

        let held = locks.acquire(professional_id).await.unwrap();
        assert_eq!(held.professional_id(), professional_id);

        let result = locks.acquire(professional_id).await;
        assert_matches!(result, Err(AppointmentError::LockTimeout(id)) if id == professional_id);

        drop(held);
        assert!(locks.acquire(professional_id).await.is_ok());
    }

    #[tokio::test]
    async fn different_professionals_do_not_contend() {
        let locks = SchedulingLocks::new(Duration::from_millis(50));

        let _a = locks.acquire(Uuid::new_v4()).await.unwrap();
        let _b = locks.acquire(Uuid::new_v4()).await.unwrap();

        assert_eq!(locks.tracked_professionals().await, 2);
    }
}
