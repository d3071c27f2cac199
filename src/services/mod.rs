//! Service layer: the operations the surrounding application calls.

pub mod orders;
pub mod transitions;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::errors::{CoreError, CoreResult};

pub use orders::{OrderRef, OrderService};
pub use transitions::{EntityRef, TransitionEngine};

/// Per-order advisory locks.
///
/// At most one in-flight mutation per order id: aggregate derivation reads
/// the full booking set and must not race a concurrent booking update.
/// Display reads do not take the lock and may be stale by at most one
/// in-flight transition.
#[derive(Debug, Default)]
pub struct OrderLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the order's lock, failing with `ConcurrentModification` when
    /// contention exceeds `timeout`.
    pub async fn acquire(
        &self,
        order_id: Uuid,
        timeout: Duration,
    ) -> CoreResult<OwnedMutexGuard<()>> {
        let cell = self.locks.entry(order_id).or_default().clone();
        tokio::time::timeout(timeout, cell.lock_owned())
            .await
            .map_err(|_| CoreError::ConcurrentModification(order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_per_order() {
        let locks = OrderLocks::new();
        let order_id = Uuid::new_v4();
        let guard = locks
            .acquire(order_id, Duration::from_millis(50))
            .await
            .unwrap();

        let err = locks
            .acquire(order_id, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConcurrentModification(id) if id == order_id));

        drop(guard);
        assert!(locks
            .acquire(order_id, Duration::from_millis(50))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn different_orders_do_not_contend() {
        let locks = OrderLocks::new();
        let _first = locks
            .acquire(Uuid::new_v4(), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(locks
            .acquire(Uuid::new_v4(), Duration::from_millis(50))
            .await
            .is_ok());
    }
}
