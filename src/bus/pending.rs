//! Registry of requests awaiting a correlated reply.
//!
//! Each waiter is a oneshot sender keyed by correlation id. A waiter leaves the
//! table exactly once: through `resolve` when its reply arrives, or through
//! `cancel` when the requester gives up. Both take the same lock, so a reply
//! racing a timeout resolves at most one of them.

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};

use super::{BusError, Result};

/// Pending request/response waiters.
#[derive(Default)]
pub struct PendingReplies {
    waiters: Mutex<HashMap<String, oneshot::Sender<Vec<u8>>>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `correlation_id`.
    ///
    /// Fails if a waiter is already registered under the same id.
    pub async fn register(&self, correlation_id: &str) -> Result<oneshot::Receiver<Vec<u8>>> {
        let mut waiters = self.waiters.lock().await;
        if waiters.contains_key(correlation_id) {
            return Err(BusError::DuplicateCorrelation(correlation_id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(correlation_id.to_string(), tx);
        Ok(rx)
    }

    /// Deliver a reply to its waiter.
    ///
    /// Returns `false` when no waiter is registered (late or unknown reply).
    pub async fn resolve(&self, correlation_id: &str, payload: Vec<u8>) -> bool {
        let waiter = self.waiters.lock().await.remove(correlation_id);
        match waiter {
            // The receiver may have been dropped between removal and send;
            // the reply is then discarded like any late reply.
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Remove a waiter without resolving it. Idempotent.
    pub async fn cancel(&self, correlation_id: &str) -> bool {
        self.waiters.lock().await.remove(correlation_id).is_some()
    }

    /// Drop every waiter; their receivers observe a closed channel.
    pub async fn clear(&self) -> usize {
        let mut waiters = self.waiters.lock().await;
        let count = waiters.len();
        waiters.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.waiters.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_resolve() {
        let pending = PendingReplies::new();
        let rx = pending.register("abc").await.unwrap();

        assert!(pending.resolve("abc", b"reply".to_vec()).await);
        assert_eq!(rx.await.unwrap(), b"reply".to_vec());
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let pending = PendingReplies::new();
        let _rx = pending.register("abc").await.unwrap();

        let result = pending.register("abc").await;
        assert!(matches!(result, Err(BusError::DuplicateCorrelation(id)) if id == "abc"));
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_after_cancel_is_discarded() {
        let pending = PendingReplies::new();
        let _rx = pending.register("abc").await.unwrap();

        assert!(pending.cancel("abc").await);
        assert!(!pending.resolve("abc", b"late".to_vec()).await);
        assert!(!pending.cancel("abc").await);
    }

    #[tokio::test]
    async fn test_resolve_unknown_id() {
        let pending = PendingReplies::new();
        assert!(!pending.resolve("missing", vec![]).await);
    }

    #[tokio::test]
    async fn test_clear_closes_receivers() {
        let pending = PendingReplies::new();
        let rx = pending.register("a").await.unwrap();
        let _rx2 = pending.register("b").await.unwrap();

        assert_eq!(pending.clear().await, 2);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_ids_do_not_interfere() {
        let pending = PendingReplies::new();
        let rx_a = pending.register("a").await.unwrap();
        let rx_b = pending.register("b").await.unwrap();

        // Replies arrive out of submission order.
        pending.resolve("b", b"for-b".to_vec()).await;
        pending.resolve("a", b"for-a".to_vec()).await;

        assert_eq!(rx_a.await.unwrap(), b"for-a".to_vec());
        assert_eq!(rx_b.await.unwrap(), b"for-b".to_vec());
    }
}
