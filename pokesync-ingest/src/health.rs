//! Readiness predicate: the store answers a ping AND the consumer loop is
//! currently attached to the bus.

use pokesync_storage::IngestStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct Readiness {
    consumer_attached: Arc<AtomicBool>,
    store: Arc<dyn IngestStore>,
}

impl Readiness {
    pub fn new(store: Arc<dyn IngestStore>) -> Self {
        Self {
            consumer_attached: Arc::new(AtomicBool::new(false)),
            store,
        }
    }

    /// Flipped by the consumer loop on connect and on exit.
    pub fn set_consumer_attached(&self, attached: bool) {
        self.consumer_attached.store(attached, Ordering::SeqCst);
    }

    pub fn consumer_attached(&self) -> bool {
        self.consumer_attached.load(Ordering::SeqCst)
    }

    pub async fn is_ready(&self) -> bool {
        if !self.consumer_attached() {
            return false;
        }
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Readiness check failed: store unreachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pokesync_storage::MockStore;

    #[tokio::test]
    async fn test_requires_consumer_and_store() {
        let store = Arc::new(MockStore::new());
        let readiness = Readiness::new(store.clone());
        assert!(!readiness.is_ready().await);

        readiness.set_consumer_attached(true);
        assert!(readiness.is_ready().await);

        store.set_unavailable(true);
        assert!(!readiness.is_ready().await);
    }

    #[tokio::test]
    async fn test_clones_share_flag() {
        let readiness = Readiness::new(Arc::new(MockStore::new()));
        let other = readiness.clone();
        other.set_consumer_attached(true);
        assert!(readiness.consumer_attached());
    }
}
