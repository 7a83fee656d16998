// Snapshot sink: latest snapshot for request/response consumers, broadcast for streams.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::models::Snapshot;

#[derive(Clone)]
pub struct SnapshotPublisher {
    tx: broadcast::Sender<Arc<Snapshot>>,
    latest: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
}

impl SnapshotPublisher {
    /// `capacity`: snapshots kept for slow stream subscribers before they lag.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let (latest, _) = watch::channel(None);
        Self {
            tx,
            latest: Arc::new(latest),
        }
    }

    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.latest.send_replace(Some(snapshot.clone()));
        if self.tx.send(snapshot.clone()).is_err() {
            tracing::debug!(
                operation = "broadcast_snapshot",
                "No active subscribers; snapshot kept as latest only"
            );
        }
        snapshot
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.borrow().clone()
    }
}
