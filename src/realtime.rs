//! Realtime change hub.
//!
//! Handlers publish a [`ChangeEvent`] after every committed write; the SSE endpoint
//! fans them out to subscribers filtered by table. Subscribers that fall more than
//! `capacity` events behind lose the overflow and are expected to re-fetch.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{ChangeEvent, ChangeKind, Table};

/// Broadcast hub for row changes.
pub struct ChangeHub {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish<T: Serialize>(&self, revision: i64, table: Table, kind: ChangeKind, record: &T) {
        let record = match serde_json::to_value(record) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize {} change: {}", table.as_str(), e);
                return;
            }
        };

        let event = ChangeEvent {
            revision,
            table,
            kind,
            record,
        };

        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(
                    "Published {:?} on {} to {} subscribers",
                    kind,
                    table.as_str(),
                    receivers
                );
            }
            Err(_) => tracing::trace!("No realtime subscribers for {}", table.as_str()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let hub = ChangeHub::new(8);
        let mut rx = hub.subscribe();

        hub.publish(3, Table::Posts, ChangeKind::Insert, &json!({ "id": "p1" }));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.revision, 3);
        assert_eq!(event.table, Table::Posts);
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.record["id"], "p1");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = ChangeHub::new(8);
        hub.publish(1, Table::Comments, ChangeKind::Insert, &json!({}));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_dropped_on_release() {
        let hub = ChangeHub::new(8);
        let rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(rx);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
