use super::{MemoryBackend, Subscriber};
use async_trait::async_trait;
use domains::{ChangeFeed, Collection, Filter, Result, Subscription, SubscriptionId};
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tracing::debug;

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, collection: Collection, filter: Filter) -> Result<Subscription> {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let (sender, events) = mpsc::unbounded_channel();
        self.subscribers.insert(
            id,
            Subscriber {
                collection,
                filter,
                events: sender,
            },
        );
        debug!(%collection, subscription = id, "subscribed");
        Ok(Subscription {
            id: SubscriptionId(id),
            events,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        if self.subscribers.remove(&id.0).is_some() {
            debug!(subscription = id.0, "unsubscribed");
        }
        Ok(())
    }
}

impl MemoryBackend {
    /// Drops every subscription's sender, as a lost realtime connection
    /// would. Receivers see their channel close.
    pub fn disconnect_feed(&self) {
        self.subscribers.clear();
    }
}
