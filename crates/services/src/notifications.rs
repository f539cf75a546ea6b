//! The notification inbox and its read markers.

use crate::fetcher::{FetchOutcome, Fetcher, SyncOptions};
use crate::io::bounded;
use crate::projections::unread_count;
use crate::slices::Inbox;
use domains::{BackendClient, Collection, Filter, Notification, RecordStore, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// One user's inbox, kept live. Several may exist for the same user (badge
/// and messages screen); each subscribes and refreshes on its own.
pub struct NotificationCenter {
    user_id: Uuid,
    inbox: Fetcher<Inbox>,
    records: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl NotificationCenter {
    pub async fn open(client: &BackendClient, user_id: Uuid, options: &SyncOptions) -> Self {
        let inbox = Inbox {
            user_id,
            limit: options.notification_limit,
        };
        Self {
            user_id,
            inbox: Fetcher::initialize(client, inbox, options).await,
            records: client.records.clone(),
            timeout: options.fetch_timeout,
        }
    }

    /// Cached notifications, newest first.
    pub fn notifications(&self) -> Arc<Vec<Notification>> {
        self.inbox.items()
    }

    /// Recomputed from the cache on every call.
    pub fn unread_count(&self) -> usize {
        unread_count(&self.inbox.items())
    }

    pub async fn mark_as_read(&self, notification_id: i64) -> Result<()> {
        bounded(
            self.timeout,
            self.records.update(
                Collection::Notifications,
                vec![
                    Filter::eq("id", notification_id),
                    Filter::eq("user_id", self.user_id.to_string()),
                ],
                json!({ "is_read": true }),
            ),
        )
        .await?;
        self.inbox.refresh().await;
        Ok(())
    }

    pub async fn mark_all_as_read(&self) -> Result<()> {
        let rows = bounded(
            self.timeout,
            self.records.update(
                Collection::Notifications,
                vec![
                    Filter::eq("user_id", self.user_id.to_string()),
                    Filter::eq("is_read", false),
                ],
                json!({ "is_read": true }),
            ),
        )
        .await?;
        info!(user_id = %self.user_id, marked = rows.len(), "notifications marked read");
        self.inbox.refresh().await;
        Ok(())
    }

    pub async fn refresh(&self) -> FetchOutcome {
        self.inbox.refresh().await
    }

    pub fn inbox(&self) -> &Fetcher<Inbox> {
        &self.inbox
    }

    pub async fn close(&self) {
        self.inbox.teardown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{
        ChangeEvent, MockAuthGateway, MockChangeFeed, MockObjectStore, MockRecordStore, Subscription, SubscriptionId,
    };
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn row(id: i64, user_id: Uuid, is_read: bool) -> serde_json::Value {
        json!({
            "id": id,
            "post_id": 1,
            "user_id": user_id,
            "content": "有人评论了你的帖子",
            "is_read": is_read,
            "created_at": "2024-02-02T12:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_unread_count_follows_mark_all() {
        let user_id = Uuid::new_v4();
        let rows = Arc::new(Mutex::new(vec![row(1, user_id, false), row(2, user_id, true), row(3, user_id, false)]));

        let mut records = MockRecordStore::new();
        let reader = rows.clone();
        records
            .expect_query()
            .returning(move |_| Ok(reader.lock().unwrap().clone()));
        let writer = rows.clone();
        records
            .expect_update()
            .withf(|collection, filters, _| {
                *collection == Collection::Notifications && filters.contains(&Filter::eq("is_read", false))
            })
            .times(1)
            .returning(move |_, _, _| {
                let mut rows = writer.lock().unwrap();
                rows.iter_mut().for_each(|r| r["is_read"] = json!(true));
                Ok(rows.clone())
            });

        let (tx, events) = mpsc::unbounded_channel::<ChangeEvent>();
        let mut events = Some(events);
        let mut changes = MockChangeFeed::new();
        changes.expect_subscribe().returning(move |_, _| {
            Ok(Subscription {
                id: SubscriptionId(1),
                events: events.take().unwrap(),
            })
        });
        changes.expect_unsubscribe().times(1).returning(|_| Ok(()));

        let client = BackendClient::new(
            Arc::new(records),
            Arc::new(changes),
            Arc::new(MockObjectStore::new()),
            Arc::new(MockAuthGateway::new()),
        );
        let center = NotificationCenter::open(&client, user_id, &SyncOptions::default()).await;
        assert_eq!(center.unread_count(), 2);

        center.mark_all_as_read().await.unwrap();
        assert_eq!(center.unread_count(), 0);
        assert_eq!(center.notifications().len(), 3);

        center.close().await;
        drop(tx);
    }
}
